//! 数据集录制器
//!
//! `DatasetRecorder` 注册为电机变更回调，在录制期间把每个事件转成一帧：
//! 按关节顺序维护当前归一化位置，`action` 取变更前的向量，
//! `observation_state` 取变更后的向量。
//!
//! # 状态
//!
//! ```text
//! Empty --start--> Recording --stop--> Finalized --clear--> Empty
//!                   |      ^
//!                   +------+ next_episode
//! ```
//!
//! 停止后的数据集只读，直到 `clear`。

use crate::error::DatasetError;
use crate::frame::{DOF, Episode, Frame, JointVector};
use crate::video::VideoSegment;
use bytes::Bytes;
use parking_lot::Mutex;
use soarm_driver::{MotorChangeCallback, MotorChangeEvent, MotorConfig};
use soarm_protocol::NormMode;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 数据集中的一个关节特征
#[derive(Debug, Clone, PartialEq)]
pub struct JointFeature {
    pub name: String,
    pub norm_mode: NormMode,
}

impl JointFeature {
    pub fn new(name: impl Into<String>, norm_mode: NormMode) -> Self {
        Self {
            name: name.into(),
            norm_mode,
        }
    }
}

/// 录制器配置
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub robot_type: String,
    /// 初始任务描述
    pub task: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            robot_type: "so100_follower".to_string(),
            task: "teleoperation".to_string(),
        }
    }
}

/// 录制完成的原始数据（未重采样）
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDataset {
    pub robot_type: String,
    /// 关节名，顺序与向量分量一致
    pub joint_names: Vec<String>,
    pub cameras: Vec<String>,
    pub tasks: Vec<String>,
    pub episodes: Vec<Episode>,
    pub videos: Vec<VideoSegment>,
}

impl RecordedDataset {
    pub fn frame_count(&self) -> usize {
        self.episodes.iter().map(Episode::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Empty,
    Recording,
    Finalized,
}

struct RecorderState {
    phase: Phase,
    /// 当前片段的起点
    episode_started_at: Option<Instant>,
    /// 每个关节当前的 (位置, 下限, 上限)
    positions: Vec<(u16, u16, u16)>,
    episodes: Vec<Episode>,
    tasks: Vec<String>,
    task_index: usize,
    cameras: Vec<String>,
    /// 相机 → 开始采集时的片段序号
    captures: HashMap<String, usize>,
    videos: Vec<VideoSegment>,
}

/// 数据集录制器
///
/// 所有方法都只需要 `&self`，可以包在 `Arc` 里同时注册为回调。
pub struct DatasetRecorder {
    robot_type: String,
    features: Vec<JointFeature>,
    state: Mutex<RecorderState>,
}

impl DatasetRecorder {
    /// 创建录制器
    ///
    /// `motors` 提供初始位置与限位，按名字与 `features` 对应；
    /// 找不到的关节从中位 2047、全行程开始。
    pub fn new(features: Vec<JointFeature>, motors: &[MotorConfig], config: RecorderConfig) -> Self {
        let positions = features
            .iter()
            .map(|f| {
                motors
                    .iter()
                    .find(|m| m.name == f.name)
                    .map(|m| (m.current_position, m.min_position, m.max_position))
                    .unwrap_or((2047, 0, 4095))
            })
            .collect();

        Self {
            robot_type: config.robot_type,
            features,
            state: Mutex::new(RecorderState {
                phase: Phase::Empty,
                episode_started_at: None,
                positions,
                episodes: Vec::new(),
                tasks: vec![config.task],
                task_index: 0,
                cameras: Vec::new(),
                captures: HashMap::new(),
                videos: Vec::new(),
            }),
        }
    }

    pub fn features(&self) -> &[JointFeature] {
        &self.features
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().phase == Phase::Recording
    }

    /// 用最新的电机状态刷新当前位置（例如遥操作启动读回位置之后）
    pub fn sync_positions(&self, motors: &[MotorConfig]) {
        let mut state = self.state.lock();
        for (feature, slot) in self.features.iter().zip(state.positions.iter_mut()) {
            if let Some(m) = motors.iter().find(|m| m.name == feature.name) {
                *slot = (m.current_position, m.min_position, m.max_position);
            }
        }
    }

    /// 开始录制，打开第 0 个片段
    pub fn start(&self) -> Result<(), DatasetError> {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Recording => {
                return Err(DatasetError::RecordingState("already recording".to_string()));
            },
            Phase::Finalized => {
                return Err(DatasetError::RecordingState(
                    "dataset is finalized, clear it before recording again".to_string(),
                ));
            },
            Phase::Empty => {},
        }

        state.phase = Phase::Recording;
        state.episodes.push(Episode::new(0));
        state.episode_started_at = Some(Instant::now());
        info!("Recording started");
        Ok(())
    }

    /// 结束当前片段并开始下一个
    pub fn next_episode(&self) -> Result<usize, DatasetError> {
        let mut state = self.state.lock();
        if state.phase != Phase::Recording {
            return Err(DatasetError::RecordingState("not recording".to_string()));
        }

        let now = Instant::now();
        finalize_episode(&mut state, now);
        let index = state.episodes.len();
        state.episodes.push(Episode::new(index));
        state.episode_started_at = Some(now);
        info!("Episode {} started", index);
        Ok(index)
    }

    /// 停止录制，数据集转为只读
    pub fn stop(&self) -> Result<(), DatasetError> {
        let mut state = self.state.lock();
        if state.phase != Phase::Recording {
            return Err(DatasetError::RecordingState("not recording".to_string()));
        }

        finalize_episode(&mut state, Instant::now());
        state.phase = Phase::Finalized;
        state.episode_started_at = None;
        info!(
            "Recording stopped: {} episodes, {} frames",
            state.episodes.len(),
            state.episodes.iter().map(Episode::len).sum::<usize>()
        );
        Ok(())
    }

    /// 清空数据（录制中不允许）
    pub fn clear(&self) -> Result<(), DatasetError> {
        let mut state = self.state.lock();
        if state.phase == Phase::Recording {
            return Err(DatasetError::RecordingState(
                "cannot clear while recording".to_string(),
            ));
        }

        state.phase = Phase::Empty;
        state.episodes.clear();
        state.captures.clear();
        state.videos.clear();
        state.tasks.truncate(1);
        state.task_index = 0;
        Ok(())
    }

    /// 设置后续帧使用的任务描述，返回任务序号
    ///
    /// 相同描述复用已有序号。停止后的数据集不接受新任务。
    pub fn set_task(&self, description: &str) -> Result<usize, DatasetError> {
        let mut state = self.state.lock();
        if state.phase == Phase::Finalized {
            return Err(DatasetError::RecordingState(
                "dataset is finalized, clear it before changing the task".to_string(),
            ));
        }
        let index = match state.tasks.iter().position(|t| t == description) {
            Some(i) => i,
            None => {
                state.tasks.push(description.to_string());
                state.tasks.len() - 1
            },
        };
        state.task_index = index;
        Ok(index)
    }

    /// 注册相机（必须在开始录制之前）
    pub fn register_camera(&self, name: &str) -> Result<(), DatasetError> {
        let mut state = self.state.lock();
        if state.phase != Phase::Empty {
            return Err(DatasetError::RecordingState(
                "cameras must be registered before recording starts".to_string(),
            ));
        }
        if !state.cameras.iter().any(|c| c == name) {
            state.cameras.push(name.to_string());
        }
        Ok(())
    }

    /// 标记相机开始采集，归属当前片段
    pub fn begin_capture(&self, camera: &str) -> Result<usize, DatasetError> {
        let mut state = self.state.lock();
        if !state.cameras.iter().any(|c| c == camera) {
            return Err(DatasetError::UnknownCamera(camera.to_string()));
        }
        if state.phase != Phase::Recording {
            return Err(DatasetError::RecordingState("not recording".to_string()));
        }

        let episode = state.episodes.len().saturating_sub(1);
        state.captures.insert(camera.to_string(), episode);
        debug!("Camera {} capturing episode {}", camera, episode);
        Ok(episode)
    }

    /// 交回采集完成的视频
    ///
    /// 停止录制后仍可交回之前开始的采集。
    pub fn finish_capture(
        &self,
        camera: &str,
        data: impl Into<Bytes>,
        container: &str,
    ) -> Result<usize, DatasetError> {
        let mut state = self.state.lock();
        let episode_index = state.captures.remove(camera).ok_or_else(|| {
            DatasetError::RecordingState(format!("camera {camera} has no capture in progress"))
        })?;

        state.videos.push(VideoSegment {
            camera: camera.to_string(),
            episode_index,
            container: container.to_string(),
            data: data.into(),
        });
        Ok(episode_index)
    }

    /// 已录制的帧数
    pub fn frame_count(&self) -> usize {
        self.state.lock().episodes.iter().map(Episode::len).sum()
    }

    pub fn episode_count(&self) -> usize {
        self.state.lock().episodes.len()
    }

    /// 取出录制结果（仅在停止后可用）
    pub fn snapshot(&self) -> Result<RecordedDataset, DatasetError> {
        let state = self.state.lock();
        if state.phase == Phase::Recording {
            return Err(DatasetError::RecordingState(
                "stop recording before exporting".to_string(),
            ));
        }
        if !state.captures.is_empty() {
            warn!(
                "{} camera captures never finished, their video is missing",
                state.captures.len()
            );
        }

        Ok(RecordedDataset {
            robot_type: self.robot_type.clone(),
            joint_names: self.features.iter().map(|f| f.name.clone()).collect(),
            cameras: state.cameras.clone(),
            tasks: state.tasks.clone(),
            episodes: state.episodes.clone(),
            videos: state.videos.clone(),
        })
    }

    fn normalized(&self, positions: &[(u16, u16, u16)]) -> JointVector {
        let mut out = [0.0; DOF];
        for ((slot, feature), (pos, min, max)) in
            out.iter_mut().zip(&self.features).zip(positions)
        {
            *slot = feature.norm_mode.normalize(*pos, *min, *max);
        }
        out
    }

    fn record(&self, event: &MotorChangeEvent) {
        let mut state = self.state.lock();
        if state.phase != Phase::Recording {
            return;
        }
        let Some(joint) = self.features.iter().position(|f| f.name == event.motor_name) else {
            warn!("Ignoring change of unknown motor {}", event.motor_name);
            return;
        };
        let Some(started_at) = state.episode_started_at else {
            return;
        };

        let action = self.normalized(&state.positions);
        state.positions[joint] = (
            event.new_position,
            event.motor_config.min_position,
            event.motor_config.max_position,
        );
        let observation_state = self.normalized(&state.positions);

        let frame = Frame {
            timestamp: event.command_sent_at.saturating_duration_since(started_at).as_secs_f64(),
            action,
            observation_state,
            episode_index: state.episodes.len().saturating_sub(1),
            task_index: state.task_index,
        };

        let Some(episode) = state.episodes.last_mut() else {
            return;
        };
        if let Err(e) = episode.push(frame) {
            error!("Dataset corrupted: {}", e);
            panic!("{e}");
        }
    }
}

impl MotorChangeCallback for DatasetRecorder {
    fn on_motor_change(&self, event: &MotorChangeEvent) {
        self.record(event);
    }
}

/// 片段起点为 0，终点为经过的时间
fn finalize_episode(state: &mut RecorderState, now: Instant) {
    let elapsed = state
        .episode_started_at
        .map(|t| now.saturating_duration_since(t).as_secs_f64())
        .unwrap_or(0.0);
    if let Some(episode) = state.episodes.last_mut() {
        episode.set_start_time(0.0);
        episode.set_end_time(elapsed);
        info!("Episode {} finished: {} frames", episode.index(), episode.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn features() -> Vec<JointFeature> {
        ["shoulder_pan", "shoulder_lift", "elbow_flex", "wrist_flex", "wrist_roll"]
            .into_iter()
            .map(|n| JointFeature::new(n, NormMode::RangeM100To100))
            .chain([JointFeature::new("gripper", NormMode::Range0To100)])
            .collect()
    }

    fn motors() -> Vec<MotorConfig> {
        features()
            .iter()
            .enumerate()
            .map(|(i, f)| MotorConfig::new(i as u8 + 1, f.name.clone(), 4096).with_limits(1000, 3000))
            .collect()
    }

    fn event(name: &str, previous: u16, new: u16, at: Instant) -> MotorChangeEvent {
        let config = motors().into_iter().find(|m| m.name == name).unwrap();
        MotorChangeEvent {
            motor_name: name.to_string(),
            motor_config: MotorConfig {
                current_position: new,
                ..config
            },
            previous_position: previous,
            new_position: new,
            command_sent_at: at,
            position_applied_at: at,
        }
    }

    fn recorder() -> DatasetRecorder {
        let mut motors = motors();
        for m in &mut motors {
            m.current_position = 2000;
        }
        DatasetRecorder::new(features(), &motors, RecorderConfig::default())
    }

    #[test]
    fn test_event_becomes_frame() {
        let rec = recorder();
        rec.start().unwrap();
        rec.on_motor_change(&event("gripper", 2000, 3000, Instant::now()));

        let data = {
            rec.stop().unwrap();
            rec.snapshot().unwrap()
        };
        let frame = data.episodes[0].frames()[0];
        assert_eq!(frame.action, [0.0, 0.0, 0.0, 0.0, 0.0, 50.0]);
        assert_eq!(frame.observation_state, [0.0, 0.0, 0.0, 0.0, 0.0, 100.0]);
        assert_eq!(frame.episode_index, 0);
        assert_eq!(data.joint_names.len(), DOF);
    }

    #[test]
    fn test_events_ignored_when_not_recording() {
        let rec = recorder();
        rec.on_motor_change(&event("elbow_flex", 2000, 2100, Instant::now()));
        assert_eq!(rec.frame_count(), 0);

        rec.start().unwrap();
        rec.on_motor_change(&event("unknown", 0, 1, Instant::now()));
        assert_eq!(rec.frame_count(), 0);
    }

    #[test]
    fn test_lifecycle_errors() {
        let rec = recorder();
        assert!(rec.stop().is_err());
        assert!(rec.next_episode().is_err());

        rec.start().unwrap();
        assert!(rec.start().is_err());
        assert!(rec.clear().is_err());
        assert!(rec.snapshot().is_err());

        rec.stop().unwrap();
        // 停止后只读
        assert!(rec.start().is_err());
        rec.clear().unwrap();
        rec.start().unwrap();
        assert!(rec.is_recording());
    }

    #[test]
    fn test_next_episode_and_tasks() {
        let rec = recorder();
        rec.start().unwrap();
        rec.on_motor_change(&event("wrist_flex", 2000, 2500, Instant::now()));

        assert_eq!(rec.next_episode().unwrap(), 1);
        assert_eq!(rec.set_task("pick cube").unwrap(), 1);
        assert_eq!(rec.set_task("teleoperation").unwrap(), 0);
        assert_eq!(rec.set_task("pick cube").unwrap(), 1);
        rec.on_motor_change(&event("wrist_flex", 2500, 2600, Instant::now()));
        rec.stop().unwrap();

        let data = rec.snapshot().unwrap();
        assert_eq!(data.episodes.len(), 2);
        assert_eq!(data.tasks, vec!["teleoperation", "pick cube"]);

        let second = data.episodes[1].frames()[0];
        assert_eq!(second.episode_index, 1);
        assert_eq!(second.task_index, 1);
        // 第二个片段从第一个片段的最终位置继续
        assert_eq!(second.action[3], 50.0);
        assert_eq!(data.episodes[1].start_time(), Some(0.0));
    }

    #[test]
    fn test_task_frozen_after_stop() {
        let rec = recorder();
        assert_eq!(rec.set_task("stack blocks").unwrap(), 1);
        rec.start().unwrap();
        rec.stop().unwrap();

        assert!(matches!(
            rec.set_task("after stop"),
            Err(DatasetError::RecordingState(_))
        ));
        assert_eq!(rec.snapshot().unwrap().tasks, vec!["teleoperation", "stack blocks"]);

        rec.clear().unwrap();
        assert_eq!(rec.set_task("after clear").unwrap(), 1);
    }

    #[test]
    fn test_sync_positions_sets_first_action() {
        let rec = recorder();
        let mut synced = motors();
        for m in &mut synced {
            m.current_position = 3000;
        }
        // 只有部分关节可读时，其余保持原值
        synced.retain(|m| m.name != "shoulder_pan");
        rec.sync_positions(&synced);

        rec.start().unwrap();
        rec.on_motor_change(&event("gripper", 3000, 2000, Instant::now()));
        rec.stop().unwrap();

        let frame = rec.snapshot().unwrap().episodes[0].frames()[0];
        assert_eq!(frame.action, [0.0, 100.0, 100.0, 100.0, 100.0, 100.0]);
        assert_eq!(frame.observation_state[5], 50.0);
    }

    #[test]
    fn test_timestamps_relative_to_episode_start() {
        let rec = recorder();
        rec.start().unwrap();
        // 早于片段起点的事件钳位到 0
        let earlier = Instant::now() - Duration::from_secs(5);
        rec.on_motor_change(&event("elbow_flex", 2000, 2100, earlier));
        let later = Instant::now() + Duration::from_millis(250);
        rec.on_motor_change(&event("elbow_flex", 2100, 2200, later));
        rec.stop().unwrap();

        let data = rec.snapshot().unwrap();
        let frames = data.episodes[0].frames();
        assert_eq!(frames[0].timestamp, 0.0);
        assert!(frames[1].timestamp >= 0.25);
        assert_eq!(data.episodes[0].start_time(), Some(0.0));
    }

    #[test]
    #[should_panic]
    fn test_time_going_backwards_panics() {
        let rec = recorder();
        rec.start().unwrap();
        let now = Instant::now() + Duration::from_secs(1);
        rec.on_motor_change(&event("elbow_flex", 2000, 2100, now));
        rec.on_motor_change(&event("elbow_flex", 2100, 2200, now - Duration::from_millis(500)));
    }

    #[test]
    fn test_camera_capture() {
        let rec = recorder();
        rec.register_camera("front").unwrap();
        assert!(rec.begin_capture("front").is_err());

        rec.start().unwrap();
        assert!(rec.register_camera("wrist").is_err());
        assert!(matches!(
            rec.begin_capture("wrist"),
            Err(DatasetError::UnknownCamera(_))
        ));

        assert_eq!(rec.begin_capture("front").unwrap(), 0);
        rec.next_episode().unwrap();
        rec.stop().unwrap();

        // 采集在片段 0 开始，归档到片段 0
        assert_eq!(rec.finish_capture("front", vec![1u8, 2, 3], "mp4").unwrap(), 0);
        assert!(rec.finish_capture("front", vec![], "mp4").is_err());

        let data = rec.snapshot().unwrap();
        assert_eq!(data.videos.len(), 1);
        assert_eq!(data.videos[0].feature_key(), "observation.images.front");
        assert_eq!(data.cameras, vec!["front"]);
    }
}

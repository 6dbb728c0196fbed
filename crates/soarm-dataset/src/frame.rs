//! 帧与片段
//!
//! 一帧记录一次电机变更：`action` 是变更前的归一化关节向量，
//! `observation_state` 是变更后的向量。时间戳以秒为单位，相对片段起点。

use crate::error::DatasetError;

/// 关节数量（SO-100 / SO-101 均为 6 轴含夹爪）
pub const DOF: usize = 6;

/// 归一化关节向量
pub type JointVector = [f32; DOF];

/// 一帧数据
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// 相对片段起点的时间（秒）
    pub timestamp: f64,
    pub action: JointVector,
    pub observation_state: JointVector,
    pub episode_index: usize,
    pub task_index: usize,
}

/// 重采样后带索引的帧
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedFrame {
    pub frame: Frame,
    /// 片段内序号
    pub frame_index: usize,
    /// 数据集全局序号
    pub global_index: usize,
}

/// 录制片段
///
/// 帧按时间戳单调不减排列，`push` 负责维持这一点。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Episode {
    index: usize,
    frames: Vec<Frame>,
    start_time: Option<f64>,
    end_time: Option<f64>,
}

impl Episode {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 追加一帧
    ///
    /// # 错误
    ///
    /// 时间戳小于上一帧时返回 `TemporalInvariantViolation`，片段不变。
    pub fn push(&mut self, frame: Frame) -> Result<(), DatasetError> {
        if let Some(last) = self.frames.last()
            && frame.timestamp < last.timestamp
        {
            return Err(DatasetError::TemporalInvariantViolation {
                previous: last.timestamp,
                next: frame.timestamp,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    /// 起始时间：显式设置的值，否则为第一帧时间
    pub fn start_time(&self) -> Option<f64> {
        self.start_time
            .or_else(|| self.frames.first().map(|f| f.timestamp))
    }

    /// 结束时间：显式设置的值，否则为最后一帧时间
    pub fn end_time(&self) -> Option<f64> {
        self.end_time.or_else(|| self.frames.last().map(|f| f.timestamp))
    }

    pub fn set_start_time(&mut self, t: f64) {
        self.start_time = Some(t);
    }

    pub fn set_end_time(&mut self, t: f64) {
        self.end_time = Some(t);
    }

    /// 时长（秒），没有时间信息时为 0
    pub fn timespan(&self) -> f64 {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) if end > start => end - start,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    pub(crate) fn frame(t: f64, value: f32) -> Frame {
        Frame {
            timestamp: t,
            action: [value; DOF],
            observation_state: [value; DOF],
            episode_index: 0,
            task_index: 0,
        }
    }

    #[test]
    fn test_push_rejects_time_going_backwards() {
        let mut episode = Episode::new(0);
        episode.push(frame(0.5, 0.0)).unwrap();
        episode.push(frame(0.5, 1.0)).unwrap();

        let err = episode.push(frame(0.4, 2.0)).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::TemporalInvariantViolation { previous, next }
                if previous == 0.5 && next == 0.4
        ));
        assert_eq!(episode.len(), 2);
    }

    #[test]
    fn test_time_overrides() {
        let mut episode = Episode::new(3);
        assert_eq!(episode.timespan(), 0.0);
        assert_eq!(episode.start_time(), None);

        episode.push(frame(0.2, 0.0)).unwrap();
        episode.push(frame(0.8, 0.0)).unwrap();
        assert_eq!(episode.start_time(), Some(0.2));
        assert!((episode.timespan() - 0.6).abs() < 1e-9);

        episode.set_start_time(0.0);
        episode.set_end_time(2.0);
        assert_eq!(episode.timespan(), 2.0);
        assert_eq!(episode.index(), 3);
    }

    proptest! {
        #[test]
        fn prop_sorted_timestamps_always_accepted(mut times in prop::collection::vec(0.0f64..100.0, 0..50)) {
            times.sort_by(|a, b| a.total_cmp(b));
            let mut episode = Episode::new(0);
            for t in &times {
                prop_assert!(episode.push(frame(*t, 0.0)).is_ok());
            }
            prop_assert_eq!(episode.len(), times.len());
            prop_assert!(episode.frames().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }

        #[test]
        fn prop_earlier_timestamp_rejected_without_change(
            mut times in prop::collection::vec(0.0f64..100.0, 1..50),
            back in 0.001f64..50.0,
        ) {
            times.sort_by(|a, b| a.total_cmp(b));
            let mut episode = Episode::new(0);
            for t in &times {
                episode.push(frame(*t, 0.0)).unwrap();
            }
            let before = episode.clone();

            let last = times[times.len() - 1];
            let result = episode.push(frame(last - back, 1.0));
            let is_violation = matches!(
                result,
                Err(DatasetError::TemporalInvariantViolation { previous, next })
                    if previous == last && next == last - back
            );
            prop_assert!(is_violation);
            prop_assert_eq!(episode, before);
        }
    }
}

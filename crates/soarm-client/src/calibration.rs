//! 校准
//!
//! 校准严格按以下阶段执行，每个阶段开始前触发 `on_stage` 回调
//! （回调是同步的，界面可以在回调中等待用户确认）：
//!
//! 1. 所有电机释放扭矩，归零偏移清 0（读数恢复为真实物理位置）
//! 2. 读取当前位置，`homing_offset = position - mid`，立即写回（之后的读数以中位为中心）
//! 3. 记录活动范围：约 20Hz 循环读取所有电机并扩展 min/max，直到调用 [`CalibrationHandle::stop`]
//! 4. 按型号前缀覆盖连续旋转关节的范围为全行程
//! 5. 写入限位寄存器，失败则整个校准中止（已写入的归零偏移不回滚）
//! 6. 汇总为 [`CalibrationResult`]
//!
//! # 停止
//!
//! `stop()` 只设置标志位，正在进行的读取会完成后再退出循环（延迟约一个采样周期）。

use crate::robot::{RobotProfile, continuous_joints};
use serde::{Deserialize, Serialize};
use soarm_driver::{DriverError, MotorBus, MotorConfig, SharedBus};
use soarm_serial::Transport;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// 校准阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalibrationStage {
    ResetHomingOffsets,
    CaptureHomingOffsets,
    RecordRange,
    ApplyOverrides,
    CommitLimits,
    Compile,
}

impl fmt::Display for CalibrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalibrationStage::ResetHomingOffsets => "reset homing offsets",
            CalibrationStage::CaptureHomingOffsets => "capture homing offsets",
            CalibrationStage::RecordRange => "record range of motion",
            CalibrationStage::ApplyOverrides => "apply overrides",
            CalibrationStage::CommitLimits => "commit limits",
            CalibrationStage::Compile => "compile result",
        };
        f.write_str(name)
    }
}

/// 校准错误
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// 寄存器写入失败，校准整体失败
    #[error("Calibration aborted during {stage}: {source}")]
    Abort {
        stage: CalibrationStage,
        #[source]
        source: DriverError,
    },

    /// 读取时总线出现致命错误
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Invalid calibration data: {0}")]
    Json(#[from] serde_json::Error),

    /// 范围上下限颠倒
    #[error("Invalid range for {name}: min {min} > max {max}")]
    InvertedRange { name: String, min: u16, max: u16 },
}

/// 校准参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationConfig {
    /// 归零偏移清 0 后的等待
    pub settle_delay: Duration,
    /// 活动范围采样周期
    pub sample_period: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            sample_period: Duration::from_millis(50),
        }
    }
}

impl CalibrationConfig {
    /// 无等待（测试使用）
    pub const fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            sample_period: Duration::ZERO,
        }
    }
}

/// 单个电机的实时范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorRange {
    pub name: String,
    pub id: u8,
    pub current: u16,
    pub min: u16,
    pub max: u16,
}

impl MotorRange {
    fn new(name: &str, id: u8, position: u16) -> Self {
        Self {
            name: name.to_string(),
            id,
            current: position,
            min: position,
            max: position,
        }
    }

    fn update(&mut self, position: u16) {
        self.current = position;
        self.min = self.min.min(position);
        self.max = self.max.max(position);
    }

    pub fn range(&self) -> u16 {
        self.max - self.min
    }
}

/// 单个电机的校准结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorCalibration {
    pub name: String,
    pub id: u8,
    /// 极性（参考型号固定为 0）
    pub drive_mode: u8,
    pub homing_offset: i32,
    pub range_min: u16,
    pub range_max: u16,
}

/// 校准结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub robot_type: String,
    pub motors: Vec<MotorCalibration>,
}

impl CalibrationResult {
    pub fn get(&self, name: &str) -> Option<&MotorCalibration> {
        self.motors.iter().find(|m| m.name == name)
    }

    pub fn to_json(&self) -> Result<String, CalibrationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CalibrationError> {
        let result: Self = serde_json::from_str(json)?;
        if let Some(m) = result.motors.iter().find(|m| m.range_min > m.range_max) {
            return Err(CalibrationError::InvertedRange {
                name: m.name.clone(),
                min: m.range_min,
                max: m.range_max,
            });
        }
        Ok(result)
    }

    /// 以校准范围作为限位的电机配置（初始位置取范围中点）
    pub fn motor_configs(&self) -> Vec<MotorConfig> {
        self.motors
            .iter()
            .map(|m| {
                let (min, max) = (m.range_min.min(m.range_max), m.range_min.max(m.range_max));
                MotorConfig {
                    id: m.id,
                    name: m.name.clone(),
                    current_position: min + (max - min) / 2,
                    min_position: min,
                    max_position: max,
                }
            })
            .collect()
    }
}

/// 把已保存的校准结果重新写入电机
pub fn apply_calibration<T: Transport>(
    bus: &mut MotorBus<T>,
    calibration: &CalibrationResult,
) -> Result<(), DriverError> {
    for motor in &calibration.motors {
        bus.write_homing_offset(motor.id, motor.homing_offset)?;
        bus.write_limits(motor.id, motor.range_min, motor.range_max)?;
        debug!(
            "Applied calibration to {}: offset {}, range [{}, {}]",
            motor.name, motor.homing_offset, motor.range_min, motor.range_max
        );
    }
    info!("Calibration applied to {} motors", calibration.motors.len());
    Ok(())
}

/// 连续旋转关节的范围覆盖为 `[0, max_position]`
pub fn apply_range_overrides(robot_type: &str, ranges: &mut [MotorRange], max_position: u16) {
    for joint in continuous_joints(robot_type) {
        if let Some(range) = ranges.iter_mut().find(|r| r.name == joint) {
            info!(
                "{} is continuous on {}, overriding range [{}, {}] -> [0, {}]",
                joint, robot_type, range.min, range.max, max_position
            );
            range.min = 0;
            range.max = max_position;
        }
    }
}

/// 停止句柄
#[derive(Debug, Clone)]
pub struct CalibrationHandle {
    stop: Arc<AtomicBool>,
}

impl CalibrationHandle {
    /// 请求结束活动范围记录
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

type ProgressCallback = Arc<dyn Fn(&[MotorRange]) + Send + Sync>;
type StageCallback = Arc<dyn Fn(CalibrationStage) + Send + Sync>;

/// 校准引擎
pub struct CalibrationEngine<T: Transport> {
    bus: SharedBus<T>,
    profile: RobotProfile,
    config: CalibrationConfig,
    stop: Arc<AtomicBool>,
    progress: Vec<ProgressCallback>,
    stages: Vec<StageCallback>,
}

impl<T: Transport> CalibrationEngine<T> {
    pub fn new(bus: SharedBus<T>, profile: RobotProfile) -> Self {
        Self {
            bus,
            profile,
            config: CalibrationConfig::default(),
            stop: Arc::new(AtomicBool::new(false)),
            progress: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: CalibrationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn handle(&self) -> CalibrationHandle {
        CalibrationHandle {
            stop: self.stop.clone(),
        }
    }

    /// 订阅活动范围的实时更新
    pub fn on_progress<F>(&mut self, callback: F)
    where
        F: Fn(&[MotorRange]) + Send + Sync + 'static,
    {
        self.progress.push(Arc::new(callback));
    }

    /// 订阅阶段切换（在阶段开始前调用）
    pub fn on_stage<F>(&mut self, callback: F)
    where
        F: Fn(CalibrationStage) + Send + Sync + 'static,
    {
        self.stages.push(Arc::new(callback));
    }

    /// 执行完整校准
    pub fn run(&self) -> Result<CalibrationResult, CalibrationError> {
        let ids = self.profile.ids();
        info!(
            "Calibrating {} ({} motors)",
            self.profile.robot_type,
            ids.len()
        );

        // 1. 归零偏移清 0
        let stage = self.enter(CalibrationStage::ResetHomingOffsets);
        {
            let mut bus = self.bus.lock();
            bus.release_all(&ids).map_err(abort(stage))?;
            for &id in &ids {
                bus.write_homing_offset(id, 0).map_err(abort(stage))?;
            }
        }
        if !self.config.settle_delay.is_zero() {
            spin_sleep::sleep(self.config.settle_delay);
        }

        // 2. 记录归零偏移
        let stage = self.enter(CalibrationStage::CaptureHomingOffsets);
        let mut offsets = Vec::with_capacity(ids.len());
        {
            let mut bus = self.bus.lock();
            let mid = i32::from(bus.fallback_position());
            for joint in &self.profile.joints {
                let raw = bus.read_position_or_fallback(joint.id)?;
                let offset = i32::from(raw) - mid;
                bus.write_homing_offset(joint.id, offset)
                    .map_err(abort(stage))?;
                debug!("{}: raw {} -> homing offset {}", joint.name, raw, offset);
                offsets.push(offset);
            }
        }

        // 3. 记录活动范围
        self.enter(CalibrationStage::RecordRange);
        let mut ranges = self.record_ranges(&ids)?;

        // 4. 型号覆盖
        self.enter(CalibrationStage::ApplyOverrides);
        let max_position = self.bus.lock().table().max_position();
        apply_range_overrides(&self.profile.robot_type, &mut ranges, max_position);

        // 5. 写入限位
        let stage = self.enter(CalibrationStage::CommitLimits);
        {
            let mut bus = self.bus.lock();
            for range in &ranges {
                bus.write_limits(range.id, range.min, range.max)
                    .map_err(abort(stage))?;
            }
        }

        // 6. 汇总
        self.enter(CalibrationStage::Compile);
        let motors = ranges
            .into_iter()
            .zip(offsets)
            .map(|(range, homing_offset)| MotorCalibration {
                name: range.name,
                id: range.id,
                drive_mode: 0,
                homing_offset,
                range_min: range.min,
                range_max: range.max,
            })
            .collect();

        info!("Calibration of {} complete", self.profile.robot_type);
        Ok(CalibrationResult {
            robot_type: self.profile.robot_type.clone(),
            motors,
        })
    }

    fn record_ranges(&self, ids: &[u8]) -> Result<Vec<MotorRange>, CalibrationError> {
        let initial = self.bus.lock().read_all_or_fallback(ids)?;
        let mut ranges: Vec<MotorRange> = self
            .profile
            .joints
            .iter()
            .zip(initial)
            .map(|(joint, position)| MotorRange::new(joint.name, joint.id, position))
            .collect();
        self.notify_progress(&ranges);

        let period = self.config.sample_period;
        let mut next_tick = Instant::now();
        let mut samples = 0u64;

        while !self.stop.load(Ordering::Acquire) {
            next_tick += period;

            // 读取失败的电机本轮跳过，下一轮再试
            let positions = self.bus.lock().read_all(ids)?;
            for (range, position) in ranges.iter_mut().zip(positions) {
                if let Some(position) = position {
                    range.update(position);
                }
            }
            samples += 1;
            self.notify_progress(&ranges);

            let now = Instant::now();
            if next_tick > now {
                spin_sleep::sleep(next_tick - now);
            } else {
                next_tick = now;
            }
        }

        info!("Range recording stopped after {} samples", samples);
        Ok(ranges)
    }

    fn enter(&self, stage: CalibrationStage) -> CalibrationStage {
        debug!("Calibration stage: {}", stage);
        for callback in &self.stages {
            callback(stage);
        }
        stage
    }

    fn notify_progress(&self, ranges: &[MotorRange]) {
        for callback in &self.progress {
            callback(ranges);
        }
    }
}

fn abort(stage: CalibrationStage) -> impl Fn(DriverError) -> CalibrationError {
    move |source| CalibrationError::Abort { stage, source }
}

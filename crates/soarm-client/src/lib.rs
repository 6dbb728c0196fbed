//! 客户端接口模块
//!
//! 本模块提供 SO-100 / SO-101 机械臂的用户友好接口，包括：
//! - 校准（归零偏移 + 活动范围 + 限位写入）
//! - 遥操作（键盘固定频率循环 / 直接设定）
//! - 固定频率调度器（跳过超时周期）
//! - 机械臂型号描述与默认键位
//! - 可注入的用户配置存储
//!
//! # 使用场景
//!
//! 这是大多数用户应该使用的模块。如果需要直接读写寄存器，
//! 可以使用 `soarm-driver` 提供的 `MotorBus`。

pub mod calibration;
pub mod config;
pub mod robot;
pub mod scheduler;
pub mod teleop;

// 重新导出常用类型
pub use calibration::{
    CalibrationConfig, CalibrationEngine, CalibrationError, CalibrationHandle, CalibrationResult,
    CalibrationStage, MotorCalibration, MotorRange, apply_calibration,
};
pub use config::{ConfigError, ConfigStore, MemoryConfigStore, Settings, TomlConfigStore};
pub use robot::RobotProfile;
pub use scheduler::{FixedRateScheduler, SchedulerStats, TickControl};
pub use teleop::{
    DirectTeleoperator, KeyBinding, KeyBindings, KeyboardTeleoperator, TeleopConfig, TeleopError,
    TeleopState, Teleoperator,
};

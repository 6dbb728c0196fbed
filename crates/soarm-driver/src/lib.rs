//! 驱动层模块
//!
//! 本模块提供 SO-ARM 舵机总线的寄存器操作，包括：
//! - 位置读写（带重试与中位回退）
//! - 寄存器写入、扭矩锁定/释放、限位与归零偏移
//! - 写入应答策略（乐观/严格）
//! - 钩子系统：电机变更事件的多订阅者分发
//!
//! # 使用场景
//!
//! 校准与遥操作都构建在 [`MotorBus`] 之上。
//! 大多数用户应该使用 `soarm-client` 提供的更高级接口。

mod bus;
mod error;
pub mod hooks;
mod motor;

pub use bus::{AckPolicy, BusTiming, MotorBus};
pub use error::DriverError;
pub use hooks::{ChangeHooks, ChannelHook, MotorChangeCallback};
pub use motor::{MotorChangeEvent, MotorConfig, SharedBus, shared};

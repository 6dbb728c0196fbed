//! 遥操作
//!
//! 两种控制策略实现同一个 [`Teleoperator`] 接口：
//! - [`KeyboardTeleoperator`]: 固定频率循环，按住按键时每个周期移动一步
//! - [`DirectTeleoperator`]: 直接设定目标位置（滑块、程序控制）
//!
//! 两者可以共享同一条 [`SharedBus`]。每次写入成功后都会发出 [`MotorChangeEvent`]，
//! 事件在持有总线锁时同步分发，因此所有订阅者看到的事件顺序与总线上的写入顺序一致。
//!
//! # 注意
//!
//! 回调在总线锁内执行，不能再访问同一条总线。

mod direct;
mod keyboard;
mod keys;

pub use direct::DirectTeleoperator;
pub use keyboard::{KeyboardTeleoperator, TeleopConfig};
pub use keys::{KeyBinding, KeyBindings, KeyState};

use soarm_driver::{
    ChangeHooks, DriverError, MotorBus, MotorChangeCallback, MotorChangeEvent, MotorConfig,
    SharedBus,
};
use soarm_serial::Transport;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// 遥操作错误
#[derive(Error, Debug)]
pub enum TeleopError {
    #[error("Unknown motor: {0}")]
    UnknownMotor(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Failed to spawn control loop: {0}")]
    Spawn(#[from] std::io::Error),
}

/// 控制策略状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeleopState {
    #[default]
    Idle,
    Active,
}

/// 控制策略公共接口
///
/// 录制器只依赖此接口（通过 `on_change`），不依赖具体策略。
pub trait Teleoperator: Send + Sync {
    /// 进入 Active；已经是 Active 时什么也不做
    fn start(&self) -> Result<(), TeleopError>;

    /// 回到 Idle，等待当前周期完成
    fn stop(&self);

    fn state(&self) -> TeleopState;

    /// 直接设定某个关节的目标位置，返回钳位后的实际目标
    fn move_motor(&self, motor_name: &str, target: i32) -> Result<u16, TeleopError>;

    /// 当前电机配置快照
    fn motor_configs(&self) -> Vec<MotorConfig>;

    /// 注册变更回调
    fn on_change(&self, callback: Arc<dyn MotorChangeCallback>);
}

/// 把一个关节写到目标位置（已钳位），成功后更新配置并分发事件
///
/// 目标与当前位置相同时不写入，返回 `Ok(None)`。
pub(crate) fn apply_target<T: Transport>(
    bus: &mut MotorBus<T>,
    motor: &mut MotorConfig,
    target: u16,
    hooks: &ChangeHooks,
) -> Result<Option<MotorChangeEvent>, DriverError> {
    if target == motor.current_position {
        return Ok(None);
    }

    let previous = motor.current_position;
    let command_sent_at = Instant::now();
    let written = bus.write_goal_position(motor.id, i32::from(target))?;
    let position_applied_at = Instant::now();

    motor.current_position = written;
    let event = MotorChangeEvent {
        motor_name: motor.name.clone(),
        motor_config: motor.clone(),
        previous_position: previous,
        new_position: written,
        command_sent_at,
        position_applied_at,
    };
    hooks.trigger_all(&event);
    debug!("{}: {} -> {}", motor.name, previous, written);
    Ok(Some(event))
}

/// 用总线上读到的位置刷新电机配置（读取失败的保留原值）
pub(crate) fn seed_positions<T: Transport>(
    bus: &SharedBus<T>,
    motors: &mut [MotorConfig],
) -> Result<(), DriverError> {
    let mut bus = bus.lock();
    for motor in motors.iter_mut() {
        match bus.read_position(motor.id)? {
            Some(position) => motor.current_position = position,
            None => warn!(
                "Could not read initial position of {}, keeping {}",
                motor.name, motor.current_position
            ),
        }
    }
    Ok(())
}

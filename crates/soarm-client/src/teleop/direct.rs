//! 直接设定目标位置
//!
//! 不经过控制循环：每次 `move_motor` 钳位一次、写入一次，立即发出变更事件。
//! 用于滑块或程序控制，可以与键盘遥操作共享同一条总线。

use super::{TeleopError, TeleopState, Teleoperator, apply_target, seed_positions};
use parking_lot::{Mutex, RwLock};
use soarm_driver::{ChangeHooks, MotorChangeCallback, MotorConfig, SharedBus};
use soarm_serial::Transport;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// 直接控制
pub struct DirectTeleoperator<T: Transport> {
    bus: SharedBus<T>,
    motors: Mutex<Vec<MotorConfig>>,
    hooks: RwLock<ChangeHooks>,
    active: AtomicBool,
    read_initial_positions: bool,
}

impl<T: Transport> DirectTeleoperator<T> {
    pub fn new(bus: SharedBus<T>, motors: Vec<MotorConfig>) -> Self {
        Self {
            bus,
            motors: Mutex::new(motors),
            hooks: RwLock::new(ChangeHooks::new()),
            active: AtomicBool::new(false),
            read_initial_positions: true,
        }
    }

    /// 启动时是否从总线读取当前位置
    pub fn with_initial_read(mut self, enabled: bool) -> Self {
        self.read_initial_positions = enabled;
        self
    }

    /// 依次设定多个关节，返回每个关节钳位后的目标
    pub fn move_motors(&self, targets: &[(&str, i32)]) -> Result<Vec<u16>, TeleopError> {
        targets
            .iter()
            .map(|(name, target)| self.move_motor(name, *target))
            .collect()
    }
}

impl<T: Transport> Teleoperator for DirectTeleoperator<T> {
    fn start(&self) -> Result<(), TeleopError> {
        if self.active.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.read_initial_positions {
            let mut motors = self.motors.lock();
            seed_positions(&self.bus, &mut motors)?;
        }
        self.active.store(true, Ordering::Release);
        info!("Direct teleoperation started");
        Ok(())
    }

    fn stop(&self) {
        self.active.store(false, Ordering::Release);
        info!("Direct teleoperation stopped");
    }

    fn state(&self) -> TeleopState {
        if self.active.load(Ordering::Acquire) {
            TeleopState::Active
        } else {
            TeleopState::Idle
        }
    }

    fn move_motor(&self, motor_name: &str, target: i32) -> Result<u16, TeleopError> {
        let mut motors = self.motors.lock();
        let motor = motors
            .iter_mut()
            .find(|m| m.name == motor_name)
            .ok_or_else(|| TeleopError::UnknownMotor(motor_name.to_string()))?;

        let target = motor.clamp(target);
        let mut bus = self.bus.lock();
        let hooks = self.hooks.read();
        apply_target(&mut bus, motor, target, &hooks)?;
        Ok(target)
    }

    fn motor_configs(&self) -> Vec<MotorConfig> {
        self.motors.lock().clone()
    }

    fn on_change(&self, callback: Arc<dyn MotorChangeCallback>) {
        self.hooks.write().add_callback(callback);
    }
}

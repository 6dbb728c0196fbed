//! 键盘遥操作
//!
//! # 状态机
//!
//! `Idle → Active → Idle`。Active 期间固定频率（默认 60Hz）执行周期函数：
//!
//! 1. 淘汰超时的按键状态（防止丢失松开事件导致的卡键）
//! 2. 收集仍处于按下状态的按键
//! 3. 停止键按下：回到 Idle，本周期不写入
//! 4. 同一关节的所有按键按 `direction × step_size` 累加
//! 5. 钳位到关节限位
//! 6. 目标变化的关节逐个写入并发出变更事件
//!
//! 按住按键的每个周期都移动一步（不区分首次按下与持续按住），
//! 点按与长按因此具有一致的速度。

use super::{
    KeyBindings, KeyState, TeleopError, TeleopState, Teleoperator, apply_target, seed_positions,
};
use crate::scheduler::{FixedRateScheduler, TickControl};
use parking_lot::{Mutex, RwLock};
use soarm_driver::{ChangeHooks, MotorChangeCallback, MotorConfig, SharedBus};
use soarm_serial::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 键盘遥操作配置
#[derive(Debug, Clone, PartialEq)]
pub struct TeleopConfig {
    /// 控制频率（Hz）
    ///
    /// `<= 0` 时不启动内部调度线程，由调用方通过
    /// [`KeyboardTeleoperator::step`] 驱动（外部时钟）。
    pub tick_rate_hz: f64,
    /// 每个周期每个按键的步长（原始刻度）
    pub step_size: i32,
    /// 按键状态超时
    pub key_timeout: Duration,
    /// 启动时从总线读取当前位置
    pub read_initial_positions: bool,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60.0,
            step_size: 10,
            key_timeout: Duration::from_secs(10),
            read_initial_positions: true,
        }
    }
}

struct Shared<T: Transport> {
    bus: SharedBus<T>,
    motors: Mutex<Vec<MotorConfig>>,
    keys: Mutex<HashMap<String, KeyState>>,
    bindings: KeyBindings,
    config: TeleopConfig,
    hooks: RwLock<ChangeHooks>,
    active: AtomicBool,
}

impl<T: Transport> Shared<T> {
    fn tick(&self, now: Instant) -> TickControl {
        if !self.active.load(Ordering::Acquire) {
            return TickControl::Stop;
        }

        let pressed: Vec<String> = {
            let mut keys = self.keys.lock();
            let timeout = self.config.key_timeout;
            keys.retain(|key, state| {
                let expired = state.is_expired(now, timeout);
                if expired {
                    debug!("Evicting stale key state: {}", key);
                }
                !expired
            });
            keys.iter()
                .filter(|(_, state)| state.pressed)
                .map(|(key, _)| key.clone())
                .collect()
        };

        if pressed.iter().any(|key| key == self.bindings.stop_key()) {
            self.active.store(false, Ordering::Release);
            self.keys.lock().clear();
            info!("Stop key pressed, teleoperation halted");
            return TickControl::Stop;
        }

        if pressed.is_empty() {
            return TickControl::Continue;
        }

        let mut deltas: HashMap<&str, i32> = HashMap::new();
        for key in &pressed {
            if let Some(binding) = self.bindings.get(key) {
                *deltas.entry(binding.motor_name.as_str()).or_default() +=
                    binding.direction * self.config.step_size;
            }
        }

        let mut motors = self.motors.lock();
        let mut bus = self.bus.lock();
        let hooks = self.hooks.read();

        for motor in motors.iter_mut() {
            let Some(&delta) = deltas.get(motor.name.as_str()) else {
                continue;
            };
            let target = motor.clamp(i32::from(motor.current_position) + delta);

            match apply_target(&mut bus, motor, target, &hooks) {
                Ok(_) => {},
                Err(e) if e.is_fatal() => {
                    error!("Fatal bus error, stopping teleoperation: {}", e);
                    self.active.store(false, Ordering::Release);
                    return TickControl::Stop;
                },
                Err(e) => warn!("Failed to move {}: {}", motor.name, e),
            }
        }

        TickControl::Continue
    }
}

/// 键盘遥操作
pub struct KeyboardTeleoperator<T: Transport + 'static> {
    shared: Arc<Shared<T>>,
    scheduler: Mutex<Option<FixedRateScheduler>>,
}

impl<T: Transport + 'static> KeyboardTeleoperator<T> {
    pub fn new(
        bus: SharedBus<T>,
        motors: Vec<MotorConfig>,
        bindings: KeyBindings,
        config: TeleopConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                bus,
                motors: Mutex::new(motors),
                keys: Mutex::new(HashMap::new()),
                bindings,
                config,
                hooks: RwLock::new(ChangeHooks::new()),
                active: AtomicBool::new(false),
            }),
            scheduler: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &TeleopConfig {
        &self.shared.config
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.shared.bindings
    }

    /// 按下
    pub fn press(&self, key: &str) {
        self.key_event(key, true);
    }

    /// 松开
    pub fn release(&self, key: &str) {
        self.key_event(key, false);
    }

    /// 按键事件（时间戳取当前时刻）
    pub fn key_event(&self, key: &str, pressed: bool) {
        self.key_event_at(key, pressed, Instant::now());
    }

    /// 按键事件（指定时间戳）
    ///
    /// 未绑定的按键被忽略。
    pub fn key_event_at(&self, key: &str, pressed: bool, timestamp: Instant) {
        if !self.shared.bindings.is_bound(key) {
            return;
        }
        self.shared
            .keys
            .lock()
            .insert(key.to_string(), KeyState { pressed, timestamp });
    }

    /// 当前按下的按键
    pub fn pressed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .shared
            .keys
            .lock()
            .iter()
            .filter(|(_, state)| state.pressed)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// 执行一个控制周期
    pub fn step(&self) -> TickControl {
        self.shared.tick(Instant::now())
    }

    /// 以指定时刻执行一个控制周期
    pub fn step_at(&self, now: Instant) -> TickControl {
        self.shared.tick(now)
    }

    /// 内部调度线程统计（外部时钟模式下为 `None`）
    pub fn scheduler_stats(&self) -> Option<crate::scheduler::SchedulerStats> {
        self.scheduler.lock().as_ref().map(|s| s.stats())
    }
}

impl<T: Transport + 'static> Teleoperator for KeyboardTeleoperator<T> {
    fn start(&self) -> Result<(), TeleopError> {
        let mut scheduler = self.scheduler.lock();
        if self.shared.active.load(Ordering::Acquire) {
            debug!("Keyboard teleoperation already active");
            return Ok(());
        }

        // 上一次被停止键终止的调度线程
        if let Some(mut previous) = scheduler.take() {
            previous.stop();
        }

        if self.shared.config.read_initial_positions {
            let mut motors = self.shared.motors.lock();
            seed_positions(&self.shared.bus, &mut motors)?;
        }

        self.shared.keys.lock().clear();
        self.shared.active.store(true, Ordering::Release);

        let rate = self.shared.config.tick_rate_hz;
        if rate > 0.0 {
            let shared = self.shared.clone();
            match FixedRateScheduler::start_hz("soarm-teleop", rate, move || {
                shared.tick(Instant::now())
            }) {
                Ok(handle) => *scheduler = Some(handle),
                Err(e) => {
                    self.shared.active.store(false, Ordering::Release);
                    return Err(e.into());
                },
            }
        }

        info!("Keyboard teleoperation started ({} Hz)", rate);
        Ok(())
    }

    fn stop(&self) {
        self.shared.active.store(false, Ordering::Release);
        if let Some(mut scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }
        self.shared.keys.lock().clear();
        info!("Keyboard teleoperation stopped");
    }

    fn state(&self) -> TeleopState {
        if self.shared.active.load(Ordering::Acquire) {
            TeleopState::Active
        } else {
            TeleopState::Idle
        }
    }

    fn move_motor(&self, motor_name: &str, target: i32) -> Result<u16, TeleopError> {
        let mut motors = self.shared.motors.lock();
        let motor = motors
            .iter_mut()
            .find(|m| m.name == motor_name)
            .ok_or_else(|| TeleopError::UnknownMotor(motor_name.to_string()))?;

        let target = motor.clamp(target);
        let mut bus = self.shared.bus.lock();
        let hooks = self.shared.hooks.read();
        apply_target(&mut bus, motor, target, &hooks)?;
        Ok(target)
    }

    fn motor_configs(&self) -> Vec<MotorConfig> {
        self.shared.motors.lock().clone()
    }

    fn on_change(&self, callback: Arc<dyn MotorChangeCallback>) {
        self.shared.hooks.write().add_callback(callback);
    }
}

impl<T: Transport + 'static> Drop for KeyboardTeleoperator<T> {
    fn drop(&mut self) {
        self.shared.active.store(false, Ordering::Release);
        if let Some(mut scheduler) = self.scheduler.get_mut().take() {
            scheduler.stop();
        }
    }
}

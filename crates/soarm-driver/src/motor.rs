//! 电机配置与变更事件

use crate::MotorBus;
use parking_lot::Mutex;
use soarm_serial::Transport;
use std::sync::Arc;
use std::time::Instant;

/// 单个关节的电机配置
///
/// 由当前的控制策略独占修改，仅在写入确认（或假定成功）后更新 `current_position`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorConfig {
    pub id: u8,
    pub name: String,
    pub current_position: u16,
    pub min_position: u16,
    pub max_position: u16,
}

impl MotorConfig {
    /// 以全行程范围创建，初始位置为中位
    pub fn new(id: u8, name: impl Into<String>, resolution: u16) -> Self {
        Self {
            id,
            name: name.into(),
            current_position: soarm_protocol::mid_position(resolution),
            min_position: 0,
            max_position: resolution - 1,
        }
    }

    pub fn with_limits(mut self, min_position: u16, max_position: u16) -> Self {
        self.min_position = min_position;
        self.max_position = max_position;
        self
    }

    /// 钳位到 `[min_position, max_position]`
    pub fn clamp(&self, target: i32) -> u16 {
        let (lo, hi) = if self.min_position <= self.max_position {
            (self.min_position, self.max_position)
        } else {
            (self.max_position, self.min_position)
        };
        target.clamp(i32::from(lo), i32::from(hi)) as u16
    }
}

/// 电机位置变更事件
///
/// 每次成功写入后发出一次。`motor_config` 是写入后的快照。
#[derive(Debug, Clone)]
pub struct MotorChangeEvent {
    pub motor_name: String,
    pub motor_config: MotorConfig,
    pub previous_position: u16,
    pub new_position: u16,
    /// 写指令发出的时刻
    pub command_sent_at: Instant,
    /// 写入完成（收到应答或放弃等待）的时刻
    pub position_applied_at: Instant,
}

/// 多个控制策略共享的总线
///
/// 同一时刻只有持锁者能访问总线，避免请求交错。
pub type SharedBus<T> = Arc<Mutex<MotorBus<T>>>;

/// 包装为共享总线
pub fn shared<T: Transport>(bus: MotorBus<T>) -> SharedBus<T> {
    Arc::new(Mutex::new(bus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_motor_config_new() {
        let motor = MotorConfig::new(1, "shoulder_pan", 4096);
        assert_eq!(motor.current_position, 2047);
        assert_eq!(motor.min_position, 0);
        assert_eq!(motor.max_position, 4095);
    }

    #[test]
    fn test_motor_config_clamp() {
        let motor = MotorConfig::new(1, "elbow_flex", 4096).with_limits(1200, 3400);
        assert_eq!(motor.clamp(0), 1200);
        assert_eq!(motor.clamp(9999), 3400);
        assert_eq!(motor.clamp(2000), 2000);
    }

    #[test]
    fn test_motor_config_clamp_swapped_limits() {
        let motor = MotorConfig::new(1, "gripper", 4096).with_limits(3000, 1000);
        assert_eq!(motor.clamp(0), 1000);
        assert_eq!(motor.clamp(4000), 3000);
    }

    proptest! {
        #[test]
        fn prop_clamp_stays_in_limits(
            a in 0u16..4096,
            b in 0u16..4096,
            target in -100_000i32..100_000,
        ) {
            let (min, max) = (a.min(b), a.max(b));
            let motor = MotorConfig::new(1, "m", 4096).with_limits(min, max);
            let clamped = motor.clamp(target);
            prop_assert!(clamped >= min && clamped <= max);
        }
    }
}

//! 按键绑定与按键状态

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// 按键 → 关节方向
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub motor_name: String,
    /// `+1` 或 `-1`
    pub direction: i32,
}

impl KeyBinding {
    pub fn new(motor_name: impl Into<String>, direction: i32) -> Self {
        Self {
            motor_name: motor_name.into(),
            direction: direction.signum(),
        }
    }
}

/// 一套控制方案的按键绑定
///
/// 按键用名称表示（`"ArrowUp"`、`"w"`、`"Escape"`），与具体终端/窗口库无关。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings {
    bindings: HashMap<String, KeyBinding>,
    stop_key: String,
}

impl KeyBindings {
    pub fn new(stop_key: impl Into<String>) -> Self {
        Self {
            bindings: HashMap::new(),
            stop_key: stop_key.into(),
        }
    }

    /// 绑定一对正/反方向按键
    pub fn bind_pair(mut self, motor_name: &str, positive: &str, negative: &str) -> Self {
        self.bind(positive, KeyBinding::new(motor_name, 1));
        self.bind(negative, KeyBinding::new(motor_name, -1));
        self
    }

    pub fn bind(&mut self, key: impl Into<String>, binding: KeyBinding) {
        self.bindings.insert(key.into(), binding);
    }

    pub fn get(&self, key: &str) -> Option<&KeyBinding> {
        self.bindings.get(key)
    }

    pub fn stop_key(&self) -> &str {
        &self.stop_key
    }

    /// 是否为已知按键（绑定键或停止键）
    pub fn is_bound(&self, key: &str) -> bool {
        key == self.stop_key || self.bindings.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KeyBinding)> {
        self.bindings.iter()
    }
}

impl Default for KeyBindings {
    /// SO-100 / SO-101 默认键位
    fn default() -> Self {
        KeyBindings::new("Escape")
            .bind_pair("shoulder_pan", "ArrowRight", "ArrowLeft")
            .bind_pair("shoulder_lift", "ArrowUp", "ArrowDown")
            .bind_pair("elbow_flex", "w", "s")
            .bind_pair("wrist_flex", "a", "d")
            .bind_pair("wrist_roll", "q", "e")
            .bind_pair("gripper", "o", "c")
    }
}

/// 按键状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    pub pressed: bool,
    /// 最近一次按下/松开的时刻
    pub timestamp: Instant,
}

impl KeyState {
    /// 是否已超过超时时间
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.timestamp) > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let bindings = KeyBindings::default();
        assert_eq!(bindings.stop_key(), "Escape");
        assert_eq!(bindings.get("w"), Some(&KeyBinding::new("elbow_flex", 1)));
        assert_eq!(bindings.get("s"), Some(&KeyBinding::new("elbow_flex", -1)));
        assert!(bindings.is_bound("Escape"));
        assert!(!bindings.is_bound("z"));
        assert_eq!(bindings.iter().count(), 12);
    }

    #[test]
    fn test_direction_normalized() {
        assert_eq!(KeyBinding::new("gripper", 5).direction, 1);
        assert_eq!(KeyBinding::new("gripper", -3).direction, -1);
    }

    #[test]
    fn test_key_state_expiry() {
        let now = Instant::now();
        let state = KeyState {
            pressed: true,
            timestamp: now,
        };
        assert!(!state.is_expired(now + Duration::from_secs(9), Duration::from_secs(10)));
        assert!(state.is_expired(now + Duration::from_secs(11), Duration::from_secs(10)));
    }
}

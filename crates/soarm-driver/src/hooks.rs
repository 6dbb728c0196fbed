//! 钩子系统（Hook System）
//!
//! 控制策略每写入一次位置就触发一次 [`MotorChangeEvent`]，
//! 数据录制、界面刷新等订阅者通过 [`ChangeHooks`] 注册。
//!
//! # 设计原则
//!
//! - **多订阅者**: 回调列表而非单一槽位，互不覆盖
//! - **同步触发**: 回调在事件发出的线程内执行，下一次控制周期开始前一定已处理完毕
//! - **类型安全**: 使用 `dyn MotorChangeCallback` trait object
//!
//! # 使用示例
//!
//! ```rust
//! use soarm_driver::hooks::{ChangeHooks, ChannelHook};
//! use std::sync::Arc;
//!
//! let mut hooks = ChangeHooks::new();
//! let (hook, rx) = ChannelHook::new();
//! hooks.add_callback(Arc::new(hook));
//! assert_eq!(hooks.len(), 1);
//! assert!(rx.try_recv().is_err());
//! ```

use crate::MotorChangeEvent;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;

/// 电机变更回调 Trait
///
/// 回调在控制线程内同步执行，应尽快返回。
pub trait MotorChangeCallback: Send + Sync {
    /// 电机位置写入后调用
    fn on_motor_change(&self, event: &MotorChangeEvent);
}

impl<F> MotorChangeCallback for F
where
    F: Fn(&MotorChangeEvent) + Send + Sync,
{
    fn on_motor_change(&self, event: &MotorChangeEvent) {
        self(event)
    }
}

/// 回调列表
#[derive(Default)]
pub struct ChangeHooks {
    callbacks: Vec<Arc<dyn MotorChangeCallback>>,
}

impl ChangeHooks {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// 添加回调
    pub fn add_callback(&mut self, callback: Arc<dyn MotorChangeCallback>) {
        self.callbacks.push(callback);
    }

    /// 移除指定回调（按指针比较），返回是否找到
    pub fn remove_callback(&mut self, callback: &Arc<dyn MotorChangeCallback>) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|c| !Arc::ptr_eq(c, callback));
        self.callbacks.len() != before
    }

    /// 移除所有回调
    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    /// 按注册顺序触发所有回调
    pub fn trigger_all(&self, event: &MotorChangeEvent) {
        for callback in self.callbacks.iter() {
            callback.on_motor_change(event);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// 把事件转发到 channel 的回调（供其他线程消费）
pub struct ChannelHook {
    sender: Sender<MotorChangeEvent>,
}

impl ChannelHook {
    pub fn new() -> (Self, Receiver<MotorChangeEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl MotorChangeCallback for ChannelHook {
    fn on_motor_change(&self, event: &MotorChangeEvent) {
        // 接收端已关闭时丢弃
        let _ = self.sender.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MotorConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn event(position: u16) -> MotorChangeEvent {
        let now = Instant::now();
        MotorChangeEvent {
            motor_name: "gripper".into(),
            motor_config: MotorConfig::new(6, "gripper", 4096),
            previous_position: 2047,
            new_position: position,
            command_sent_at: now,
            position_applied_at: now,
        }
    }

    #[test]
    fn test_trigger_all_reaches_every_subscriber() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut hooks = ChangeHooks::new();
        for _ in 0..3 {
            let count = count.clone();
            hooks.add_callback(Arc::new(move |_: &MotorChangeEvent| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        hooks.trigger_all(&event(2100));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_remove_callback() {
        let mut hooks = ChangeHooks::new();
        let callback: Arc<dyn MotorChangeCallback> = Arc::new(|_: &MotorChangeEvent| {});
        hooks.add_callback(callback.clone());
        hooks.add_callback(Arc::new(|_: &MotorChangeEvent| {}));

        assert!(hooks.remove_callback(&callback));
        assert_eq!(hooks.len(), 1);
        assert!(!hooks.remove_callback(&callback));

        hooks.clear();
        assert!(hooks.is_empty());
    }

    #[test]
    fn test_channel_hook_forwards_events() {
        let (hook, rx) = ChannelHook::new();
        let mut hooks = ChangeHooks::new();
        hooks.add_callback(Arc::new(hook));

        hooks.trigger_all(&event(2100));
        hooks.trigger_all(&event(2200));

        let positions: Vec<u16> = rx.try_iter().map(|e| e.new_position).collect();
        assert_eq!(positions, vec![2100, 2200]);
    }
}

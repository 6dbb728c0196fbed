//! 终端按键输入
//!
//! 大多数终端在 raw mode 下只上报按下事件（外加自动重复），没有松开事件。
//! 支持键盘增强协议的终端会上报松开；其余终端用 [`HeldKeys`] 模拟：
//! 超过保持窗口没有再次收到按下/重复事件即视为松开。

use anyhow::{Context, Result};
use crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement};
use std::collections::HashMap;
use std::io::stdout;
use std::time::{Duration, Instant};

/// raw mode 守卫，drop 时恢复终端
pub struct RawTerminal {
    enhanced: bool,
}

impl RawTerminal {
    pub fn enter() -> Result<Self> {
        enable_raw_mode().context("无法进入 raw mode")?;
        let enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
        if enhanced {
            execute!(
                stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )
            .context("无法启用键盘增强协议")?;
        }
        Ok(Self { enhanced })
    }

    /// 终端是否上报按键松开
    pub fn reports_release(&self) -> bool {
        self.enhanced
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = disable_raw_mode();
    }
}

/// 按键名（与默认键位表一致）
pub fn key_name(code: KeyCode) -> Option<String> {
    let name = match code {
        KeyCode::Up => "ArrowUp".to_string(),
        KeyCode::Down => "ArrowDown".to_string(),
        KeyCode::Left => "ArrowLeft".to_string(),
        KeyCode::Right => "ArrowRight".to_string(),
        KeyCode::Esc => "Escape".to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_ascii_lowercase().to_string(),
        _ => return None,
    };
    Some(name)
}

/// Ctrl+C（raw mode 下不会产生 SIGINT）
pub fn is_interrupt(event: &KeyEvent) -> bool {
    event.modifiers.contains(KeyModifiers::CONTROL) && event.code == KeyCode::Char('c')
}

/// 按键状态变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChange {
    Pressed(String),
    Released(String),
}

/// 跟踪当前按住的键
#[derive(Debug)]
pub struct HeldKeys {
    hold: Duration,
    last_seen: HashMap<String, Instant>,
}

impl HeldKeys {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            last_seen: HashMap::new(),
        }
    }

    /// 处理一个按键事件，返回状态变化
    pub fn on_event(&mut self, key: String, kind: KeyEventKind, now: Instant) -> Option<KeyChange> {
        match kind {
            KeyEventKind::Press | KeyEventKind::Repeat => {
                let first = self.last_seen.insert(key.clone(), now).is_none();
                first.then_some(KeyChange::Pressed(key))
            },
            KeyEventKind::Release => self
                .last_seen
                .remove(&key)
                .map(|_| KeyChange::Released(key)),
        }
    }

    /// 超过保持窗口的键视为松开
    pub fn expire(&mut self, now: Instant) -> Vec<KeyChange> {
        let hold = self.hold;
        let expired: Vec<String> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > hold)
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .into_iter()
            .map(|key| {
                self.last_seen.remove(&key);
                KeyChange::Released(key)
            })
            .collect()
    }
}

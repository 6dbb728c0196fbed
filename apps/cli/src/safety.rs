//! 安全检查模块
//!
//! 大幅移动前要求用户确认

use anyhow::Result;

/// 默认确认阈值：约 45°（4096 刻度一圈）
pub const DEFAULT_CONFIRM_THRESHOLD: u16 = 512;

/// 安全检查器
pub struct SafetyChecker {
    confirm_threshold: u16,
}

impl SafetyChecker {
    pub fn new(confirm_threshold: u16) -> Self {
        Self { confirm_threshold }
    }

    /// 最大位移（刻度）
    pub fn max_delta(moves: &[(u16, u16)]) -> u16 {
        moves.iter().map(|(from, to)| from.abs_diff(*to)).max().unwrap_or(0)
    }

    /// 检查是否需要用户确认
    pub fn requires_confirmation(&self, moves: &[(u16, u16)]) -> bool {
        Self::max_delta(moves) > self.confirm_threshold
    }

    /// 显示确认提示
    pub fn show_confirmation_prompt(&self, moves: &[(u16, u16)]) -> Result<bool> {
        println!("⚠️  大幅移动检测");
        println!("  最大位移: {} 刻度", Self::max_delta(moves));

        // ✅ 使用 inquire 提供更好的交互体验
        let confirmed = inquire::Confirm::new("确定要继续吗？")
            .with_default(false) // 默认为 No（安全优先）
            .prompt()
            .map_err(|e| anyhow::anyhow!("用户交互失败: {}", e))?;

        Ok(confirmed)
    }
}

impl Default for SafetyChecker {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRM_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_confirmation() {
        let checker = SafetyChecker::default();

        // 小幅度移动，无需确认
        assert!(!checker.requires_confirmation(&[(2047, 2100), (1000, 900)]));

        // 大幅度移动，需要确认
        assert!(checker.requires_confirmation(&[(2047, 2100), (3000, 1000)]));
        assert!(!checker.requires_confirmation(&[]));
    }

    #[test]
    fn test_max_delta() {
        assert_eq!(SafetyChecker::max_delta(&[(10, 20), (30, 0)]), 30);
    }
}

//! 位置归一化
//!
//! 数据集中的数值不是原始刻度，而是按校准范围归一化后的值：
//! 普通关节映射到 `[-100, 100]`，夹爪映射到 `[0, 100]`。

/// 归一化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormMode {
    /// `[min, max]` → `[-100, 100]`
    #[default]
    RangeM100To100,
    /// `[min, max]` → `[0, 100]`
    Range0To100,
}

impl NormMode {
    /// 归一化原始位置
    ///
    /// 位置先钳位到 `[min, max]`；范围退化（`max <= min`）时返回区间中点。
    pub fn normalize(self, raw: u16, min: u16, max: u16) -> f32 {
        let ratio = if max <= min {
            0.5
        } else {
            let clamped = raw.clamp(min, max);
            f32::from(clamped - min) / f32::from(max - min)
        };

        match self {
            NormMode::RangeM100To100 => ratio * 200.0 - 100.0,
            NormMode::Range0To100 => ratio * 100.0,
        }
    }
}

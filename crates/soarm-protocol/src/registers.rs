//! 寄存器表
//!
//! 参考型号为 Feetech STS3215（SO-100 / SO-101 机械臂使用）。
//! 其他型号的寄存器表属于配置数据，按需构造 [`ControlTable`] 即可。

use crate::ProtocolError;

/// 寄存器地址与宽度（字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub address: u8,
    pub width: u8,
}

impl Register {
    pub const fn new(address: u8, width: u8) -> Self {
        Self { address, width }
    }
}

/// 舵机控制表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlTable {
    /// 型号名称
    pub model: &'static str,
    /// 位置分辨率（取值范围 `0..resolution`）
    pub resolution: u16,
    /// 归零偏移寄存器的符号位
    pub homing_offset_sign_bit: u8,
    pub min_position_limit: Register,
    pub max_position_limit: Register,
    pub homing_offset: Register,
    pub torque_enable: Register,
    pub goal_position: Register,
    pub present_position: Register,
}

impl ControlTable {
    /// Feetech STS3215
    pub const STS3215: ControlTable = ControlTable {
        model: "sts3215",
        resolution: 4096,
        homing_offset_sign_bit: 11,
        min_position_limit: Register::new(9, 2),
        max_position_limit: Register::new(11, 2),
        homing_offset: Register::new(31, 2),
        torque_enable: Register::new(40, 1),
        goal_position: Register::new(42, 2),
        present_position: Register::new(56, 2),
    };

    /// 最大合法位置 `resolution - 1`
    pub fn max_position(&self) -> u16 {
        self.resolution - 1
    }

    /// 中位 `floor((resolution - 1) / 2)`
    pub fn mid_position(&self) -> u16 {
        mid_position(self.resolution)
    }

    /// 将任意目标值钳位到 `[0, resolution - 1]`
    pub fn clamp(&self, value: i32) -> u16 {
        clamp_position(value, self.resolution)
    }
}

impl Default for ControlTable {
    fn default() -> Self {
        Self::STS3215
    }
}

/// 参考型号的分辨率
pub const RESOLUTION: u16 = 4096;

/// 中位 `floor((resolution - 1) / 2)`，同时也是读取失败时的回退位置
pub const fn mid_position(resolution: u16) -> u16 {
    (resolution - 1) / 2
}

/// 钳位到 `[0, resolution - 1]`
pub fn clamp_position(value: i32, resolution: u16) -> u16 {
    value.clamp(0, i32::from(resolution) - 1) as u16
}

/// 符号-幅值编码
///
/// `sign_bit` 置 1 表示负数，低 `sign_bit` 位为幅值。
/// 幅值超过 `2^sign_bit - 1` 时编码失败。
pub fn encode_sign_magnitude(value: i32, sign_bit: u8) -> Result<u16, ProtocolError> {
    let max = (1i32 << sign_bit) - 1;
    let magnitude = value.unsigned_abs();
    if magnitude > max as u32 {
        return Err(ProtocolError::SignMagnitudeOverflow { value, max });
    }

    let mut raw = magnitude as u16;
    if value < 0 {
        raw |= 1 << sign_bit;
    }
    Ok(raw)
}

/// 符号-幅值解码
pub fn decode_sign_magnitude(raw: u16, sign_bit: u8) -> i32 {
    let magnitude = i32::from(raw & ((1u16 << sign_bit) - 1));
    if (raw >> sign_bit) & 1 == 1 {
        -magnitude
    } else {
        magnitude
    }
}

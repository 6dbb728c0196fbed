//! # SO-ARM Protocol
//!
//! 串口总线舵机协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `packet`: 指令包/状态包的编码与解析
//! - `registers`: 寄存器表（STS3215 参考型号）与符号-幅值编码
//! - `normalize`: 原始位置到数据集数值的归一化
//!
//! ## 字节序
//!
//! 协议中多字节整数使用小端字节序（低位在前）。
//! 本模块提供了字节序转换工具函数。
//!
//! ## 包格式
//!
//! ```text
//! [0xFF, 0xFF, ID, Length, Instruction, Address, Data..., Checksum]
//! ```
//!
//! `Length` 为其后剩余的字节数（指令 + 地址 + 数据 + 校验和）。

pub mod normalize;
pub mod packet;
pub mod registers;

// 重新导出常用类型
pub use normalize::*;
pub use packet::*;
pub use registers::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Missing 0xFF 0xFF packet header")]
    InvalidHeader,

    #[error("Servo id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: u8, actual: u8 },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Servo {id} reported error code 0x{code:02X}")]
    DeviceError { id: u8, code: u8 },

    #[error("Unknown instruction: 0x{0:02X}")]
    UnknownInstruction(u8),

    #[error("Value {value} does not fit sign-magnitude encoding (max magnitude {max})")]
    SignMagnitudeOverflow { value: i32, max: i32 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: i64 },
}

/// 小端字节序转 u16
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// u16 转小端字节序
pub fn u16_to_bytes_le(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

//! 指令包与状态包
//!
//! 读写寄存器只需要两条指令（READ/WRITE），PING 仅用于探测舵机是否在线。
//!
//! # 校验和
//!
//! ```text
//! checksum = !(id + length + instruction + params...) & 0xFF
//! ```
//!
//! 状态包（应答）的校验方式相同，只是 instruction 位置换成了错误码。

use crate::{ProtocolError, u16_to_bytes_le};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 包头
pub const HEADER: [u8; 2] = [0xFF, 0xFF];

/// 广播 ID（不会产生应答）
pub const BROADCAST_ID: u8 = 0xFE;

/// 最短的合法状态包：头(2) + id + length + error + checksum
pub const MIN_STATUS_LEN: usize = 6;

/// 单个包可携带的最大数据字节数
///
/// length 字段只有一个字节，需扣除 instruction、address、checksum。
pub const MAX_DATA_LEN: usize = 250;

/// 指令码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Instruction {
    /// 探测
    Ping = 0x01,
    /// 读寄存器
    Read = 0x02,
    /// 写寄存器
    Write = 0x03,
}

impl Instruction {
    /// 该指令是否携带寄存器地址
    pub fn has_address(self) -> bool {
        !matches!(self, Instruction::Ping)
    }
}

/// 计算校验和
///
/// `body` 为 id 之后、校验和之前的所有字节（包含 id 与 length）。
pub fn checksum(body: &[u8]) -> u8 {
    !body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// 主机 → 舵机的指令包
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionPacket {
    pub id: u8,
    pub instruction: Instruction,
    pub address: u8,
    pub data: Vec<u8>,
}

impl InstructionPacket {
    /// 读请求：`data` 只有一个字节，即要读取的字节数
    pub fn read(id: u8, address: u8, len: u8) -> Self {
        Self {
            id,
            instruction: Instruction::Read,
            address,
            data: vec![len],
        }
    }

    /// 写请求
    ///
    /// 数据超过 [`MAX_DATA_LEN`] 时返回错误。
    pub fn write(id: u8, address: u8, data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() > MAX_DATA_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: MAX_DATA_LEN,
                actual: data.len(),
            });
        }

        Ok(Self {
            id,
            instruction: Instruction::Write,
            address,
            data: data.to_vec(),
        })
    }

    /// 写一个 16 位寄存器（小端）
    pub fn write_u16(id: u8, address: u8, value: u16) -> Self {
        Self {
            id,
            instruction: Instruction::Write,
            address,
            data: u16_to_bytes_le(value).to_vec(),
        }
    }

    /// 探测请求
    pub fn ping(id: u8) -> Self {
        Self {
            id,
            instruction: Instruction::Ping,
            address: 0,
            data: Vec::new(),
        }
    }

    /// length 字段的值
    fn length_field(&self) -> u8 {
        let address_len = usize::from(self.instruction.has_address());
        (2 + address_len + self.data.len()) as u8
    }

    /// 编码为线上字节
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.data.len() <= MAX_DATA_LEN);

        let mut packet = Vec::with_capacity(7 + self.data.len());
        packet.extend_from_slice(&HEADER);
        packet.push(self.id);
        packet.push(self.length_field());
        packet.push(self.instruction.into());
        if self.instruction.has_address() {
            packet.push(self.address);
        }
        packet.extend_from_slice(&self.data);
        packet.push(checksum(&packet[2..]));
        packet
    }

    /// 从线上字节解析指令包（模拟总线和测试使用）
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (start, end) = locate_frame(bytes)?;
        let frame = &bytes[start..end];
        verify_checksum(frame)?;

        let id = frame[2];
        let instruction = Instruction::try_from(frame[4])
            .map_err(|e| ProtocolError::UnknownInstruction(e.number))?;
        let payload = &frame[5..frame.len() - 1];

        let (address, data) = if instruction.has_address() {
            match payload.split_first() {
                Some((&address, data)) => (address, data.to_vec()),
                None => {
                    return Err(ProtocolError::InvalidLength {
                        expected: 7,
                        actual: frame.len(),
                    });
                },
            }
        } else {
            (0, payload.to_vec())
        };

        Ok(Self {
            id,
            instruction,
            address,
            data,
        })
    }
}

/// 舵机 → 主机的状态包（应答）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    pub id: u8,
    /// 错误码，0 表示正常
    pub error: u8,
    pub data: Vec<u8>,
}

impl StatusPacket {
    /// 编码为线上字节（模拟总线使用）
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(MIN_STATUS_LEN + self.data.len());
        packet.extend_from_slice(&HEADER);
        packet.push(self.id);
        packet.push((self.data.len() + 2) as u8);
        packet.push(self.error);
        packet.extend_from_slice(&self.data);
        packet.push(checksum(&packet[2..]));
        packet
    }

    /// 解析状态包
    ///
    /// 以下情况会被拒绝：
    /// - 长度不足或被截断
    /// - 找不到包头
    /// - 校验和错误
    /// - ID 与请求不一致
    /// - 错误码非 0
    ///
    /// 包头之前的残留字节会被跳过。
    pub fn decode(bytes: &[u8], expected_id: u8) -> Result<Self, ProtocolError> {
        let (start, end) = locate_frame(bytes)?;
        let frame = &bytes[start..end];
        verify_checksum(frame)?;

        let id = frame[2];
        if id != expected_id {
            return Err(ProtocolError::IdMismatch {
                expected: expected_id,
                actual: id,
            });
        }

        let error = frame[4];
        if error != 0 {
            return Err(ProtocolError::DeviceError { id, code: error });
        }

        Ok(Self {
            id,
            error,
            data: frame[5..frame.len() - 1].to_vec(),
        })
    }

    /// 以小端 u16 读取数据
    pub fn value_u16(&self) -> Result<u16, ProtocolError> {
        match self.data.as_slice() {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(ProtocolError::InvalidLength {
                expected: 2,
                actual: self.data.len(),
            }),
        }
    }
}

/// 在字节流中定位完整的一帧，返回 `[start, end)`
fn locate_frame(bytes: &[u8]) -> Result<(usize, usize), ProtocolError> {
    if bytes.len() < MIN_STATUS_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: MIN_STATUS_LEN,
            actual: bytes.len(),
        });
    }

    let start = bytes
        .windows(2)
        .position(|w| w == HEADER)
        .ok_or(ProtocolError::InvalidHeader)?;

    // 0xFF 0xFF 0xFF ... 时，真正的包头是最后一对 0xFF
    let mut start = start;
    while start + 2 < bytes.len() && bytes[start + 2] == 0xFF {
        start += 1;
    }

    if start + 4 > bytes.len() {
        return Err(ProtocolError::InvalidLength {
            expected: start + MIN_STATUS_LEN,
            actual: bytes.len(),
        });
    }

    let length = bytes[start + 3] as usize;
    let end = start + 4 + length;
    if length < 2 || end > bytes.len() {
        return Err(ProtocolError::InvalidLength {
            expected: end.max(start + MIN_STATUS_LEN),
            actual: bytes.len(),
        });
    }

    Ok((start, end))
}

fn verify_checksum(frame: &[u8]) -> Result<(), ProtocolError> {
    let expected = checksum(&frame[2..frame.len() - 1]);
    let actual = frame[frame.len() - 1];
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

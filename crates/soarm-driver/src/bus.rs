//! 舵机寄存器操作
//!
//! [`MotorBus`] 独占一个 [`Transport`]，所有事务严格串行执行：
//! 总线是半双工的，两个请求的应答字节交错会破坏帧。
//!
//! # 读取策略
//!
//! 噪声总线上读取失败很常见。每次尝试都会先清空接收缓冲区里的残留字节，
//! 重新发出 READ，等待写读间隔后读取应答。重试耗尽后返回 `None`，
//! 由调用方决定是否回退到中位（见 [`MotorBus::read_position_or_fallback`]）。
//!
//! # 写入策略
//!
//! 写入只发送一次，随后尽力读取应答，缺失的应答如何处理由 [`AckPolicy`] 决定。

use crate::DriverError;
use soarm_protocol::{
    BROADCAST_ID, ControlTable, InstructionPacket, ProtocolError, Register, StatusPacket,
    encode_sign_magnitude,
};
use soarm_serial::{Transport, TransportError};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 有效的位置应答至少 7 字节（头 2 + id + length + error + 数据 + 校验和）
const MIN_POSITION_RESPONSE_LEN: usize = 7;

/// 总线时序参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusTiming {
    /// 发送请求到开始读取应答之间的等待
    pub write_to_read: Duration,
    /// 两次读取尝试之间的等待
    pub retry_delay: Duration,
    /// 单次读取的超时
    pub read_timeout: Duration,
    /// 批量读取时相邻电机之间的等待
    pub inter_motor_delay: Duration,
    /// 读取尝试次数
    pub read_attempts: usize,
}

impl Default for BusTiming {
    fn default() -> Self {
        Self {
            write_to_read: Duration::from_millis(10),
            retry_delay: Duration::from_millis(20),
            read_timeout: Duration::from_millis(150),
            inter_motor_delay: Duration::from_millis(2),
            read_attempts: 3,
        }
    }
}

impl BusTiming {
    /// 无等待的时序（模拟总线与测试使用）
    pub const fn immediate() -> Self {
        Self {
            write_to_read: Duration::ZERO,
            retry_delay: Duration::ZERO,
            read_timeout: Duration::ZERO,
            inter_motor_delay: Duration::ZERO,
            read_attempts: 3,
        }
    }
}

/// 写入应答策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// 应答缺失视为写入成功（仅记录日志）
    #[default]
    Optimistic,
    /// 应答缺失或无效时返回 [`DriverError::NoAck`]
    Strict,
}

/// 舵机总线
pub struct MotorBus<T: Transport> {
    transport: T,
    table: ControlTable,
    timing: BusTiming,
    ack_policy: AckPolicy,
}

impl<T: Transport> MotorBus<T> {
    /// 使用参考型号寄存器表与默认时序创建
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            table: ControlTable::default(),
            timing: BusTiming::default(),
            ack_policy: AckPolicy::default(),
        }
    }

    pub fn with_table(mut self, table: ControlTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_timing(mut self, timing: BusTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_ack_policy(mut self, ack_policy: AckPolicy) -> Self {
        self.ack_policy = ack_policy;
        self
    }

    pub fn table(&self) -> &ControlTable {
        &self.table
    }

    pub fn timing(&self) -> &BusTiming {
        &self.timing
    }

    pub fn ack_policy(&self) -> AckPolicy {
        self.ack_policy
    }

    pub fn set_ack_policy(&mut self, ack_policy: AckPolicy) {
        self.ack_policy = ack_policy;
    }

    /// 读取失败时的回退位置
    pub fn fallback_position(&self) -> u16 {
        self.table.mid_position()
    }

    /// 取回底层传输
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// 读取当前位置
    ///
    /// 重试耗尽返回 `Ok(None)`；端口关闭等致命错误直接返回 `Err`。
    pub fn read_position(&mut self, id: u8) -> Result<Option<u16>, DriverError> {
        let register = self.table.present_position;
        self.read_register(id, register)
    }

    /// 读取当前位置，失败时回退到中位
    pub fn read_position_or_fallback(&mut self, id: u8) -> Result<u16, DriverError> {
        match self.read_position(id)? {
            Some(position) => Ok(position),
            None => {
                let fallback = self.fallback_position();
                warn!(
                    "Servo {} position unavailable after {} attempts, using fallback {}",
                    id, self.timing.read_attempts, fallback
                );
                Ok(fallback)
            },
        }
    }

    /// 读取一个寄存器（1 或 2 字节）
    pub fn read_register(&mut self, id: u8, register: Register) -> Result<Option<u16>, DriverError> {
        let request = InstructionPacket::read(id, register.address, register.width).encode();

        for attempt in 0..self.timing.read_attempts {
            if attempt > 0 {
                sleep(self.timing.retry_delay);
            }

            let stale = self.transport.drain()?;
            if stale > 0 {
                trace!("Discarded {} stale bytes before reading servo {}", stale, id);
            }

            self.transport.write(&request)?;
            sleep(self.timing.write_to_read);

            match self.read_status(id, MIN_POSITION_RESPONSE_LEN)? {
                Some(status) => match decode_value(&status, register.width) {
                    Ok(value) => {
                        debug!(
                            "Servo {} register {} = {}",
                            id, register.address, value
                        );
                        return Ok(Some(value));
                    },
                    Err(e) => debug!("Servo {} returned unusable payload: {}", id, e),
                },
                None => debug!(
                    "Servo {} read attempt {}/{} failed",
                    id,
                    attempt + 1,
                    self.timing.read_attempts
                ),
            }
        }

        warn!(
            "Servo {} register {} read failed after {} attempts",
            id, register.address, self.timing.read_attempts
        );
        Ok(None)
    }

    /// 按顺序读取多个电机的位置
    ///
    /// 总线是共享的半双工介质，只能逐个读取。
    pub fn read_all(&mut self, ids: &[u8]) -> Result<Vec<Option<u16>>, DriverError> {
        let mut positions = Vec::with_capacity(ids.len());
        for (i, &id) in ids.iter().enumerate() {
            if i > 0 {
                sleep(self.timing.inter_motor_delay);
            }
            positions.push(self.read_position(id)?);
        }
        Ok(positions)
    }

    /// 按顺序读取多个电机的位置，失败项回退到中位
    pub fn read_all_or_fallback(&mut self, ids: &[u8]) -> Result<Vec<u16>, DriverError> {
        let fallback = self.fallback_position();
        let positions = self.read_all(ids)?;
        Ok(ids
            .iter()
            .zip(positions)
            .map(|(id, position)| {
                position.unwrap_or_else(|| {
                    warn!("Servo {} position unavailable, using fallback {}", id, fallback);
                    fallback
                })
            })
            .collect())
    }

    /// 写目标位置（钳位到 `[0, resolution - 1]`）
    pub fn write_goal_position(&mut self, id: u8, position: i32) -> Result<u16, DriverError> {
        let register = self.table.goal_position;
        self.write_register(id, register, position)
    }

    /// 写寄存器（钳位到 `[0, resolution - 1]`）
    ///
    /// 返回实际写入的值。
    pub fn write_register(
        &mut self,
        id: u8,
        register: Register,
        value: i32,
    ) -> Result<u16, DriverError> {
        let clamped = self.table.clamp(value);
        if i32::from(clamped) != value {
            debug!(
                "Servo {} register {} value {} clamped to {}",
                id, register.address, value, clamped
            );
        }
        self.write_raw(id, register, clamped)?;
        Ok(clamped)
    }

    /// 写归零偏移（符号-幅值编码，不钳位）
    pub fn write_homing_offset(&mut self, id: u8, offset: i32) -> Result<(), DriverError> {
        let encoded = encode_sign_magnitude(offset, self.table.homing_offset_sign_bit)?;
        let register = self.table.homing_offset;
        self.write_raw(id, register, encoded)
    }

    /// 写位置限位寄存器
    pub fn write_limits(&mut self, id: u8, min: u16, max: u16) -> Result<(), DriverError> {
        let (min_register, max_register) =
            (self.table.min_position_limit, self.table.max_position_limit);
        self.write_register(id, min_register, i32::from(min))?;
        self.write_register(id, max_register, i32::from(max))?;
        Ok(())
    }

    /// 使能/释放扭矩
    pub fn set_torque(&mut self, id: u8, enabled: bool) -> Result<(), DriverError> {
        let register = self.table.torque_enable;
        self.write_raw(id, register, u16::from(enabled))
    }

    /// 锁定所有电机（使能扭矩）
    pub fn lock_all(&mut self, ids: &[u8]) -> Result<(), DriverError> {
        for &id in ids {
            self.set_torque(id, true)?;
        }
        debug!("Torque enabled on {:?}", ids);
        Ok(())
    }

    /// 释放所有电机（可手动掰动）
    pub fn release_all(&mut self, ids: &[u8]) -> Result<(), DriverError> {
        for &id in ids {
            self.set_torque(id, false)?;
        }
        debug!("Torque released on {:?}", ids);
        Ok(())
    }

    /// 探测舵机是否在线
    pub fn ping(&mut self, id: u8) -> Result<bool, DriverError> {
        self.transport.drain()?;
        self.transport.write(&InstructionPacket::ping(id).encode())?;
        sleep(self.timing.write_to_read);
        Ok(self.read_status(id, 6)?.is_some())
    }

    /// 发送一次写请求并处理应答
    fn write_raw(&mut self, id: u8, register: Register, value: u16) -> Result<(), DriverError> {
        let data = value.to_le_bytes();
        let len = usize::from(register.width).min(data.len());
        let packet = InstructionPacket::write(id, register.address, &data[..len])?;

        self.transport.drain()?;
        self.transport.write(&packet.encode())?;

        if id == BROADCAST_ID {
            return Ok(());
        }

        sleep(self.timing.write_to_read);
        match self.read_status(id, 6)? {
            Some(_) => {
                trace!("Servo {} acknowledged write to {}", id, register.address);
                Ok(())
            },
            None => match self.ack_policy {
                AckPolicy::Optimistic => {
                    debug!(
                        "Servo {} write to {} not acknowledged, assuming success",
                        id, register.address
                    );
                    Ok(())
                },
                AckPolicy::Strict => Err(DriverError::NoAck { id }),
            },
        }
    }

    /// 在超时时间内收集字节直到解析出完整状态包
    ///
    /// 超时、校验失败、ID 不符、错误码非 0 都返回 `Ok(None)`；
    /// 只有传输层致命错误返回 `Err`。
    fn read_status(
        &mut self,
        id: u8,
        min_len: usize,
    ) -> Result<Option<StatusPacket>, DriverError> {
        let deadline = Instant::now() + self.timing.read_timeout;
        let mut buf = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.transport.read(remaining) {
                Ok(bytes) => buf.extend_from_slice(&bytes),
                Err(TransportError::Timeout) => {
                    trace!("Servo {} response timed out ({} bytes buffered)", id, buf.len());
                    return Ok(None);
                },
                Err(e) => return Err(e.into()),
            }

            if buf.len() >= min_len {
                match StatusPacket::decode(&buf, id) {
                    Ok(status) => return Ok(Some(status)),
                    // 帧尚未收全，或包头之前只有噪声，继续等待
                    Err(ProtocolError::InvalidLength { .. } | ProtocolError::InvalidHeader) => {},
                    Err(e) => {
                        debug!("Servo {} rejected response: {}", id, e);
                        return Ok(None);
                    },
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }
}

fn decode_value(status: &StatusPacket, width: u8) -> Result<u16, ProtocolError> {
    match width {
        1 => status
            .data
            .first()
            .map(|&b| u16::from(b))
            .ok_or(ProtocolError::InvalidLength {
                expected: 1,
                actual: 0,
            }),
        _ => status.value_u16(),
    }
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        spin_sleep::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soarm_serial::mock::{ScriptedTransport, SimulatedBus};

    fn sim_bus(ids: &[u8]) -> (MotorBus<SimulatedBus>, SimulatedBus) {
        let sim = SimulatedBus::new(ids);
        let bus = MotorBus::new(sim.clone()).with_timing(BusTiming::immediate());
        (bus, sim)
    }

    fn position_response(id: u8, position: u16) -> Vec<u8> {
        StatusPacket {
            id,
            error: 0,
            data: position.to_le_bytes().to_vec(),
        }
        .encode()
    }

    #[test]
    fn test_default_timing() {
        let timing = BusTiming::default();
        assert_eq!(timing.write_to_read, Duration::from_millis(10));
        assert_eq!(timing.retry_delay, Duration::from_millis(20));
        assert_eq!(timing.read_timeout, Duration::from_millis(150));
        assert_eq!(timing.read_attempts, 3);
    }

    #[test]
    fn test_read_position() {
        let (mut bus, sim) = sim_bus(&[1]);
        sim.set_raw_position(1, 3210);
        assert_eq!(bus.read_position(1).unwrap(), Some(3210));
    }

    #[test]
    fn test_read_position_retries_after_dropped_response() {
        let (mut bus, sim) = sim_bus(&[1]);
        sim.set_raw_position(1, 1000);
        sim.drop_next_responses(2);
        assert_eq!(bus.read_position(1).unwrap(), Some(1000));
        // 三次 READ 请求
        assert_eq!(sim.log().len(), 3);
    }

    #[test]
    fn test_read_position_exhausted_returns_none() {
        let (mut bus, sim) = sim_bus(&[1]);
        sim.drop_next_responses(3);
        assert_eq!(bus.read_position(1).unwrap(), None);
    }

    #[test]
    fn test_read_position_fallback_is_mid() {
        let (mut bus, _sim) = sim_bus(&[1]);
        // 9 号舵机不存在，永远没有应答
        assert_eq!(bus.read_position_or_fallback(9).unwrap(), 2047);
    }

    #[test]
    fn test_read_position_device_error_is_retried() {
        let (mut bus, sim) = sim_bus(&[1]);
        sim.set_error_code(0x20);
        assert_eq!(bus.read_position(1).unwrap(), None);
        assert_eq!(sim.log().len(), 3);
    }

    #[test]
    fn test_read_position_skips_stale_bytes() {
        let transport = ScriptedTransport::new();
        let mut bytes = vec![0x00, 0x13, 0x37];
        bytes.extend(position_response(2, 1500));
        transport.push_bytes(bytes);

        let mut bus = MotorBus::new(transport).with_timing(BusTiming::immediate());
        assert_eq!(bus.read_position(2).unwrap(), Some(1500));
    }

    #[test]
    fn test_read_position_reassembles_split_response() {
        let transport = ScriptedTransport::new();
        let response = position_response(2, 4000);
        transport.push_bytes(response[..3].to_vec());
        transport.push_bytes(response[3..].to_vec());

        let timing = BusTiming {
            read_timeout: Duration::from_millis(50),
            ..BusTiming::immediate()
        };
        let mut bus = MotorBus::new(transport).with_timing(timing);
        assert_eq!(bus.read_position(2).unwrap(), Some(4000));
    }

    #[test]
    fn test_read_position_waits_past_noise_without_header() {
        let transport = ScriptedTransport::new();
        transport.push_bytes(vec![0x00, 0x13, 0x37, 0x42, 0x10, 0x20, 0x30, 0x40]);
        transport.push_bytes(position_response(2, 2500));

        let timing = BusTiming {
            read_timeout: Duration::from_millis(50),
            ..BusTiming::immediate()
        };
        let mut bus = MotorBus::new(transport.clone()).with_timing(timing);
        assert_eq!(bus.read_position(2).unwrap(), Some(2500));
        // 同一次尝试内完成，没有重发请求
        assert_eq!(transport.written().len(), 1);
    }

    #[test]
    fn test_read_position_closed_port_is_fatal() {
        let (mut bus, sim) = sim_bus(&[1]);
        sim.close();
        let err = bus.read_position(1).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_write_goal_position_clamps() {
        let (mut bus, sim) = sim_bus(&[1]);
        assert_eq!(bus.write_goal_position(1, 5000).unwrap(), 4095);
        assert_eq!(sim.raw_position(1), Some(4095));

        assert_eq!(bus.write_goal_position(1, -20).unwrap(), 0);
        assert_eq!(sim.raw_position(1), Some(0));
    }

    #[test]
    fn test_write_optimistic_without_ack() {
        let transport = ScriptedTransport::new();
        let mut bus = MotorBus::new(transport.clone()).with_timing(BusTiming::immediate());
        assert!(bus.write_goal_position(1, 2000).is_ok());
        assert_eq!(transport.written().len(), 1);
    }

    #[test]
    fn test_write_strict_without_ack() {
        let transport = ScriptedTransport::new();
        let mut bus = MotorBus::new(transport)
            .with_timing(BusTiming::immediate())
            .with_ack_policy(AckPolicy::Strict);
        assert!(matches!(
            bus.write_goal_position(1, 2000),
            Err(DriverError::NoAck { id: 1 })
        ));
    }

    #[test]
    fn test_write_strict_with_ack() {
        let (bus, _sim) = sim_bus(&[1]);
        let mut bus = bus.with_ack_policy(AckPolicy::Strict);
        assert_eq!(bus.write_goal_position(1, 1234).unwrap(), 1234);
    }

    #[test]
    fn test_write_homing_offset_sign_magnitude() {
        let (mut bus, sim) = sim_bus(&[1]);
        bus.write_homing_offset(1, -100).unwrap();
        assert_eq!(sim.register_u16(1, 31), Some(0x0800 | 100));

        assert!(matches!(
            bus.write_homing_offset(1, 3000),
            Err(DriverError::Protocol(ProtocolError::SignMagnitudeOverflow { .. }))
        ));
    }

    #[test]
    fn test_torque_lock_release() {
        let (mut bus, sim) = sim_bus(&[1, 2]);
        bus.lock_all(&[1, 2]).unwrap();
        assert_eq!(sim.register_u8(1, 40), Some(1));
        assert_eq!(sim.register_u8(2, 40), Some(1));

        bus.release_all(&[1, 2]).unwrap();
        assert_eq!(sim.register_u8(2, 40), Some(0));
        // 扭矩寄存器只有 1 字节
        assert!(sim.writes_to(40).iter().all(|p| p.data.len() == 1));
    }

    #[test]
    fn test_read_all_sequential() {
        let (mut bus, sim) = sim_bus(&[1, 2, 3]);
        sim.set_raw_position(1, 100);
        sim.set_raw_position(2, 200);
        sim.set_raw_position(3, 300);

        let positions = bus.read_all(&[1, 2, 3]).unwrap();
        assert_eq!(positions, vec![Some(100), Some(200), Some(300)]);

        let ids: Vec<u8> = sim.log().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_read_all_or_fallback() {
        let (mut bus, sim) = sim_bus(&[1]);
        sim.set_raw_position(1, 100);
        assert_eq!(bus.read_all_or_fallback(&[1, 7]).unwrap(), vec![100, 2047]);
    }

    #[test]
    fn test_ping() {
        let (mut bus, _sim) = sim_bus(&[1]);
        assert!(bus.ping(1).unwrap());
        assert!(!bus.ping(5).unwrap());
    }

    #[test]
    fn test_write_limits() {
        let (mut bus, sim) = sim_bus(&[1]);
        bus.write_limits(1, 0, 4095).unwrap();
        assert_eq!(sim.register_u16(1, 9), Some(0));
        assert_eq!(sim.register_u16(1, 11), Some(4095));
    }
}

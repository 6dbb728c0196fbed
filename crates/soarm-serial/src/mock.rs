//! Mock 传输（无硬件依赖）
//!
//! - [`ScriptedTransport`]: 按脚本依次返回读取结果，并记录所有写入
//! - [`SimulatedBus`]: 在内存中模拟一条挂着若干 STS 舵机的总线
//!
//! 两者都可以 `Clone`，克隆体共享内部状态，测试在把传输交给驱动后仍可继续观察和操纵。

use crate::{Transport, TransportError};
use parking_lot::Mutex;
use soarm_protocol::{
    BROADCAST_ID, ControlTable, Instruction, InstructionPacket, StatusPacket,
    decode_sign_magnitude,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// 脚本化的读取结果
#[derive(Debug)]
pub enum ScriptedRead {
    Bytes(Vec<u8>),
    Timeout,
    Closed,
}

#[derive(Default)]
struct ScriptState {
    reads: VecDeque<ScriptedRead>,
    written: Vec<Vec<u8>>,
    closed: bool,
}

/// 脚本化传输
///
/// 脚本为空时读取返回超时。
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一段应答字节
    pub fn push_bytes(&self, bytes: impl Into<Vec<u8>>) {
        self.state.lock().reads.push_back(ScriptedRead::Bytes(bytes.into()));
    }

    /// 追加一次超时
    pub fn push_timeout(&self) {
        self.state.lock().reads.push_back(ScriptedRead::Timeout);
    }

    /// 之后的所有操作都返回 `Closed`
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// 已写入的所有包
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// 剩余未消费的脚本条目数
    pub fn pending_reads(&self) -> usize {
        self.state.lock().reads.len()
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.written.push(bytes.to_vec());
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        match state.reads.pop_front() {
            Some(ScriptedRead::Bytes(bytes)) => Ok(bytes),
            Some(ScriptedRead::Timeout) | None => Err(TransportError::Timeout),
            Some(ScriptedRead::Closed) => Err(TransportError::Closed),
        }
    }

    fn drain(&mut self) -> Result<usize, TransportError> {
        // 脚本中的应答是为后续请求准备的，drain 不消费它们
        if self.state.lock().closed {
            return Err(TransportError::Closed);
        }
        Ok(0)
    }
}

/// 单个模拟舵机
#[derive(Debug, Clone)]
struct SimServo {
    /// 物理位置（未经归零偏移修正）
    raw_position: u16,
    /// 寄存器内存（地址 → 字节）
    memory: BTreeMap<u8, u8>,
}

struct BusState {
    table: ControlTable,
    servos: HashMap<u8, SimServo>,
    rx: Vec<u8>,
    log: Vec<InstructionPacket>,
    dropped_responses: usize,
    failing_addresses: HashSet<u8>,
    error_code: u8,
    closed: bool,
}

/// 模拟舵机总线
///
/// - 读当前位置返回 `raw - homing_offset`（按分辨率取模）
/// - 写目标位置立即生效：`raw = goal + homing_offset`
/// - 其余寄存器按字节存取
#[derive(Clone)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
}

impl SimulatedBus {
    /// 创建挂有指定 ID 舵机的总线，所有舵机初始位于中位
    pub fn new(ids: &[u8]) -> Self {
        Self::with_table(ids, ControlTable::STS3215)
    }

    pub fn with_table(ids: &[u8], table: ControlTable) -> Self {
        let servos = ids
            .iter()
            .map(|&id| {
                (
                    id,
                    SimServo {
                        raw_position: table.mid_position(),
                        memory: BTreeMap::new(),
                    },
                )
            })
            .collect();

        Self {
            state: Arc::new(Mutex::new(BusState {
                table,
                servos,
                rx: Vec::new(),
                log: Vec::new(),
                dropped_responses: 0,
                failing_addresses: HashSet::new(),
                error_code: 0,
                closed: false,
            })),
        }
    }

    /// 直接设置物理位置（模拟用户手动掰动关节）
    pub fn set_raw_position(&self, id: u8, position: u16) {
        if let Some(servo) = self.state.lock().servos.get_mut(&id) {
            servo.raw_position = position;
        }
    }

    /// 物理位置
    pub fn raw_position(&self, id: u8) -> Option<u16> {
        self.state.lock().servos.get(&id).map(|s| s.raw_position)
    }

    /// 读取 16 位寄存器（小端）
    pub fn register_u16(&self, id: u8, address: u8) -> Option<u16> {
        let state = self.state.lock();
        let servo = state.servos.get(&id)?;
        Some(read_u16(&servo.memory, address))
    }

    /// 读取 8 位寄存器
    pub fn register_u8(&self, id: u8, address: u8) -> Option<u8> {
        let state = self.state.lock();
        let servo = state.servos.get(&id)?;
        Some(servo.memory.get(&address).copied().unwrap_or(0))
    }

    /// 丢弃接下来 `count` 个应答（模拟噪声）
    pub fn drop_next_responses(&self, count: usize) {
        self.state.lock().dropped_responses = count;
    }

    /// 后续所有应答都带上此错误码
    pub fn set_error_code(&self, code: u8) {
        self.state.lock().error_code = code;
    }

    /// 写入该地址时传输层报错
    pub fn fail_writes_to(&self, address: u8) {
        self.state.lock().failing_addresses.insert(address);
    }

    /// 模拟拔掉串口
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// 收到的全部指令包
    pub fn log(&self) -> Vec<InstructionPacket> {
        self.state.lock().log.clone()
    }

    /// 收到的写指令（按地址过滤）
    pub fn writes_to(&self, address: u8) -> Vec<InstructionPacket> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|p| p.instruction == Instruction::Write && p.address == address)
            .cloned()
            .collect()
    }

    /// 清空指令日志
    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }
}

impl BusState {
    fn present_position(&self, servo: &SimServo) -> u16 {
        let offset = decode_sign_magnitude(
            read_u16(&servo.memory, self.table.homing_offset.address),
            self.table.homing_offset_sign_bit,
        );
        let resolution = i32::from(self.table.resolution);
        (i32::from(servo.raw_position) - offset).rem_euclid(resolution) as u16
    }

    fn handle(&mut self, packet: InstructionPacket) -> Option<StatusPacket> {
        let table = self.table;
        let error = self.error_code;
        let id = packet.id;

        let present = {
            let servo = self.servos.get(&id)?;
            self.present_position(servo)
        };
        let servo = self.servos.get_mut(&id)?;

        let data = match packet.instruction {
            Instruction::Ping => Vec::new(),
            Instruction::Read => {
                let len = packet.data.first().copied().unwrap_or(0);
                if packet.address == table.present_position.address {
                    present.to_le_bytes()[..len.min(2) as usize].to_vec()
                } else {
                    (0..len)
                        .map(|i| {
                            servo
                                .memory
                                .get(&packet.address.wrapping_add(i))
                                .copied()
                                .unwrap_or(0)
                        })
                        .collect()
                }
            },
            Instruction::Write => {
                for (i, byte) in packet.data.iter().enumerate() {
                    servo.memory.insert(packet.address.wrapping_add(i as u8), *byte);
                }
                if packet.address == table.goal_position.address {
                    let goal = i32::from(read_u16(&servo.memory, packet.address));
                    let offset = decode_sign_magnitude(
                        read_u16(&servo.memory, table.homing_offset.address),
                        table.homing_offset_sign_bit,
                    );
                    servo.raw_position =
                        (goal + offset).rem_euclid(i32::from(table.resolution)) as u16;
                }
                Vec::new()
            },
        };

        Some(StatusPacket { id, error, data })
    }
}

impl Transport for SimulatedBus {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }

        let packet = InstructionPacket::decode(bytes)
            .map_err(|e| TransportError::Device(format!("malformed request: {e}")))?;

        if packet.instruction == Instruction::Write
            && state.failing_addresses.contains(&packet.address)
        {
            return Err(TransportError::Device(format!(
                "write to register {} failed",
                packet.address
            )));
        }

        state.log.push(packet.clone());

        if packet.id == BROADCAST_ID {
            return Ok(());
        }

        if let Some(status) = state.handle(packet) {
            if state.dropped_responses > 0 {
                state.dropped_responses -= 1;
            } else {
                let bytes = status.encode();
                state.rx.extend(bytes);
            }
        }
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.rx.is_empty() {
            return Err(TransportError::Timeout);
        }
        Ok(std::mem::take(&mut state.rx))
    }

    fn drain(&mut self) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let drained = state.rx.len();
        state.rx.clear();
        Ok(drained)
    }
}

fn read_u16(memory: &BTreeMap<u8, u8>, address: u8) -> u16 {
    let lo = memory.get(&address).copied().unwrap_or(0);
    let hi = memory.get(&address.wrapping_add(1)).copied().unwrap_or(0);
    u16::from_le_bytes([lo, hi])
}

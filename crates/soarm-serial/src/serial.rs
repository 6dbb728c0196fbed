//! 基于 `serialport` 的真实串口后端

use crate::{Transport, TransportError};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, info, trace};

/// 串口参数
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// 串口路径（如 `/dev/ttyACM0`）
    pub port: String,
    /// 波特率（STS 系列默认 1Mbps）
    pub baud_rate: u32,
    /// 打开时使用的默认读超时
    pub timeout: Duration,
}

impl SerialConfig {
    /// STS 系列默认波特率
    pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: Self::DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(150),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

/// 串口传输
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    buf: [u8; 256],
}

impl SerialTransport {
    /// 打开串口（8N1，无流控）
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(config.timeout)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .open()
            .map_err(map_serial_error)?;

        info!(
            "Serial port opened: {} @ {} bps",
            config.port, config.baud_rate
        );

        Ok(Self {
            port,
            name: config.port.clone(),
            buf: [0u8; 256],
        })
    }

    /// 串口路径
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        trace!("TX {:02X?}", bytes);
        self.port.write_all(bytes).map_err(map_io_error)?;
        self.port.flush().map_err(map_io_error)
    }

    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if timeout.is_zero() {
            let available = self.port.bytes_to_read().map_err(map_serial_error)?;
            if available == 0 {
                return Err(TransportError::Timeout);
            }
        } else {
            self.port.set_timeout(timeout).map_err(map_serial_error)?;
        }

        match self.port.read(&mut self.buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => {
                trace!("RX {:02X?}", &self.buf[..n]);
                Ok(self.buf[..n].to_vec())
            },
            Err(e) => Err(map_io_error(e)),
        }
    }

    fn drain(&mut self) -> Result<usize, TransportError> {
        let pending = self.port.bytes_to_read().map_err(map_serial_error)? as usize;
        if pending > 0 {
            debug!("Draining {} stale bytes from {}", pending, self.name);
            self.port.clear(ClearBuffer::Input).map_err(map_serial_error)?;
        }
        Ok(pending)
    }
}

/// 列出系统中的串口
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    let ports = serialport::available_ports().map_err(map_serial_error)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

fn map_io_error(e: std::io::Error) -> TransportError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::Timeout,
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof => {
            TransportError::Closed
        },
        _ => TransportError::Io(e),
    }
}

fn map_serial_error(e: serialport::Error) -> TransportError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => TransportError::Closed,
        serialport::ErrorKind::Io(kind) => map_io_error(std::io::Error::new(kind, e.description)),
        _ => TransportError::Device(e.to_string()),
    }
}

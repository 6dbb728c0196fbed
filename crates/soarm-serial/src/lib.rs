//! # SO-ARM Serial Transport Layer
//!
//! 串口传输抽象层，一个 [`Transport`] 代表总线上的一条已打开连接。
//!
//! 总线是半双工的请求/应答介质：同一时刻只能有一个事务在进行，
//! 并发读写会导致应答字节交错。调用方负责保证对同一个 `Transport` 的访问是串行的。

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "serialport")]
pub mod serial;

#[cfg(feature = "serialport")]
pub use serial::{SerialConfig, SerialTransport, available_ports};

#[cfg(feature = "mock")]
pub mod mock;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(String),
    #[error("Read timeout")]
    Timeout,
    #[error("Port closed")]
    Closed,
}

impl TransportError {
    /// 是否为致命错误（端口未打开 / 中途关闭 / 设备故障）
    ///
    /// 超时不是致命错误，由上层的重试策略处理。
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Timeout)
    }
}

/// 串口传输接口
///
/// 任何具备这两个操作的字节流都可以驱动总线。
pub trait Transport: Send {
    /// 写入全部字节
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// 读取当前可用的字节，最多等待 `timeout`
    ///
    /// 超时返回 [`TransportError::Timeout`]，端口关闭返回 [`TransportError::Closed`]。
    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// 非阻塞地丢弃接收缓冲区中的残留字节，返回丢弃的字节数
    fn drain(&mut self) -> Result<usize, TransportError> {
        let mut drained = 0;
        loop {
            match self.read(Duration::ZERO) {
                Ok(bytes) if bytes.is_empty() => return Ok(drained),
                Ok(bytes) => drained += bytes.len(),
                Err(TransportError::Timeout) => return Ok(drained),
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }

    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).read(timeout)
    }

    fn drain(&mut self) -> Result<usize, TransportError> {
        (**self).drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ChunkedTransport {
        chunks: VecDeque<Vec<u8>>,
    }

    impl Transport for ChunkedTransport {
        fn write(&mut self, _bytes: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        fn read(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
            self.chunks.pop_front().ok_or(TransportError::Timeout)
        }
    }

    #[test]
    fn test_default_drain_consumes_all_chunks() {
        let mut transport = ChunkedTransport {
            chunks: VecDeque::from(vec![vec![1, 2, 3], vec![4, 5]]),
        };
        assert_eq!(transport.drain().unwrap(), 5);
        assert_eq!(transport.drain().unwrap(), 0);
    }

    #[test]
    fn test_boxed_transport_delegates() {
        let mut boxed: Box<dyn Transport> = Box::new(ChunkedTransport {
            chunks: VecDeque::from(vec![vec![9]]),
        });
        assert_eq!(boxed.read(Duration::ZERO).unwrap(), vec![9]);
        assert!(matches!(
            boxed.read(Duration::ZERO),
            Err(TransportError::Timeout)
        ));
    }

    #[test]
    fn test_is_fatal() {
        assert!(!TransportError::Timeout.is_fatal());
        assert!(TransportError::Closed.is_fatal());
        assert!(TransportError::Device("unplugged".into()).is_fatal());
    }
}

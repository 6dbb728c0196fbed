//! 驱动层错误类型定义

use soarm_protocol::ProtocolError;
use soarm_serial::TransportError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误（端口关闭、设备故障）
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议编码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 严格应答模式下写入未得到确认
    #[error("Servo {id} did not acknowledge the write")]
    NoAck { id: u8 },

    /// 配置表中没有该名称的电机
    #[error("Unknown motor: {0}")]
    UnknownMotor(String),
}

impl DriverError {
    /// 是否为传输层致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::Transport(e) if e.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use soarm_protocol::ProtocolError;
    use soarm_serial::TransportError;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::Transport(TransportError::Closed);
        assert!(format!("{}", err).contains("Port closed"));

        let err = DriverError::Protocol(ProtocolError::InvalidLength {
            expected: 8,
            actual: 4,
        });
        assert!(format!("{}", err).contains("Invalid frame length"));

        let err = DriverError::NoAck { id: 4 };
        assert_eq!(format!("{}", err), "Servo 4 did not acknowledge the write");
    }

    #[test]
    fn test_driver_error_from() {
        let err: DriverError = TransportError::Timeout.into();
        assert!(matches!(err, DriverError::Transport(TransportError::Timeout)));
        assert!(!err.is_fatal());

        let err: DriverError = TransportError::Closed.into();
        assert!(err.is_fatal());
    }
}

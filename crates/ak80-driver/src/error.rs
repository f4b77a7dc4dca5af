//! 驱动层错误类型定义

use ak80_can::CanError;
use ak80_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 驱动错误
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 协议错误（如自定义参数表非法）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 命令通道已关闭（TX 线程退出）
    #[error("Command channel closed")]
    ChannelClosed,

    /// 命令通道已满
    #[error("Command channel full (buffer size: {})", crate::motor::COMMAND_QUEUE_CAPACITY)]
    ChannelFull,

    /// 配置无效
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use ak80_can::CanError;
    use ak80_protocol::ProtocolError;

    #[test]
    fn test_driver_error_display() {
        let driver_error = DriverError::Can(CanError::Timeout);
        assert_eq!(driver_error.to_string(), "CAN driver error: Read timeout");

        let driver_error = DriverError::Protocol(ProtocolError::MalformedFrame {
            expected: 6,
            actual: 8,
        });
        let msg = driver_error.to_string();
        assert!(msg.starts_with("Protocol error"), "{}", msg);

        assert_eq!(DriverError::ChannelClosed.to_string(), "Command channel closed");
        assert_eq!(
            DriverError::ChannelFull.to_string(),
            "Command channel full (buffer size: 10)"
        );
        assert_eq!(
            DriverError::InvalidConfig("rate".to_string()).to_string(),
            "Invalid configuration: rate"
        );

        let msg = DriverError::IoThread("test error".to_string()).to_string();
        assert!(msg.contains("IO thread") && msg.contains("test error"));

        assert_eq!(DriverError::Timeout.to_string(), "Operation timeout");
    }

    #[test]
    fn test_from_can_error() {
        let driver_error: DriverError = CanError::BusOff.into();
        assert!(matches!(driver_error, DriverError::Can(CanError::BusOff)));
    }

    #[test]
    fn test_from_protocol_error() {
        let protocol_error = ProtocolError::UnexpectedSource {
            expected: 0x17,
            actual: 0x18,
        };
        let driver_error: DriverError = protocol_error.into();
        match driver_error {
            DriverError::Protocol(ProtocolError::UnexpectedSource { expected, actual }) => {
                assert_eq!(expected, 0x17);
                assert_eq!(actual, 0x18);
            },
            _ => panic!("Expected Protocol variant"),
        }
    }
}

//! # AK80 CAN Adapter Layer
//!
//! CAN 硬件抽象层，提供统一的 CAN 接口抽象。
//!
//! ## 后端
//!
//! - `socketcan`: Linux SocketCAN（内核 CAN 子系统）
//! - `slcan`: 串口 CAN 适配器（Lawicel ASCII 协议，CANable 等），所有平台
//! - `loopback`: 内存回环 + 电机仿真，无硬件依赖
//!
//! 后端在启动时由 [`BackendSelection`] 选定一次，协议层对此无感知。

use std::time::Duration;
use thiserror::Error;

// 重新导出 ak80-protocol 中的帧类型
pub use ak80_protocol::Ak80Frame;

mod backend;
pub mod loopback;

#[cfg(target_os = "linux")]
pub mod socketcan;

#[cfg(feature = "slcan")]
pub mod slcan;

pub use backend::{BackendKind, BackendSelection};
pub use loopback::{
    LoopbackAdapter, LoopbackHandle, LoopbackRxAdapter, LoopbackTxAdapter, SimulatedMotor,
};

#[cfg(target_os = "linux")]
pub use socketcan::{SocketCanAdapter, SocketCanRxAdapter, SocketCanTxAdapter};

#[cfg(feature = "slcan")]
pub use slcan::{SlcanAdapter, SlcanRxAdapter, SlcanTxAdapter};

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Buffer overflow")]
    BufferOverflow,
    #[error("Bus off")]
    BusOff,
}

impl CanError {
    /// 是否为致命错误（设备断开、权限错误等），IO 线程据此决定是否退出
    pub fn is_fatal(&self) -> bool {
        match self {
            CanError::Device(e) => e.is_fatal(),
            CanError::BufferOverflow | CanError::BusOff => true,
            _ => false,
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    UnsupportedConfig,
    InvalidFrame,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::NoDevice
                | CanDeviceErrorKind::AccessDenied
                | CanDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// CAN 传输边界
///
/// 协议核心只需要 `send` / `receive` 两个原语，不关心底层是内核 socket、
/// USB 串口桥还是仿真器。
pub trait CanAdapter {
    fn send(&mut self, frame: Ak80Frame) -> Result<(), CanError>;
    fn receive(&mut self) -> Result<Ak80Frame, CanError>;
    fn set_receive_timeout(&mut self, _timeout: Duration) {}
    fn receive_timeout(&mut self, timeout: Duration) -> Result<Ak80Frame, CanError> {
        self.set_receive_timeout(timeout);
        self.receive()
    }
    fn try_receive(&mut self) -> Result<Option<Ak80Frame>, CanError> {
        match self.receive_timeout(Duration::ZERO) {
            Ok(frame) => Ok(Some(frame)),
            Err(CanError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// 只读半边（RX 线程持有）
pub trait RxAdapter {
    fn receive(&mut self) -> Result<Ak80Frame, CanError>;
}

/// 只写半边（TX 线程持有）
pub trait TxAdapter {
    fn send(&mut self, frame: Ak80Frame) -> Result<(), CanError>;
}

/// 可分离为独立 RX/TX 半边的适配器
pub trait SplittableAdapter: CanAdapter {
    type RxAdapter: RxAdapter;
    type TxAdapter: TxAdapter;
    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct MockCanAdapter {
        rx: VecDeque<Ak80Frame>,
        sent: Vec<Ak80Frame>,
    }

    impl CanAdapter for MockCanAdapter {
        fn send(&mut self, frame: Ak80Frame) -> Result<(), CanError> {
            self.sent.push(frame);
            Ok(())
        }

        fn receive(&mut self) -> Result<Ak80Frame, CanError> {
            self.rx.pop_front().ok_or(CanError::Timeout)
        }
    }

    #[test]
    fn test_try_receive_maps_timeout_to_none() {
        let mut adapter = MockCanAdapter {
            rx: VecDeque::from([Ak80Frame::new_standard(0x17, &[1])]),
            sent: Vec::new(),
        };
        assert!(adapter.try_receive().unwrap().is_some());
        assert!(adapter.try_receive().unwrap().is_none());

        adapter.send(Ak80Frame::new_standard(0x17, &[2])).unwrap();
        assert_eq!(adapter.sent.len(), 1);
    }

    #[test]
    fn test_fatal_classification() {
        let not_found = CanError::Device(CanDeviceError::new(CanDeviceErrorKind::NotFound, "gone"));
        assert!(not_found.is_fatal());

        let backend = CanError::Device(CanDeviceError::new(CanDeviceErrorKind::Backend, "io"));
        assert!(!backend.is_fatal());

        assert!(CanError::BusOff.is_fatal());
        assert!(CanError::BufferOverflow.is_fatal());
        assert!(!CanError::Timeout.is_fatal());
    }

    #[test]
    fn test_device_error_display() {
        let err: CanDeviceError = "boom".into();
        assert_eq!(err.kind, CanDeviceErrorKind::Unknown);
        assert_eq!(err.to_string(), "Unknown: boom");
    }
}

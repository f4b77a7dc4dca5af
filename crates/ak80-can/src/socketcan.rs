//! SocketCAN CAN 适配器实现
//!
//! Linux 内核级 CAN 接口。波特率由系统工具配置：
//!
//! ```text
//! sudo ip link set can0 up type can bitrate 1000000
//! ```
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**
//! - **权限要求**：可能需要 `sudo` 或 CAP_NET_RAW

use crate::{
    Ak80Frame, CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, RxAdapter,
    SplittableAdapter, TxAdapter,
};
use ::socketcan::{
    CanError as SocketCanError, CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket,
    StandardId,
};
use std::os::unix::io::AsRawFd;
use std::time::Duration;
use tracing::{error, trace, warn};

/// SocketCAN 适配器
///
/// ```no_run
/// use ak80_can::{SocketCanAdapter, CanAdapter, Ak80Frame};
///
/// let mut adapter = SocketCanAdapter::new("can0").unwrap();
/// adapter.send(Ak80Frame::new_standard(0x17, &[0xFF; 8])).unwrap();
/// let reply = adapter.receive().unwrap();
/// ```
#[derive(Debug)]
pub struct SocketCanAdapter {
    socket: CanSocket,
    /// 接口名称（如 "can0"）
    interface: String,
    /// 读超时时间
    read_timeout: Duration,
}

impl SocketCanAdapter {
    /// 打开 SocketCAN 接口
    ///
    /// # 错误
    /// - `CanError::Device`: 接口不存在或无法打开
    /// - `CanError::Io`: 设置超时失败
    pub fn new(interface: impl Into<String>) -> Result<Self, CanError> {
        let interface = interface.into();

        let socket = CanSocket::open(&interface).map_err(|e| {
            let kind = match e.kind() {
                std::io::ErrorKind::NotFound => CanDeviceErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => CanDeviceErrorKind::AccessDenied,
                _ => CanDeviceErrorKind::Backend,
            };
            CanError::Device(CanDeviceError::new(
                kind,
                format!(
                    "Failed to open CAN interface '{}': {}. Is it up? \
                     (sudo ip link set {} up type can bitrate 1000000)",
                    interface, e, interface
                ),
            ))
        })?;

        // 禁用 Loopback，避免本机发送的控制帧被 RX 线程当作反馈读回
        let loopback_enabled: libc::c_int = 0;
        let ret = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_CAN_RAW,
                libc::CAN_RAW_LOOPBACK,
                &loopback_enabled as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            warn!(
                "Failed to disable CAN_RAW_LOOPBACK on '{}': {}",
                interface,
                std::io::Error::last_os_error()
            );
        }

        // 接收错误帧，总线关闭 / 控制器溢出需要上报给 RX 线程
        let err_mask: libc::can_err_mask_t = libc::CAN_ERR_MASK;
        let ret = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_CAN_RAW,
                libc::CAN_RAW_ERR_FILTER,
                &err_mask as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::can_err_mask_t>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            warn!(
                "Failed to enable CAN error frames on '{}': {}",
                interface,
                std::io::Error::last_os_error()
            );
        }

        let read_timeout = Duration::from_millis(10);
        socket
            .set_read_timeout(read_timeout)
            .map_err(CanError::Io)?;

        trace!("SocketCAN interface '{}' opened", interface);

        Ok(Self {
            socket,
            interface,
            read_timeout,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// 设置读超时
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), CanError> {
        self.socket
            .set_read_timeout(timeout)
            .map_err(CanError::Io)?;
        self.read_timeout = timeout;
        Ok(())
    }
}

/// `Ak80Frame` → `CanFrame`
fn to_can_frame(frame: &Ak80Frame) -> Result<CanFrame, CanError> {
    let data = frame.data_slice();
    let can_frame = if frame.is_extended {
        ExtendedId::new(frame.id).and_then(|id| CanFrame::new(id, data))
    } else {
        StandardId::new(frame.id as u16).and_then(|id| CanFrame::new(id, data))
    };
    can_frame.ok_or_else(|| {
        CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::InvalidFrame,
            format!("Failed to create frame with ID 0x{:X}", frame.id),
        ))
    })
}

/// 发送一帧
fn transmit(socket: &CanSocket, frame: &Ak80Frame) -> Result<(), CanError> {
    let can_frame = to_can_frame(frame)?;
    socket.write_frame(&can_frame).map_err(CanError::Io)?;
    trace!("Sent CAN frame: ID=0x{:X}, len={}", frame.id, frame.len);
    Ok(())
}

/// 接收一帧数据帧（自动跳过错误帧和远程帧）
fn receive_data_frame(socket: &CanSocket) -> Result<Ak80Frame, CanError> {
    loop {
        let can_frame = match socket.read_frame() {
            Ok(f) => f,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err(CanError::Timeout);
            }
            Err(e) => return Err(CanError::Io(e)),
        };

        match can_frame {
            CanFrame::Data(_) => {}
            CanFrame::Remote(_) => continue,
            CanFrame::Error(err) => {
                classify_error_frame(SocketCanError::from(err))?;
                continue;
            }
        }

        let frame = if can_frame.is_extended() {
            Ak80Frame::new_extended(can_frame.raw_id(), can_frame.data())
        } else {
            Ak80Frame::new_standard(can_frame.raw_id() as u16, can_frame.data())
        };
        trace!("Received CAN frame: ID=0x{:X}, len={}", frame.id, frame.len);
        return Ok(frame);
    }
}

/// 错误帧分类：总线关闭和控制器溢出是致命错误，其余记录后忽略
fn classify_error_frame(err: SocketCanError) -> Result<(), CanError> {
    match err {
        SocketCanError::BusOff => {
            error!("CAN bus off");
            Err(CanError::BusOff)
        }
        SocketCanError::ControllerProblem(problem)
            if problem
                .to_string()
                .to_ascii_lowercase()
                .contains("overflow") =>
        {
            error!("CAN controller overflow: {}", problem);
            Err(CanError::BufferOverflow)
        }
        other => {
            warn!("CAN error frame received: {}, ignoring", other);
            Ok(())
        }
    }
}

impl CanAdapter for SocketCanAdapter {
    fn send(&mut self, frame: Ak80Frame) -> Result<(), CanError> {
        transmit(&self.socket, &frame)
    }

    fn receive(&mut self) -> Result<Ak80Frame, CanError> {
        receive_data_frame(&self.socket)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        if let Err(e) = self.set_read_timeout(timeout) {
            warn!("Failed to set receive timeout: {}", e);
        }
    }
}

/// 只读适配器（RX 线程）
#[derive(Debug)]
pub struct SocketCanRxAdapter {
    socket: CanSocket,
}

impl RxAdapter for SocketCanRxAdapter {
    fn receive(&mut self) -> Result<Ak80Frame, CanError> {
        receive_data_frame(&self.socket)
    }
}

/// 只写适配器（TX 线程）
#[derive(Debug)]
pub struct SocketCanTxAdapter {
    socket: CanSocket,
}

impl TxAdapter for SocketCanTxAdapter {
    fn send(&mut self, frame: Ak80Frame) -> Result<(), CanError> {
        transmit(&self.socket, &frame)
    }
}

impl SplittableAdapter for SocketCanAdapter {
    type RxAdapter = SocketCanRxAdapter;
    type TxAdapter = SocketCanTxAdapter;

    /// 分离为独立的 RX 和 TX 适配器
    ///
    /// 两个半边通过 `dup()` 共享同一个打开的文件描述，
    /// 因此严禁使用 `set_nonblocking()`，超时只能依赖 `SO_RCVTIMEO`。
    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError> {
        let tx_socket = std::os::fd::AsFd::as_fd(&self.socket)
            .try_clone_to_owned()
            .map(CanSocket::from)
            .map_err(|e| {
                CanError::Io(std::io::Error::other(format!(
                    "Failed to clone SocketCAN socket for TX: {}",
                    e
                )))
            })?;

        trace!(
            "SocketCanAdapter split into RX and TX adapters (interface: {})",
            self.interface
        );

        Ok((
            SocketCanRxAdapter {
                socket: self.socket,
            },
            SocketCanTxAdapter { socket: tx_socket },
        ))
    }
}

//! 后端选择
//!
//! 启动时按操作系统选择默认后端与通道，之后注入驱动层。
//!
//! | 平台 | 默认后端 | 默认通道 |
//! |---|---|---|
//! | Windows | SLCAN | `COM5` |
//! | Linux | SLCAN | `/dev/ttyACM0` |
//! | 其他 | SLCAN | `COM5` |
//!
//! Linux 上如果接口已由 `ip link` 配置好，可以显式选择 SocketCAN（如 `can0`）。

use std::fmt;
use std::str::FromStr;

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BackendKind {
    /// Linux SocketCAN
    SocketCan,
    /// 串口 CAN 适配器（Lawicel ASCII 协议）
    Slcan,
    /// 内存仿真电机
    #[cfg_attr(feature = "serde", serde(alias = "sim"))]
    Simulated,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::SocketCan => "socketcan",
            BackendKind::Slcan => "slcan",
            BackendKind::Simulated => "sim",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "socketcan" | "socket" => Ok(BackendKind::SocketCan),
            "slcan" | "serial" => Ok(BackendKind::Slcan),
            "sim" | "simulated" | "loopback" => Ok(BackendKind::Simulated),
            other => Err(format!(
                "unknown backend '{}', expected one of: socketcan, slcan, sim",
                other
            )),
        }
    }
}

/// 后端 + 通道（接口名或串口路径）
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BackendSelection {
    pub kind: BackendKind,
    pub channel: String,
}

impl BackendSelection {
    pub fn new(kind: BackendKind, channel: impl Into<String>) -> Self {
        Self {
            kind,
            channel: channel.into(),
        }
    }

    /// 按当前操作系统选择默认后端
    pub fn detect() -> Self {
        Self::for_os(std::env::consts::OS)
    }

    /// 按给定操作系统名（`std::env::consts::OS` 的取值）选择默认后端
    pub fn for_os(os: &str) -> Self {
        match os {
            "windows" => {
                tracing::debug!("Detected Windows, using SLCAN on COM5");
                Self::new(BackendKind::Slcan, "COM5")
            }
            "linux" => {
                tracing::debug!(
                    "Detected Linux, using SLCAN on /dev/ttyACM0 \
                     (for SocketCAN: sudo ip link set can0 up type can bitrate 1000000)"
                );
                Self::new(BackendKind::Slcan, "/dev/ttyACM0")
            }
            other => {
                tracing::warn!("Unsupported OS '{}', falling back to SLCAN on COM5", other);
                Self::new(BackendKind::Slcan, "COM5")
            }
        }
    }
}

impl Default for BackendSelection {
    fn default() -> Self {
        Self::detect()
    }
}

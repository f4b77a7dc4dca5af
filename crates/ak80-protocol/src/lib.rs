//! # AK80 Protocol
//!
//! CubeMars AK80-64 关节电机 MIT 模式 CAN 协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `limits`: 物理量范围表（位置/速度/Kp/Kd/力矩）
//! - `codec`: 定点编解码
//! - `ids`: CAN ID 与固定帧常量
//! - `control`: 控制帧构建（进入/退出 MIT 模式、零位设定、MIT 控制指令）
//! - `feedback`: 反馈帧解析
//! - `state`: 电机状态（指令值 / 测量值）
//!
//! ## 字节序
//!
//! 协议字段按 MSB 在前打包，字段之间不留填充位（12 位字段跨字节）。

pub mod codec;
pub mod control;
pub mod feedback;
pub mod ids;
pub mod limits;
pub mod state;

// 重新导出常用类型
pub use codec::{decode, encode};
pub use control::*;
pub use feedback::*;
pub use ids::*;
pub use limits::*;
pub use state::*;

/// CAN 2.0 标准帧的统一抽象
///
/// 协议层和硬件层之间的中间类型：协议层只构建/解析 `Ak80Frame`，
/// 具体的 SocketCAN / SLCAN 转换在 CAN 层实现。
///
/// - **Copy**：固定 8 字节，无堆分配
/// - **时间戳**：`timestamp_us` 为 0 表示后端无法提供时间戳
///
/// ```rust
/// use ak80_protocol::Ak80Frame;
///
/// let frame = Ak80Frame::new_standard(0x17, &[0xFF, 0xFC]);
/// assert_eq!(frame.id(), 0x17);
/// assert_eq!(frame.data_slice(), &[0xFF, 0xFC]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ak80Frame {
    /// CAN ID（标准帧或扩展帧）
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 是否为扩展帧（29-bit ID）
    pub is_extended: bool,

    /// 接收时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl Ak80Frame {
    /// 创建标准帧
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::new(id as u32, data, false)
    }

    /// 创建扩展帧
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::new(id, data, true)
    }

    fn new(id: u32, data: &[u8], is_extended: bool) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: len as u8,
            is_extended,
            timestamp_us: 0,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..(self.len as usize).min(8)]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u32 {
        self.id
    }
}

use thiserror::Error;

/// 协议错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// 反馈帧长度错误（状态保持不变）
    #[error("Malformed frame: expected {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    /// 反馈帧来自非预期的电机（帧被丢弃）
    #[error("Unexpected source: expected motor 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedSource { expected: u8, actual: u8 },

    /// 参数表配置错误（致命，初始化阶段报告）
    #[error("Invalid range for {quantity}: min={min}, max={max}, bits={bits}")]
    InvalidRangeConfiguration {
        quantity: Quantity,
        min: f32,
        max: f32,
        bits: u8,
    },
}

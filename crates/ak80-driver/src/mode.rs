//! 控制模式定义
//!
//! 电机只有两个状态：空闲和 MIT 控制模式。零位指令不改变模式。
//!
//! ```text
//!          enter_control_mode
//!   Idle ───────────────────────▶ ControlActive
//!    ▲                                 │
//!    └──────── exit_control_mode ──────┘
//! ```
//!
//! TX 线程读取模式决定是否发送周期性控制帧。

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 控制模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ControlMode {
    /// 空闲（初始状态）
    ///
    /// TX 线程不发送周期性控制帧。
    #[default]
    Idle = 0,

    /// MIT 控制模式
    ///
    /// 电机响应控制帧，TX 线程可以按周期发送。
    ControlActive = 1,
}

impl ControlMode {
    /// 从 u8 转换，无效值返回 Idle
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ControlActive,
            _ => Self::Idle,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_active(self) -> bool {
        self == Self::ControlActive
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::Idle => f.write_str("idle"),
            ControlMode::ControlActive => f.write_str("control-active"),
        }
    }
}

/// 控制模式（原子版本，用于线程间共享）
///
/// # 示例
///
/// ```rust
/// use ak80_driver::mode::{AtomicControlMode, ControlMode};
/// use std::sync::atomic::Ordering;
///
/// let mode = AtomicControlMode::new(ControlMode::Idle);
/// mode.set(ControlMode::ControlActive, Ordering::Release);
/// assert!(mode.get(Ordering::Acquire).is_active());
/// ```
#[derive(Debug)]
pub struct AtomicControlMode {
    inner: AtomicU8,
}

impl AtomicControlMode {
    pub fn new(mode: ControlMode) -> Self {
        Self {
            inner: AtomicU8::new(mode.as_u8()),
        }
    }

    /// 获取当前模式
    pub fn get(&self, ordering: Ordering) -> ControlMode {
        ControlMode::from_u8(self.inner.load(ordering))
    }

    /// 设置模式，返回之前的模式
    pub fn swap(&self, mode: ControlMode, ordering: Ordering) -> ControlMode {
        ControlMode::from_u8(self.inner.swap(mode.as_u8(), ordering))
    }

    pub fn set(&self, mode: ControlMode, ordering: Ordering) {
        self.inner.store(mode.as_u8(), ordering);
    }
}

impl Default for AtomicControlMode {
    fn default() -> Self {
        Self::new(ControlMode::Idle)
    }
}

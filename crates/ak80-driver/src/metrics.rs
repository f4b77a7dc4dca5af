//! 性能指标
//!
//! 原子计数器，任何线程都可以读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 电机 IO 链路指标
///
/// ```rust
/// use ak80_driver::MotorMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = MotorMetrics::new();
/// metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().rx_frames_total, 1);
/// ```
#[derive(Debug, Default)]
pub struct MotorMetrics {
    /// RX 接收的总帧数
    pub rx_frames_total: AtomicU64,
    /// 成功解析的反馈帧数
    pub rx_feedback_decoded: AtomicU64,
    /// 长度错误的帧数
    pub rx_malformed: AtomicU64,
    /// 电机 ID 不匹配的帧数（总线上的其他设备）
    pub rx_unexpected_source: AtomicU64,
    /// RX 超时次数（无数据时的正常现象）
    pub rx_timeouts: AtomicU64,
    /// TX 发送成功的帧数
    pub tx_frames_total: AtomicU64,
    /// TX 发送失败次数
    pub tx_errors: AtomicU64,
    /// 设备错误次数
    pub device_errors: AtomicU64,
}

impl MotorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取所有计数器
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rx_frames_total: self.rx_frames_total.load(Ordering::Relaxed),
            rx_feedback_decoded: self.rx_feedback_decoded.load(Ordering::Relaxed),
            rx_malformed: self.rx_malformed.load(Ordering::Relaxed),
            rx_unexpected_source: self.rx_unexpected_source.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
            tx_frames_total: self.tx_frames_total.load(Ordering::Relaxed),
            tx_errors: self.tx_errors.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub rx_frames_total: u64,
    pub rx_feedback_decoded: u64,
    pub rx_malformed: u64,
    pub rx_unexpected_source: u64,
    pub rx_timeouts: u64,
    pub tx_frames_total: u64,
    pub tx_errors: u64,
    pub device_errors: u64,
}

impl MetricsSnapshot {
    /// 被丢弃的帧数（长度错误 + ID 不匹配）
    pub fn rx_dropped(&self) -> u64 {
        self.rx_malformed + self.rx_unexpected_source
    }
}

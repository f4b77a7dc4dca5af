//! 共享状态上下文
//!
//! `MotorState` 的两部分分别由不同线程写入：
//!
//! | 字段 | 写入方 | 读取方 |
//! |---|---|---|
//! | `commanded` | TX 线程（编码控制帧时） | 任意线程 |
//! | `measured` | RX 线程（解析反馈成功时） | 任意线程 |
//! | `setpoint` | 调用方（`Motor::set_setpoint`） | TX 线程 |
//!
//! 每个记录只有一个写入方，用 `ArcSwap` 发布快照，读取无锁。

use crate::mode::AtomicControlMode;
use ak80_protocol::{CommandedState, MeasuredState, MitSetpoint, MotorState};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 电机上下文（所有共享状态的聚合）
#[derive(Debug)]
pub struct MotorContext {
    /// 最近一次下发的指令值（已限幅）
    pub commanded: ArcSwap<CommandedState>,
    /// 最近一次解析的反馈值
    pub measured: ArcSwap<MeasuredState>,
    /// 周期控制的目标值（未限幅，由编码器在发送时限幅）
    pub setpoint: ArcSwap<MitSetpoint>,
    /// 控制模式
    pub mode: AtomicControlMode,
    /// 是否开启周期发送
    pub continuous: AtomicBool,
}

impl MotorContext {
    /// 创建新的上下文
    ///
    /// ```
    /// use ak80_driver::MotorContext;
    ///
    /// let ctx = MotorContext::new();
    /// assert_eq!(ctx.commanded.load().kd, 0.5);
    /// assert!(!ctx.measured.load().has_feedback());
    /// ```
    pub fn new() -> Self {
        let initial = MotorState::default();
        Self {
            commanded: ArcSwap::from_pointee(initial.commanded),
            measured: ArcSwap::from_pointee(initial.measured),
            setpoint: ArcSwap::from_pointee(MitSetpoint::from(initial.commanded)),
            mode: AtomicControlMode::default(),
            continuous: AtomicBool::new(false),
        }
    }

    /// 组合当前的指令值和测量值
    pub fn state(&self) -> MotorState {
        MotorState {
            commanded: **self.commanded.load(),
            measured: **self.measured.load(),
        }
    }

    pub(crate) fn publish_commanded(&self, commanded: CommandedState) {
        self.commanded.store(Arc::new(commanded));
    }

    pub(crate) fn publish_measured(&self, measured: MeasuredState) {
        self.measured.store(Arc::new(measured));
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous.load(Ordering::Acquire)
    }
}

impl Default for MotorContext {
    fn default() -> Self {
        Self::new()
    }
}

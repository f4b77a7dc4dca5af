//! 电机状态定义
//!
//! `MotorState` 是协议层唯一的有状态实体，分为两部分：
//!
//! - `commanded`：最近一次下发的指令值，只由 [`CommandEncoder`](crate::CommandEncoder) 写入
//! - `measured`：最近一次解析的反馈值，只由 [`ResponseDecoder`](crate::ResponseDecoder) 写入
//!
//! 两部分各自只有一个写入方，因此驱动层可以把它们放在不同线程中独立发布。

/// 指令值（物理单位）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommandedState {
    /// 目标位置（rad）
    pub position: f32,
    /// 目标速度（rad/s）
    pub velocity: f32,
    /// 位置增益（N·m/rad）
    pub kp: f32,
    /// 速度增益（N·m·s/rad）
    pub kd: f32,
    /// 前馈力矩（N·m）
    pub torque: f32,
}

impl Default for CommandedState {
    /// 初始 Kd 为 0.5，其余为 0
    fn default() -> Self {
        Self {
            position: 0.0,
            velocity: 0.0,
            kp: 0.0,
            kd: 0.5,
            torque: 0.0,
        }
    }
}

/// 测量值（物理单位）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasuredState {
    /// 实际位置（rad）
    pub position: f32,
    /// 实际速度（rad/s）
    pub velocity: f32,
    /// 实际力矩（N·m）
    pub torque: f32,
    /// 最近一帧反馈的接收时间戳（微秒，0 表示不可用）
    pub timestamp_us: u64,
    /// 成功解析的反馈帧计数
    pub sequence: u64,
}

impl MeasuredState {
    /// 是否收到过反馈
    pub fn has_feedback(&self) -> bool {
        self.sequence > 0
    }
}

/// 单个电机的完整状态
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorState {
    pub commanded: CommandedState,
    pub measured: MeasuredState,
}

impl MotorState {
    pub fn new() -> Self {
        Self::default()
    }
}

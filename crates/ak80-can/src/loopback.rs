//! 内存回环后端 + 电机仿真
//!
//! 不依赖任何硬件：发送的帧交给 [`SimulatedMotor`] 处理，它的回复进入接收队列。
//! 用于 CLI 的 `--backend sim`、驱动层集成测试和离线调试。

use crate::{Ak80Frame, CanAdapter, CanError, RxAdapter, SplittableAdapter, TxAdapter};
use ak80_protocol::{
    CONTROL_FRAME_LEN, ControlCodes, DEFAULT_CONTROLLER_ID, LimitsTable, ModeCommand, MotorFeedback,
};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::trace;

/// 反馈帧使用的 CAN ID（主机 ID）
pub const FEEDBACK_CAN_ID: u16 = 0x000;

/// 发送记录保留的最大帧数
const SENT_LOG_CAPACITY: usize = 4096;

/// 仿真电机
///
/// 行为模型：
/// - 模式指令（进入/退出/零位）总是回复一帧反馈
/// - 控制帧仅在 MIT 模式下回复，测量值直接跟随目标位置/速度，力矩等于前馈力矩
/// - ID 不匹配的帧被忽略
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedMotor {
    limits: LimitsTable,
    controller_id: u8,
    active: bool,
    position: f32,
    velocity: f32,
    torque: f32,
}

impl SimulatedMotor {
    pub fn new(limits: LimitsTable, controller_id: u8) -> Self {
        Self {
            limits,
            controller_id,
            active: false,
            position: 0.0,
            velocity: 0.0,
            torque: 0.0,
        }
    }

    pub fn controller_id(&self) -> u8 {
        self.controller_id
    }

    /// 是否处于 MIT 模式
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn torque(&self) -> f32 {
        self.torque
    }

    /// 处理一帧指令，返回电机的回复（如果有）
    pub fn handle(&mut self, frame: &Ak80Frame) -> Option<Ak80Frame> {
        if frame.is_extended || frame.id != self.controller_id as u32 {
            return None;
        }
        let data: &[u8; CONTROL_FRAME_LEN] = frame.data_slice().try_into().ok()?;

        if let Some(command) = ModeCommand::from_payload(data) {
            match command {
                ModeCommand::Enter => self.active = true,
                ModeCommand::Exit => {
                    self.active = false;
                    self.velocity = 0.0;
                    self.torque = 0.0;
                }
                ModeCommand::Zero => self.position = 0.0,
            }
            trace!("SimulatedMotor: {:?} (active={})", command, self.active);
            return Some(self.feedback_frame());
        }

        if !self.active {
            return None;
        }

        let setpoint = ControlCodes::unpack(data).to_setpoint(&self.limits);
        self.position = setpoint.position;
        self.velocity = setpoint.velocity;
        self.torque = setpoint.torque;
        Some(self.feedback_frame())
    }

    fn feedback_frame(&self) -> Ak80Frame {
        let feedback = MotorFeedback {
            motor_id: self.controller_id,
            position: self.position,
            velocity: self.velocity,
            torque: self.torque,
        };
        Ak80Frame::new_standard(FEEDBACK_CAN_ID, &feedback.to_payload(&self.limits))
    }
}

impl Default for SimulatedMotor {
    fn default() -> Self {
        Self::new(LimitsTable::AK80_64, DEFAULT_CONTROLLER_ID)
    }
}

#[derive(Debug, Default)]
struct Bus {
    rx_queue: VecDeque<Ak80Frame>,
    sent: VecDeque<Ak80Frame>,
    motor: Option<SimulatedMotor>,
}

#[derive(Debug)]
struct Shared {
    bus: Mutex<Bus>,
    ready: Condvar,
    epoch: Instant,
}

impl Shared {
    fn new(motor: Option<SimulatedMotor>) -> Arc<Self> {
        Arc::new(Self {
            bus: Mutex::new(Bus {
                motor,
                ..Bus::default()
            }),
            ready: Condvar::new(),
            epoch: Instant::now(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Bus> {
        self.bus.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn push_rx(&self, bus: &mut Bus, mut frame: Ak80Frame) {
        if frame.timestamp_us == 0 {
            frame.timestamp_us = self.now_us();
        }
        bus.rx_queue.push_back(frame);
        self.ready.notify_all();
    }

    fn send(&self, frame: Ak80Frame) {
        let mut bus = self.lock();
        if bus.sent.len() == SENT_LOG_CAPACITY {
            bus.sent.pop_front();
        }
        bus.sent.push_back(frame);

        let reply = bus.motor.as_mut().and_then(|motor| motor.handle(&frame));
        if let Some(reply) = reply {
            self.push_rx(&mut bus, reply);
        }
    }

    fn receive(&self, timeout: Duration) -> Result<Ak80Frame, CanError> {
        let bus = self.lock();
        let (mut bus, _) = self
            .ready
            .wait_timeout_while(bus, timeout, |bus| bus.rx_queue.is_empty())
            .unwrap_or_else(|e| e.into_inner());
        bus.rx_queue.pop_front().ok_or(CanError::Timeout)
    }
}

/// 回环适配器
///
/// ```
/// use ak80_can::{LoopbackAdapter, CanAdapter};
/// use ak80_protocol::CommandEncoder;
///
/// let mut adapter = LoopbackAdapter::simulated();
/// let encoder = CommandEncoder::default();
/// adapter.send(encoder.enter_control_mode()).unwrap();
/// let reply = adapter.receive().unwrap();
/// assert_eq!(reply.data[0], 0x17);
/// ```
#[derive(Debug)]
pub struct LoopbackAdapter {
    shared: Arc<Shared>,
    timeout: Duration,
}

impl LoopbackAdapter {
    /// 无电机的空总线：发送的帧只被记录
    pub fn new() -> Self {
        Self::from_shared(Shared::new(None))
    }

    /// 挂载一台仿真电机
    pub fn with_motor(motor: SimulatedMotor) -> Self {
        Self::from_shared(Shared::new(Some(motor)))
    }

    /// 挂载一台默认参数的仿真电机（AK80-64，ID 0x17）
    pub fn simulated() -> Self {
        Self::with_motor(SimulatedMotor::default())
    }

    fn from_shared(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            timeout: Duration::from_millis(10),
        }
    }

    /// 获取总线观察句柄（split 之后仍可用）
    pub fn handle(&self) -> LoopbackHandle {
        LoopbackHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for LoopbackAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CanAdapter for LoopbackAdapter {
    fn send(&mut self, frame: Ak80Frame) -> Result<(), CanError> {
        self.shared.send(frame);
        Ok(())
    }

    fn receive(&mut self) -> Result<Ak80Frame, CanError> {
        self.shared.receive(self.timeout)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

/// 总线观察/注入句柄
#[derive(Debug, Clone)]
pub struct LoopbackHandle {
    shared: Arc<Shared>,
}

impl LoopbackHandle {
    /// 向接收队列注入一帧（模拟总线上的其他设备）
    pub fn inject(&self, frame: Ak80Frame) {
        let mut bus = self.shared.lock();
        self.shared.push_rx(&mut bus, frame);
    }

    /// 已发送的帧（按发送顺序）
    pub fn sent_frames(&self) -> Vec<Ak80Frame> {
        self.shared.lock().sent.iter().copied().collect()
    }

    pub fn sent_count(&self) -> usize {
        self.shared.lock().sent.len()
    }

    /// 仿真电机当前状态的快照
    pub fn motor(&self) -> Option<SimulatedMotor> {
        self.shared.lock().motor
    }
}

/// 只读适配器（RX 线程）
#[derive(Debug)]
pub struct LoopbackRxAdapter {
    shared: Arc<Shared>,
    timeout: Duration,
}

impl RxAdapter for LoopbackRxAdapter {
    fn receive(&mut self) -> Result<Ak80Frame, CanError> {
        self.shared.receive(self.timeout)
    }
}

/// 只写适配器（TX 线程）
#[derive(Debug)]
pub struct LoopbackTxAdapter {
    shared: Arc<Shared>,
}

impl TxAdapter for LoopbackTxAdapter {
    fn send(&mut self, frame: Ak80Frame) -> Result<(), CanError> {
        self.shared.send(frame);
        Ok(())
    }
}

impl SplittableAdapter for LoopbackAdapter {
    type RxAdapter = LoopbackRxAdapter;
    type TxAdapter = LoopbackTxAdapter;

    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError> {
        Ok((
            LoopbackRxAdapter {
                shared: Arc::clone(&self.shared),
                timeout: self.timeout,
            },
            LoopbackTxAdapter {
                shared: self.shared,
            },
        ))
    }
}

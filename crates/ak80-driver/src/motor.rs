//! Motor API 模块
//!
//! 提供对外的 `Motor` 结构体，封装底层 IO 线程和状态同步细节。

use crate::error::DriverError;
use crate::metrics::{MetricsSnapshot, MotorMetrics};
use crate::mode::ControlMode;
use crate::pipeline::{PipelineConfig, TxRequest, rx_loop, tx_loop};
use crate::state::MotorContext;
use ak80_can::{BackendKind, CanError, SplittableAdapter};
use ak80_protocol::{
    CommandEncoder, CommandedState, LimitsTable, MeasuredState, MitSetpoint, ModeCommand,
    MotorState, ResponseDecoder,
};
use crossbeam_channel::{Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// 显式请求队列容量
pub const COMMAND_QUEUE_CAPACITY: usize = 10;

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);

        // 由看门狗线程 join，主线程只等待结果
        spawn(move || {
            let result = self.join().map(|_| ());
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => Err(Box::new("thread join timed out")),
        }
    }
}

/// 单个 AK80 电机的驱动句柄
///
/// 创建时把 CAN 适配器拆分为 RX/TX 两半，分别交给两个后台线程：
///
/// - RX 线程解析反馈，更新 `measured`
/// - TX 线程发送模式指令和控制帧，更新 `commanded`
///
/// Drop 时停止并回收两个线程。
///
/// ```no_run
/// use ak80_driver::MotorBuilder;
/// use ak80_protocol::MitSetpoint;
///
/// let motor = MotorBuilder::new().build().unwrap();
/// motor.enter_control_mode().unwrap();
/// motor.start_continuous(MitSetpoint::new(1.0, 0.0, 50.0, 1.0, 0.0));
/// std::thread::sleep(std::time::Duration::from_secs(1));
/// println!("{:?}", motor.measured());
/// motor.exit_control_mode().unwrap();
/// ```
pub struct Motor {
    /// 显式请求队列（Drop 时先释放，使 TX 线程感知断开）
    cmd_tx: Option<Sender<TxRequest>>,
    ctx: Arc<MotorContext>,
    rx_thread: Option<JoinHandle<()>>,
    tx_thread: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<MotorMetrics>,
    limits: LimitsTable,
    controller_id: u8,
    interface: String,
    backend: Option<BackendKind>,
}

impl Motor {
    /// 创建双线程模式的 Motor 实例
    ///
    /// # 参数
    /// - `can`: 可分离的 CAN 适配器（会被消费）
    /// - `limits`: 电机参数表
    /// - `controller_id`: 电机控制器 ID
    /// - `config`: Pipeline 配置（可选）
    ///
    /// # 错误
    /// - `CanError`: 分离适配器失败
    pub fn new_dual_thread<C>(
        can: C,
        limits: LimitsTable,
        controller_id: u8,
        config: Option<PipelineConfig>,
    ) -> Result<Self, CanError>
    where
        C: SplittableAdapter + Send + 'static,
        C::RxAdapter: Send + 'static,
        C::TxAdapter: Send + 'static,
    {
        let (rx_adapter, tx_adapter) = can.split()?;
        let config = config.unwrap_or_default();

        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded::<TxRequest>(COMMAND_QUEUE_CAPACITY);
        let ctx = Arc::new(MotorContext::new());
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(MotorMetrics::new());

        let decoder = ResponseDecoder::new(limits, controller_id);
        let rx_thread = {
            let (ctx, is_running, metrics) = (ctx.clone(), is_running.clone(), metrics.clone());
            spawn(move || rx_loop(rx_adapter, decoder, ctx, is_running, metrics))
        };

        let encoder = CommandEncoder::new(limits, controller_id);
        let tx_thread = {
            let (ctx, is_running, metrics) = (ctx.clone(), is_running.clone(), metrics.clone());
            spawn(move || tx_loop(tx_adapter, encoder, cmd_rx, ctx, config, is_running, metrics))
        };

        info!("Motor 0x{:02X} started (dual-thread mode)", controller_id);

        Ok(Self {
            cmd_tx: Some(cmd_tx),
            ctx,
            rx_thread: Some(rx_thread),
            tx_thread: Some(tx_thread),
            is_running,
            metrics,
            limits,
            controller_id,
            interface: "unknown".to_string(),
            backend: None,
        })
    }

    /// 设置元数据（内部方法，由 Builder 调用）
    pub(crate) fn with_metadata(mut self, interface: String, backend: BackendKind) -> Self {
        self.interface = interface;
        self.backend = Some(backend);
        self
    }

    fn queue(&self, request: TxRequest) -> Result<(), DriverError> {
        let cmd_tx = self.cmd_tx.as_ref().ok_or(DriverError::ChannelClosed)?;
        if !self.is_running.load(Ordering::Acquire) {
            return Err(DriverError::ChannelClosed);
        }
        match cmd_tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DriverError::ChannelFull),
            Err(TrySendError::Disconnected(_)) => Err(DriverError::ChannelClosed),
        }
    }

    /// 进入 MIT 控制模式
    ///
    /// 指令入队成功后模式切换为 `ControlActive`。
    pub fn enter_control_mode(&self) -> Result<(), DriverError> {
        self.queue(TxRequest::Mode(ModeCommand::Enter))?;
        let previous = self.ctx.mode.swap(ControlMode::ControlActive, Ordering::AcqRel);
        info!("Motor 0x{:02X}: {} -> {}", self.controller_id, previous, ControlMode::ControlActive);
        Ok(())
    }

    /// 退出 MIT 控制模式
    ///
    /// 周期发送在 Exit 入队之前关闭，TX 线程不会在 Exit 之后再发控制帧；
    /// 入队失败时恢复原状态。入队成功后模式切换为 `Idle`。
    pub fn exit_control_mode(&self) -> Result<(), DriverError> {
        let was_continuous = self.ctx.continuous.swap(false, Ordering::AcqRel);
        if let Err(e) = self.queue(TxRequest::Mode(ModeCommand::Exit)) {
            if was_continuous {
                self.ctx.continuous.store(true, Ordering::Release);
            }
            return Err(e);
        }
        let previous = self.ctx.mode.swap(ControlMode::Idle, Ordering::AcqRel);
        info!("Motor 0x{:02X}: {} -> {}", self.controller_id, previous, ControlMode::Idle);
        Ok(())
    }

    /// 将当前位置设为零点（不改变模式）
    pub fn zero_position(&self) -> Result<(), DriverError> {
        self.queue(TxRequest::Mode(ModeCommand::Zero))?;
        info!("Motor 0x{:02X}: zero position requested", self.controller_id);
        Ok(())
    }

    /// 发送单次控制帧
    ///
    /// 返回限幅后的目标值（TX 线程编码时写入 `commanded` 的值）。
    /// 空闲模式下仍会发送，但电机不会响应。
    pub fn send_command(
        &self,
        position: f32,
        velocity: f32,
        kp: f32,
        kd: f32,
        torque: f32,
    ) -> Result<MitSetpoint, DriverError> {
        self.send_setpoint(&MitSetpoint::new(position, velocity, kp, kd, torque))
    }

    /// 同 [`send_command`](Self::send_command)，参数为 `MitSetpoint`
    pub fn send_setpoint(&self, setpoint: &MitSetpoint) -> Result<MitSetpoint, DriverError> {
        if !self.mode().is_active() {
            warn!(
                "Motor 0x{:02X}: control frame sent while idle, the motor will ignore it",
                self.controller_id
            );
        }
        self.queue(TxRequest::Control(*setpoint))?;
        Ok(setpoint.clamped(&self.limits))
    }

    /// 更新周期控制的目标值
    pub fn set_setpoint(&self, setpoint: MitSetpoint) {
        self.ctx.setpoint.store(Arc::new(setpoint));
    }

    /// 开启周期发送
    ///
    /// 只有在 MIT 模式下 TX 线程才会真正发送。
    pub fn start_continuous(&self, setpoint: MitSetpoint) {
        self.set_setpoint(setpoint);
        if !self.ctx.continuous.swap(true, Ordering::AcqRel) {
            info!("Motor 0x{:02X}: continuous control started", self.controller_id);
        }
        if !self.mode().is_active() {
            warn!(
                "Motor 0x{:02X}: continuous control is on but the motor is idle, \
                 no frames will be sent until enter_control_mode()",
                self.controller_id
            );
        }
    }

    /// 关闭周期发送
    pub fn stop_continuous(&self) {
        if self.ctx.continuous.swap(false, Ordering::AcqRel) {
            info!("Motor 0x{:02X}: continuous control stopped", self.controller_id);
        }
    }

    pub fn is_continuous(&self) -> bool {
        self.ctx.is_continuous()
    }

    /// 当前控制模式
    pub fn mode(&self) -> ControlMode {
        self.ctx.mode.get(Ordering::Acquire)
    }

    /// 最近一次下发的指令值（无锁读取）
    pub fn commanded(&self) -> CommandedState {
        **self.ctx.commanded.load()
    }

    /// 最近一次解析的反馈值（无锁读取）
    pub fn measured(&self) -> MeasuredState {
        **self.ctx.measured.load()
    }

    pub fn setpoint(&self) -> MitSetpoint {
        **self.ctx.setpoint.load()
    }

    pub fn state(&self) -> MotorState {
        self.ctx.state()
    }

    /// 等待下一帧反馈
    ///
    /// # 错误
    /// - `DriverError::Timeout`: 超时未收到新的反馈
    /// - `DriverError::IoThread`: IO 线程已停止
    pub fn wait_for_feedback(&self, timeout: Duration) -> Result<MeasuredState, DriverError> {
        let baseline = self.measured().sequence;
        let start = Instant::now();

        loop {
            let measured = self.measured();
            if measured.sequence != baseline {
                return Ok(measured);
            }
            if !self.is_running.load(Ordering::Acquire) {
                return Err(DriverError::IoThread("IO threads stopped".to_string()));
            }
            if start.elapsed() >= timeout {
                return Err(DriverError::Timeout);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// 返回 RX 和 TX 线程的存活状态
    pub fn check_health(&self) -> (bool, bool) {
        let rx_alive = self.rx_thread.as_ref().is_some_and(|h| !h.is_finished());
        let tx_alive = self.tx_thread.as_ref().is_some_and(|h| !h.is_finished());
        (rx_alive, tx_alive)
    }

    pub fn is_healthy(&self) -> bool {
        let (rx_alive, tx_alive) = self.check_health();
        rx_alive && tx_alive
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn limits(&self) -> &LimitsTable {
        &self.limits
    }

    pub fn controller_id(&self) -> u8 {
        self.controller_id
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.backend
    }
}

impl Drop for Motor {
    fn drop(&mut self) {
        // Release: 之前的所有写入对看到 false 的线程可见
        self.is_running.store(false, Ordering::Release);

        // 必须在 join 之前释放 Sender，TX 线程才能感知断开
        drop(self.cmd_tx.take());

        let join_timeout = Duration::from_secs(2);

        if let Some(handle) = self.rx_thread.take()
            && handle.join_timeout(join_timeout).is_err()
        {
            error!("RX thread panicked or failed to shut down within {:?}", join_timeout);
        }

        if let Some(handle) = self.tx_thread.take()
            && handle.join_timeout(join_timeout).is_err()
        {
            error!("TX thread panicked or failed to shut down within {:?}", join_timeout);
        }

        info!("Motor 0x{:02X} stopped", self.controller_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ak80_can::LoopbackAdapter;

    fn loopback_motor() -> (Motor, ak80_can::LoopbackHandle) {
        let adapter = LoopbackAdapter::simulated();
        let handle = adapter.handle();
        let config = PipelineConfig {
            receive_timeout_ms: 2,
            command_interval: Duration::from_millis(10),
        };
        let motor = Motor::new_dual_thread(adapter, LimitsTable::AK80_64, 0x17, Some(config))
            .unwrap();
        (motor, handle)
    }

    #[test]
    fn test_mode_transitions() {
        let (motor, _handle) = loopback_motor();
        assert_eq!(motor.mode(), ControlMode::Idle);

        motor.enter_control_mode().unwrap();
        assert_eq!(motor.mode(), ControlMode::ControlActive);

        motor.zero_position().unwrap();
        assert_eq!(motor.mode(), ControlMode::ControlActive);

        motor.exit_control_mode().unwrap();
        assert_eq!(motor.mode(), ControlMode::Idle);
        assert!(motor.is_healthy());
    }

    #[test]
    fn test_send_command_returns_clamped() {
        let (motor, _handle) = loopback_motor();
        let clamped = motor.send_command(100.0, -100.0, 600.0, -1.0, 0.0).unwrap();
        assert_eq!(clamped, MitSetpoint::new(12.5, -8.0, 500.0, 0.0, 0.0));
    }

    #[test]
    fn test_wait_for_feedback_times_out_when_idle() {
        let (motor, _handle) = loopback_motor();
        // 空闲模式下控制帧不会得到回复
        motor.send_command(1.0, 0.0, 10.0, 1.0, 0.0).unwrap();
        assert!(matches!(
            motor.wait_for_feedback(Duration::from_millis(50)),
            Err(DriverError::Timeout)
        ));
    }

    #[test]
    fn test_exit_stops_continuous() {
        let (motor, _handle) = loopback_motor();
        motor.enter_control_mode().unwrap();
        motor.start_continuous(MitSetpoint::default());
        assert!(motor.is_continuous());

        motor.exit_control_mode().unwrap();
        assert!(!motor.is_continuous());
    }

    #[test]
    fn test_failed_exit_keeps_continuous() {
        let (motor, _handle) = loopback_motor();
        motor.enter_control_mode().unwrap();
        motor.start_continuous(MitSetpoint::default());

        // IO 线程已停止，Exit 无法入队
        motor.is_running.store(false, Ordering::Release);
        assert!(matches!(motor.exit_control_mode(), Err(DriverError::ChannelClosed)));
        assert!(motor.is_continuous());
        assert_eq!(motor.mode(), ControlMode::ControlActive);
    }

    #[test]
    fn test_drop_joins_threads() {
        let (motor, _handle) = loopback_motor();
        let start = Instant::now();
        drop(motor);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}

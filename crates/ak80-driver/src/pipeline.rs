//! Pipeline IO 循环模块
//!
//! - RX 线程：接收 CAN 帧 → 解析反馈 → 发布 `measured` 快照
//! - TX 线程：按优先级发送显式指令，MIT 模式下按周期发送控制帧
//!
//! 两个线程通过 `is_running` 联动：任意一方遇到致命错误都会让双方退出。

use crate::metrics::MotorMetrics;
use crate::state::MotorContext;
use ak80_can::{CanError, RxAdapter, TxAdapter};
use ak80_protocol::{
    Ak80Frame, CommandEncoder, CommandedState, MitSetpoint, ModeCommand, ProtocolError,
    ResponseDecoder,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// 命令队列空闲时的轮询间隔（用于检查 `is_running`）
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// 距离下一个周期小于此值时改用 spin_sleep 精确等待
const SPIN_THRESHOLD: Duration = Duration::from_millis(2);

/// Pipeline 配置
///
/// # Example
///
/// ```
/// use ak80_driver::PipelineConfig;
/// use std::time::Duration;
///
/// // 默认配置（10ms 接收超时，100ms 控制周期）
/// let config = PipelineConfig::default();
///
/// // 50Hz 控制
/// let config = PipelineConfig {
///     receive_timeout_ms: 5,
///     command_interval: Duration::from_millis(20),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// CAN 接收超时（毫秒）
    pub receive_timeout_ms: u64,
    /// 周期控制帧发送间隔
    pub command_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 10,
            command_interval: Duration::from_millis(100),
        }
    }
}

/// TX 线程的显式请求
///
/// 所有控制帧都由 TX 线程编码，保证 `commanded` 只有一个写入方。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TxRequest {
    /// 模式指令（进入/退出/零位）
    Mode(ModeCommand),
    /// 单次控制帧
    Control(MitSetpoint),
}

/// RX 线程主循环
///
/// # 参数
/// - `rx`: RX 适配器（只读）
/// - `decoder`: 反馈解码器
/// - `ctx`: 共享状态上下文
/// - `is_running`: 运行标志（用于生命周期联动）
/// - `metrics`: 性能指标
pub fn rx_loop(
    mut rx: impl RxAdapter,
    decoder: ResponseDecoder,
    ctx: Arc<MotorContext>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<MotorMetrics>,
) {
    // RX 线程是 measured 的唯一写入方，本地副本与已发布快照保持一致
    let mut measured = **ctx.measured.load();

    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        let frame = match rx.receive() {
            Ok(frame) => {
                metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
                frame
            },
            Err(CanError::Timeout) => {
                metrics.rx_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(e) => {
                error!("RX thread: CAN receive error: {}", e);
                metrics.device_errors.fetch_add(1, Ordering::Relaxed);

                if e.is_fatal() {
                    error!("RX thread: Fatal error detected, setting is_running = false");
                    // Release: All writes before this are visible to threads that see the false value
                    is_running.store(false, Ordering::Release);
                    break;
                }
                continue;
            },
        };

        match decoder.decode_feedback_frame(&frame, &mut measured) {
            Ok(()) => {
                metrics.rx_feedback_decoded.fetch_add(1, Ordering::Relaxed);
                ctx.publish_measured(measured);
                trace!(
                    "RX thread: feedback #{} pos={:.4} vel={:.3} torque={:.3}",
                    measured.sequence, measured.position, measured.velocity, measured.torque
                );
            },
            Err(ProtocolError::MalformedFrame { expected, actual }) => {
                metrics.rx_malformed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "RX thread: dropping frame ID=0x{:X}, length {} (expected {})",
                    frame.id, actual, expected
                );
            },
            Err(ProtocolError::UnexpectedSource { actual, .. }) => {
                metrics.rx_unexpected_source.fetch_add(1, Ordering::Relaxed);
                trace!("RX thread: ignoring feedback from motor 0x{:02X}", actual);
            },
            Err(e) => debug!("RX thread: dropping frame ID=0x{:X}: {}", frame.id, e),
        }
    }

    trace!("RX thread: loop exited");
}

/// TX 线程主循环
///
/// 调度顺序：
/// 1. 显式请求（模式指令、单次控制帧）优先，使用 `try_recv` 保证严格优先级
/// 2. 周期开启且处于 MIT 模式时，按 `command_interval` 从最新 setpoint 编码控制帧
/// 3. 都没有则等待，直到下一个请求或下一个周期
///
/// # 参数
/// - `tx`: TX 适配器（只写）
/// - `encoder`: 指令编码器
/// - `cmd_rx`: 显式请求队列接收端
/// - `ctx`: 共享状态上下文
/// - `config`: Pipeline 配置
/// - `is_running`: 运行标志（用于生命周期联动）
/// - `metrics`: 性能指标
pub fn tx_loop(
    mut tx: impl TxAdapter,
    encoder: CommandEncoder,
    cmd_rx: Receiver<TxRequest>,
    ctx: Arc<MotorContext>,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<MotorMetrics>,
) {
    // TX 线程是 commanded 的唯一写入方
    let mut commanded = **ctx.commanded.load();
    let interval = config.command_interval;
    let mut next_tick = Instant::now();

    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("TX thread: is_running flag is false, exiting");
            break;
        }

        // 先读标志再查队列：模式指令总是在标志变化之前入队（Enter）
        // 或之后入队（Exit），这样周期帧不会越过对应的模式帧
        let periodic = ctx.is_continuous() && ctx.mode.get(Ordering::Acquire).is_active();

        // 1. 显式请求
        match cmd_rx.try_recv() {
            Ok(request) => {
                let frame = encode_request(&encoder, &mut commanded, &ctx, request);
                if !transmit(&mut tx, frame, &is_running, &metrics) {
                    break;
                }
                continue;
            },
            Err(TryRecvError::Empty) => {},
            Err(TryRecvError::Disconnected) => {
                trace!("TX thread: command channel disconnected");
                break;
            },
        }

        // 2. 周期控制帧
        let now = Instant::now();
        if periodic && now >= next_tick {
            let setpoint = **ctx.setpoint.load();
            let frame = encoder.build_setpoint_frame(&mut commanded, &setpoint);
            ctx.publish_commanded(commanded);
            if !transmit(&mut tx, frame, &is_running, &metrics) {
                break;
            }

            next_tick += interval;
            if next_tick < now {
                // 落后超过一个周期时不补发，从当前时间重新计时
                next_tick = now + interval;
            }
            continue;
        }
        if !periodic {
            next_tick = now;
        }

        // 3. 等待：临近下一个周期时精确休眠，否则短轮询命令队列
        if periodic {
            let remaining = next_tick.saturating_duration_since(now);
            if remaining <= SPIN_THRESHOLD {
                spin_sleep::sleep(remaining);
                continue;
            }
        }
        match cmd_rx.recv_timeout(IDLE_POLL_INTERVAL) {
            Ok(request) => {
                let frame = encode_request(&encoder, &mut commanded, &ctx, request);
                if !transmit(&mut tx, frame, &is_running, &metrics) {
                    break;
                }
            },
            Err(RecvTimeoutError::Timeout) => {},
            Err(RecvTimeoutError::Disconnected) => {
                trace!("TX thread: command channel disconnected");
                break;
            },
        }
    }

    trace!("TX thread: loop exited");
}

/// 将显式请求编码为帧，控制帧同时发布新的 `commanded`
fn encode_request(
    encoder: &CommandEncoder,
    commanded: &mut CommandedState,
    ctx: &MotorContext,
    request: TxRequest,
) -> Ak80Frame {
    match request {
        TxRequest::Mode(command) => encoder.mode_frame(command),
        TxRequest::Control(setpoint) => {
            let frame = encoder.build_setpoint_frame(commanded, &setpoint);
            ctx.publish_commanded(*commanded);
            frame
        },
    }
}

/// 发送一帧，返回 TX 线程是否应继续运行
fn transmit(
    tx: &mut impl TxAdapter,
    frame: Ak80Frame,
    is_running: &AtomicBool,
    metrics: &MotorMetrics,
) -> bool {
    match tx.send(frame) {
        Ok(()) => {
            metrics.tx_frames_total.fetch_add(1, Ordering::Relaxed);
            trace!("TX thread: sent frame ID=0x{:X}", frame.id);
            true
        },
        Err(e) => {
            metrics.tx_errors.fetch_add(1, Ordering::Relaxed);
            if e.is_fatal() {
                error!("TX thread: Fatal error detected, setting is_running = false: {}", e);
                metrics.device_errors.fetch_add(1, Ordering::Relaxed);
                is_running.store(false, Ordering::Release);
                return false;
            }
            warn!("TX thread: Failed to send frame: {}", e);
            true
        },
    }
}

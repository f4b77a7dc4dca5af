//! 持续控制命令
//!
//! 进入 MIT 模式后按固定频率发送同一目标值，Ctrl+C 或到达时长后退出模式。

use super::control::SetpointArgs;
use super::{Pending, REPLY_TIMEOUT, connect, print_measured};
use ak80_driver::{COMMAND_RATE_RANGE, MotorConfig};
use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct RunCommand {
    #[command(flatten)]
    pub setpoint: SetpointArgs,

    /// 控制频率（Hz），默认使用配置文件中的值
    #[arg(long)]
    pub rate: Option<u32>,

    /// 运行时长（秒），不指定则一直运行到 Ctrl+C
    #[arg(long)]
    pub duration: Option<f64>,

    /// 状态打印间隔（毫秒）
    #[arg(long, default_value_t = 200)]
    pub print_interval_ms: u64,
}

impl RunCommand {
    /// 合并频率覆盖项
    pub fn effective_config(&self, config: &MotorConfig) -> Result<MotorConfig> {
        let mut config = config.clone();
        if let Some(rate) = self.rate {
            anyhow::ensure!(
                COMMAND_RATE_RANGE.contains(&rate),
                "--rate 必须在 {}..={} Hz 之间",
                COMMAND_RATE_RANGE.start(),
                COMMAND_RATE_RANGE.end()
            );
            config.command_rate_hz = rate;
        }
        if let Some(duration) = self.duration {
            anyhow::ensure!(duration.is_finite() && duration > 0.0, "--duration 必须为正数");
        }
        Ok(config)
    }

    pub fn execute(&self, config: &MotorConfig) -> Result<()> {
        let config = self.effective_config(config)?;
        let motor = connect(&config)?;

        let running = Arc::new(AtomicBool::new(true));
        {
            let running = running.clone();
            ctrlc::set_handler(move || {
                running.store(false, Ordering::SeqCst);
            })
            .context("注册 Ctrl+C 处理器失败")?;
        }

        let pending = Pending::mark(&motor);
        motor.enter_control_mode()?;
        if pending.wait(&motor, REPLY_TIMEOUT)?.is_none() {
            warn!("No reply to enter-mode command, continuing anyway");
        }

        let setpoint = self.setpoint.setpoint();
        motor.start_continuous(setpoint);
        info!(
            "Running at {} Hz: {:?} (Ctrl+C to stop)",
            config.command_rate_hz,
            setpoint.clamped(motor.limits())
        );

        let deadline = self.duration.map(|secs| Instant::now() + Duration::from_secs_f64(secs));
        let print_interval = Duration::from_millis(self.print_interval_ms.max(1));
        let mut next_print = Instant::now();

        while running.load(Ordering::SeqCst) {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            if !motor.is_healthy() {
                anyhow::bail!("IO 线程已停止");
            }
            if Instant::now() >= next_print {
                let measured = motor.measured();
                if measured.has_feedback() {
                    print_measured(&measured);
                }
                next_print += print_interval;
            }
            thread::sleep(Duration::from_millis(5));
        }

        motor.stop_continuous();
        let pending = Pending::mark(&motor);
        motor.exit_control_mode()?;
        pending.wait(&motor, REPLY_TIMEOUT)?;

        let metrics = motor.metrics();
        println!(
            "✅ stopped: {} frames sent, {} feedback frames decoded, {} dropped",
            metrics.tx_frames_total,
            metrics.rx_feedback_decoded,
            metrics.rx_dropped()
        );
        Ok(())
    }
}

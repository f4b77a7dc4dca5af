//! 状态监控命令
//!
//! 只读取反馈，不发送任何帧。AK80 只在收到指令后回复，
//! 因此只有总线上另有主机在发送指令时才会看到数据；
//! 需要边控制边观察时使用 `run`。

use super::{connect, print_measured};
use ak80_driver::MotorConfig;
use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::info;

/// 被动监听反馈帧（电机只应答指令，本命令自身不发送任何帧）
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 更新频率（Hz）
    #[arg(short, long, default_value_t = 10)]
    pub frequency: u32,

    /// 以 JSON 行输出（状态 + 统计）
    #[arg(long)]
    pub json: bool,
}

impl MonitorCommand {
    pub fn execute(&self, config: &MotorConfig) -> Result<()> {
        anyhow::ensure!(self.frequency > 0, "--frequency 必须大于 0");
        let motor = connect(config)?;

        let running = Arc::new(AtomicBool::new(true));
        {
            let running = running.clone();
            ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
                .context("注册 Ctrl+C 处理器失败")?;
        }

        info!("Listening passively; the motor only replies to commands sent by another host");
        let interval = Duration::from_secs_f64(1.0 / self.frequency as f64);
        let mut last_sequence = 0;

        while running.load(Ordering::SeqCst) && motor.is_healthy() {
            let state = motor.state();
            if self.json {
                let line = serde_json::json!({
                    "state": state,
                    "metrics": motor.metrics(),
                });
                println!("{}", line);
            } else if state.measured.sequence != last_sequence {
                last_sequence = state.measured.sequence;
                print_measured(&state.measured);
            }
            thread::sleep(interval);
        }

        if !motor.is_healthy() {
            anyhow::bail!("IO 线程已停止");
        }
        Ok(())
    }
}

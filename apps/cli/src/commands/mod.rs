//! 命令模块
//!
//! 每个子命令都是一次完整的连接 → 执行 → 断开。

pub mod config;
pub mod control;
pub mod monitor;
pub mod run;

pub use config::ConfigCommand;
pub use control::{ModeAction, SendCommand};
pub use monitor::MonitorCommand;
pub use run::RunCommand;

use ak80_driver::{Motor, MotorBuilder, MotorConfig};
use ak80_protocol::MeasuredState;
use anyhow::{Context, Result};
use std::thread;
use std::time::{Duration, Instant};

/// 等待单帧指令发出及电机应答的时间
pub const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// 按配置连接电机
pub fn connect(config: &MotorConfig) -> Result<Motor> {
    let motor = MotorBuilder::from_config(config)
        .context("配置无效")?
        .build()
        .with_context(|| format!("打开 {} 后端失败 ({})", config.backend, config.interface))?;
    Ok(motor)
}

/// 记录发送前的计数，用于等待本次指令的结果
#[derive(Debug, Clone, Copy)]
pub struct Pending {
    tx_frames: u64,
    sequence: u64,
}

impl Pending {
    pub fn mark(motor: &Motor) -> Self {
        Self {
            tx_frames: motor.metrics().tx_frames_total,
            sequence: motor.measured().sequence,
        }
    }

    /// 等待帧发出；发出后再等待一帧新反馈
    ///
    /// 帧未发出返回错误；电机未应答返回 `Ok(None)`。
    pub fn wait(self, motor: &Motor, timeout: Duration) -> Result<Option<MeasuredState>> {
        let deadline = Instant::now() + timeout;

        while motor.metrics().tx_frames_total == self.tx_frames {
            if !motor.is_healthy() {
                anyhow::bail!("IO 线程已停止，指令未发出");
            }
            if Instant::now() >= deadline {
                anyhow::bail!("指令在 {:?} 内未发出", timeout);
            }
            thread::sleep(Duration::from_millis(1));
        }

        loop {
            let measured = motor.measured();
            if measured.sequence != self.sequence {
                return Ok(Some(measured));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

pub fn print_measured(measured: &MeasuredState) {
    println!(
        "position = {:>8.4} rad   velocity = {:>8.3} rad/s   torque = {:>7.3} N·m",
        measured.position, measured.velocity, measured.torque
    );
}

pub fn report_reply(reply: Option<MeasuredState>) {
    match reply {
        Some(measured) => print_measured(&measured),
        None => println!("(电机未应答)"),
    }
}

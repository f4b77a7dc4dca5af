//! # AK80 CLI
//!
//! CubeMars AK80-64 电机命令行工具（MIT 模式）。
//!
//! ```bash
//! # 写入默认配置（<config_dir>/ak80/config.toml）
//! ak80-cli config init --backend socketcan --interface can0
//!
//! # 单次操作（内部：连接 -> 发送 -> 等待应答 -> 断开）
//! ak80-cli enter
//! ak80-cli send --pos 1.0 --kp 20 --kd 1
//! ak80-cli exit
//!
//! # 10Hz 持续控制 5 秒，结束后自动退出 MIT 模式
//! ak80-cli run --pos 0.5 --kp 20 --kd 1 --duration 5
//!
//! # 无硬件时使用仿真电机
//! ak80-cli --backend sim run --pos 0.5 --kp 20 --duration 1
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

use commands::{ConfigCommand, ModeAction, MonitorCommand, RunCommand, SendCommand};
use config::ConnectionArgs;

/// AK80 CLI - 电机命令行工具
#[derive(Parser, Debug)]
#[command(name = "ak80-cli")]
#[command(about = "Command-line interface for CubeMars AK80-64 motors", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 进入 MIT 控制模式
    Enter,

    /// 退出 MIT 控制模式
    Exit,

    /// 将当前位置设为零点
    Zero,

    /// 发送单帧控制指令
    Send {
        #[command(flatten)]
        args: SendCommand,
    },

    /// 持续控制（Ctrl+C 停止）
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 被动监听电机反馈（不发送指令；电机只应答指令，需另有主机在控制，否则无输出）
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ak80_cli=info".parse()?)
                .add_directive("ak80_driver=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&cli.connection),
        Commands::Enter => ModeAction::Enter.execute(&cli.connection.resolve()?),
        Commands::Exit => ModeAction::Exit.execute(&cli.connection.resolve()?),
        Commands::Zero => ModeAction::Zero.execute(&cli.connection.resolve()?),
        Commands::Send { args } => args.execute(&cli.connection.resolve()?),
        Commands::Run { args } => args.execute(&cli.connection.resolve()?),
        Commands::Monitor { args } => args.execute(&cli.connection.resolve()?),
    }
}

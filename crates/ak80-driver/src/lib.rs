//! # AK80 Driver
//!
//! 单个 AK80 电机的运行时驱动：
//!
//! - IO 线程管理（RX/TX 双线程，`is_running` 生命周期联动）
//! - 状态同步（`ArcSwap` 无锁读取 `commanded` / `measured`）
//! - 控制模式状态机（Idle / ControlActive）
//! - MIT 模式下按固定频率发送控制帧
//!
//! ```no_run
//! use ak80_driver::{MotorBuilder, MotorConfig};
//! use ak80_protocol::MitSetpoint;
//!
//! let config = MotorConfig::default();
//! let motor = MotorBuilder::from_config(&config)?.build()?;
//!
//! motor.enter_control_mode()?;
//! motor.start_continuous(MitSetpoint::new(0.5, 0.0, 20.0, 1.0, 0.0));
//! let measured = motor.wait_for_feedback(std::time::Duration::from_millis(500))?;
//! println!("position = {:.3} rad", measured.position);
//! motor.exit_control_mode()?;
//! # Ok::<(), ak80_driver::DriverError>(())
//! ```

mod builder;
mod config;
mod error;
pub mod metrics;
pub mod mode;
mod motor;
pub mod pipeline;
pub mod state;

pub use builder::MotorBuilder;
pub use config::{COMMAND_RATE_RANGE, DEFAULT_BITRATE, MotorConfig};
pub use error::DriverError;
pub use metrics::{MetricsSnapshot, MotorMetrics};
pub use mode::{AtomicControlMode, ControlMode};
pub use motor::{COMMAND_QUEUE_CAPACITY, Motor};
pub use pipeline::{PipelineConfig, TxRequest, rx_loop, tx_loop};
pub use state::MotorContext;

//! 电机连接配置
//!
//! 可以从 TOML 文件读取，字段缺省时使用默认值：
//!
//! ```toml
//! backend = "slcan"
//! interface = "/dev/ttyACM0"
//! controller_id = 23
//! bitrate = 1000000
//! command_rate_hz = 10
//! receive_timeout_ms = 10
//! ```

use crate::error::DriverError;
use crate::pipeline::PipelineConfig;
use ak80_can::{BackendKind, BackendSelection};
use ak80_protocol::DEFAULT_CONTROLLER_ID;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

/// 周期控制频率的允许范围（Hz）
pub const COMMAND_RATE_RANGE: RangeInclusive<u32> = 1..=100;

/// 默认 CAN 波特率
pub const DEFAULT_BITRATE: u32 = 1_000_000;

/// 电机连接配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// 后端类型
    pub backend: BackendKind,
    /// 接口名（SocketCAN）或串口路径（SLCAN），仿真后端忽略
    pub interface: String,
    /// 电机控制器 ID
    pub controller_id: u8,
    /// CAN 波特率
    pub bitrate: u32,
    /// 周期控制频率（Hz）
    pub command_rate_hz: u32,
    /// CAN 接收超时（毫秒）
    pub receive_timeout_ms: u64,
}

impl Default for MotorConfig {
    fn default() -> Self {
        let selection = BackendSelection::detect();
        Self {
            backend: selection.kind,
            interface: selection.channel,
            controller_id: DEFAULT_CONTROLLER_ID,
            bitrate: DEFAULT_BITRATE,
            command_rate_hz: 10,
            receive_timeout_ms: 10,
        }
    }
}

impl MotorConfig {
    /// 校验配置
    ///
    /// # 错误
    /// - `DriverError::InvalidConfig`: 频率超出范围、波特率或超时为 0、接口名为空
    pub fn validate(&self) -> Result<(), DriverError> {
        if !COMMAND_RATE_RANGE.contains(&self.command_rate_hz) {
            return Err(DriverError::InvalidConfig(format!(
                "command_rate_hz must be within {}..={}, got {}",
                COMMAND_RATE_RANGE.start(),
                COMMAND_RATE_RANGE.end(),
                self.command_rate_hz
            )));
        }
        if self.bitrate == 0 {
            return Err(DriverError::InvalidConfig("bitrate must be non-zero".to_string()));
        }
        if self.receive_timeout_ms == 0 {
            return Err(DriverError::InvalidConfig(
                "receive_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.backend != BackendKind::Simulated && self.interface.trim().is_empty() {
            return Err(DriverError::InvalidConfig(format!(
                "interface must be set for the {} backend",
                self.backend
            )));
        }
        Ok(())
    }

    pub fn selection(&self) -> BackendSelection {
        BackendSelection::new(self.backend, self.interface.clone())
    }

    /// 周期控制帧发送间隔
    pub fn command_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.command_rate_hz.max(1) as f64)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            receive_timeout_ms: self.receive_timeout_ms,
            command_interval: self.command_interval(),
        }
    }
}

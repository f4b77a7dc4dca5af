//! Builder 模式实现
//!
//! 提供链式构造 `Motor` 实例的便捷方式。后端在这里选定一次，之后协议层对此无感知。

use crate::config::{DEFAULT_BITRATE, MotorConfig};
use crate::error::DriverError;
use crate::motor::Motor;
use crate::pipeline::PipelineConfig;
use ak80_can::{BackendKind, BackendSelection, CanAdapter, LoopbackAdapter, SimulatedMotor};
use ak80_protocol::{DEFAULT_CONTROLLER_ID, LimitsTable};
use std::time::Duration;
use tracing::info;

/// Motor Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use ak80_driver::{MotorBuilder, PipelineConfig};
/// use ak80_can::BackendKind;
/// use std::time::Duration;
///
/// // 按操作系统自动选择后端（SLCAN，Windows: COM5，Linux: /dev/ttyACM0）
/// let motor = MotorBuilder::new().build().unwrap();
///
/// // Linux SocketCAN，50Hz 控制
/// let motor = MotorBuilder::new()
///     .backend(BackendKind::SocketCan, "can0")
///     .pipeline_config(PipelineConfig {
///         receive_timeout_ms: 5,
///         command_interval: Duration::from_millis(20),
///     })
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct MotorBuilder {
    /// 后端 + 通道（默认按操作系统探测）
    selection: Option<BackendSelection>,
    /// CAN 波特率（默认 1M）
    bitrate: Option<u32>,
    /// 电机控制器 ID（默认 0x17）
    controller_id: Option<u8>,
    /// 电机参数表（默认 AK80-64）
    limits: LimitsTable,
    /// Pipeline 配置
    pipeline_config: Option<PipelineConfig>,
}

impl MotorBuilder {
    pub fn new() -> Self {
        Self {
            selection: None,
            bitrate: None,
            controller_id: None,
            limits: LimitsTable::AK80_64,
            pipeline_config: None,
        }
    }

    /// 从配置构建（先校验）
    pub fn from_config(config: &MotorConfig) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self::new()
            .backend(config.backend, config.interface.clone())
            .bitrate(config.bitrate)
            .controller_id(config.controller_id)
            .pipeline_config(config.pipeline_config()))
    }

    /// 显式指定后端和通道
    pub fn backend(mut self, kind: BackendKind, channel: impl Into<String>) -> Self {
        self.selection = Some(BackendSelection::new(kind, channel));
        self
    }

    /// 使用内存仿真电机（无需硬件）
    pub fn simulated(self) -> Self {
        self.backend(BackendKind::Simulated, "sim")
    }

    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn controller_id(mut self, controller_id: u8) -> Self {
        self.controller_id = Some(controller_id);
        self
    }

    pub fn limits(mut self, limits: LimitsTable) -> Self {
        self.limits = limits;
        self
    }

    /// 按 `(min, max, bits)` 指定参数表（位置、速度、Kp、Kd、力矩）
    ///
    /// # Errors
    /// - `DriverError::Protocol`: 范围非法或位宽与帧格式不符
    pub fn custom_limits(self, ranges: [(f32, f32, u8); 5]) -> Result<Self, DriverError> {
        let limits = LimitsTable::new(ranges)?;
        Ok(self.limits(limits))
    }

    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = Some(config);
        self
    }

    /// 构建 Motor 实例并启动 IO 线程
    ///
    /// # Errors
    /// - `DriverError::Can`: CAN 设备初始化失败或当前平台不支持该后端
    pub fn build(self) -> Result<Motor, DriverError> {
        let selection = self.selection.clone().unwrap_or_else(BackendSelection::detect);
        info!("Opening {} backend on '{}'", selection.kind, selection.channel);

        match selection.kind {
            BackendKind::SocketCan => self.build_socketcan(&selection.channel),
            BackendKind::Slcan => self.build_slcan(&selection.channel),
            BackendKind::Simulated => self.build_simulated(),
        }
    }

    fn controller_id_or_default(&self) -> u8 {
        self.controller_id.unwrap_or(DEFAULT_CONTROLLER_ID)
    }

    fn receive_timeout(&self) -> Duration {
        let config = self.pipeline_config.clone().unwrap_or_default();
        Duration::from_millis(config.receive_timeout_ms)
    }

    fn start<C>(&self, can: C, selection: BackendSelection) -> Result<Motor, DriverError>
    where
        C: ak80_can::SplittableAdapter + Send + 'static,
        C::RxAdapter: Send + 'static,
        C::TxAdapter: Send + 'static,
    {
        Motor::new_dual_thread(
            can,
            self.limits,
            self.controller_id_or_default(),
            self.pipeline_config.clone(),
        )
        .map(|motor| motor.with_metadata(selection.channel, selection.kind))
        .map_err(DriverError::Can)
    }

    /// 构建 SocketCAN 适配器（Linux only）
    #[cfg(target_os = "linux")]
    fn build_socketcan(&self, interface: &str) -> Result<Motor, DriverError> {
        let mut can = ak80_can::SocketCanAdapter::new(interface)?;
        // SocketCAN 的波特率由 `ip link` 配置，这里只设置读超时
        can.set_read_timeout(self.receive_timeout())?;
        self.start(can, BackendSelection::new(BackendKind::SocketCan, interface))
    }

    #[cfg(not(target_os = "linux"))]
    fn build_socketcan(&self, _interface: &str) -> Result<Motor, DriverError> {
        Err(DriverError::Can(ak80_can::CanError::Device(ak80_can::CanDeviceError::new(
            ak80_can::CanDeviceErrorKind::UnsupportedConfig,
            "SocketCAN is only available on Linux",
        ))))
    }

    /// 构建 SLCAN 串口适配器
    #[cfg(feature = "slcan")]
    fn build_slcan(&self, port: &str) -> Result<Motor, DriverError> {
        let mut can = ak80_can::SlcanAdapter::new(port, self.bitrate.unwrap_or(DEFAULT_BITRATE))?;
        can.set_receive_timeout(self.receive_timeout());
        self.start(can, BackendSelection::new(BackendKind::Slcan, port))
    }

    #[cfg(not(feature = "slcan"))]
    fn build_slcan(&self, _port: &str) -> Result<Motor, DriverError> {
        Err(DriverError::Can(ak80_can::CanError::Device(ak80_can::CanDeviceError::new(
            ak80_can::CanDeviceErrorKind::UnsupportedConfig,
            "SLCAN support is disabled (enable the `slcan` feature)",
        ))))
    }

    /// 构建内存仿真后端
    fn build_simulated(&self) -> Result<Motor, DriverError> {
        let motor = SimulatedMotor::new(self.limits, self.controller_id_or_default());
        let mut can = LoopbackAdapter::with_motor(motor);
        can.set_receive_timeout(self.receive_timeout());
        self.start(can, BackendSelection::new(BackendKind::Simulated, "sim"))
    }
}

impl Default for MotorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::ControlMode;

    #[test]
    fn test_builder_defaults() {
        let builder = MotorBuilder::new();
        assert!(builder.selection.is_none());
        assert_eq!(builder.bitrate, None);
        assert_eq!(builder.controller_id_or_default(), 0x17);
        assert_eq!(builder.receive_timeout(), Duration::from_millis(10));
        assert_eq!(builder.limits, LimitsTable::AK80_64);
    }

    #[test]
    fn test_builder_chain() {
        let builder = MotorBuilder::new()
            .backend(BackendKind::SocketCan, "can1")
            .bitrate(500_000)
            .controller_id(0x20);

        assert_eq!(
            builder.selection,
            Some(BackendSelection::new(BackendKind::SocketCan, "can1"))
        );
        assert_eq!(builder.bitrate, Some(500_000));
        assert_eq!(builder.controller_id, Some(0x20));
    }

    #[test]
    fn test_from_config_rejects_invalid_rate() {
        let config = MotorConfig {
            command_rate_hz: 0,
            ..MotorConfig::default()
        };
        assert!(matches!(
            MotorBuilder::from_config(&config),
            Err(DriverError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_config_applies_fields() {
        let config = MotorConfig {
            backend: BackendKind::Simulated,
            interface: "sim".to_string(),
            controller_id: 0x21,
            bitrate: 500_000,
            command_rate_hz: 50,
            receive_timeout_ms: 3,
        };
        let builder = MotorBuilder::from_config(&config).unwrap();
        assert_eq!(builder.controller_id, Some(0x21));
        assert_eq!(builder.receive_timeout(), Duration::from_millis(3));
        assert_eq!(
            builder.pipeline_config.unwrap().command_interval,
            Duration::from_millis(20)
        );
    }

    #[test]
    fn test_custom_limits() {
        let builder = MotorBuilder::new()
            .custom_limits([
                (-95.5, 95.5, 16),
                (-30.0, 30.0, 12),
                (0.0, 500.0, 12),
                (0.0, 5.0, 12),
                (-18.0, 18.0, 12),
            ])
            .unwrap();
        assert_eq!(builder.limits.velocity().max(), 30.0);

        let result = MotorBuilder::new().custom_limits([
            (-12.5, 12.5, 16),
            (-8.0, 8.0, 16),
            (0.0, 500.0, 12),
            (0.0, 5.0, 12),
            (-144.0, 144.0, 12),
        ]);
        assert!(matches!(
            result,
            Err(DriverError::Protocol(
                ak80_protocol::ProtocolError::InvalidRangeConfiguration { bits: 16, .. }
            ))
        ));
    }

    #[test]
    fn test_build_simulated() {
        let motor = MotorBuilder::new().simulated().controller_id(0x05).build().unwrap();
        assert_eq!(motor.backend(), Some(BackendKind::Simulated));
        assert_eq!(motor.interface(), "sim");
        assert_eq!(motor.controller_id(), 0x05);
        assert_eq!(motor.mode(), ControlMode::Idle);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_build_socketcan_missing_interface_fails() {
        let result = MotorBuilder::new().backend(BackendKind::SocketCan, "ak80-missing0").build();
        assert!(matches!(result, Err(DriverError::Can(_))));
    }
}

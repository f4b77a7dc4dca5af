//! 控制帧构建
//!
//! 包括三条模式指令（进入/退出 MIT 模式、零位设定）和 MIT 控制指令。
//! 所有帧均为标准帧，CAN ID 为电机控制器 ID，数据长度 8 字节。

use crate::codec;
use crate::ids::*;
use crate::limits::LimitsTable;
use crate::state::CommandedState;
use crate::Ak80Frame;

// ============================================================================
// 模式指令
// ============================================================================

/// 模式指令
///
/// 数据为 `FF FF FF FF FF FF FF xx`，末字节区分指令类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCommand {
    /// 进入 MIT 模式（0xFC）
    Enter,
    /// 退出 MIT 模式（0xFD）
    Exit,
    /// 将当前位置设为零点（0xFE）
    Zero,
}

impl ModeCommand {
    /// 末字节
    pub fn sentinel(self) -> u8 {
        match self {
            ModeCommand::Enter => ENTER_MODE_BYTE,
            ModeCommand::Exit => EXIT_MODE_BYTE,
            ModeCommand::Zero => ZERO_POSITION_BYTE,
        }
    }

    /// 完整 8 字节数据
    pub fn payload(self) -> [u8; CONTROL_FRAME_LEN] {
        let mut data = [0xFF; CONTROL_FRAME_LEN];
        data[7] = self.sentinel();
        data
    }

    /// 从数据中识别模式指令
    ///
    /// 不是模式指令时返回 `None`（例如普通 MIT 控制帧）。
    pub fn from_payload(data: &[u8]) -> Option<Self> {
        if data.len() != CONTROL_FRAME_LEN || data[..7] != MODE_COMMAND_PREFIX {
            return None;
        }
        match data[7] {
            ENTER_MODE_BYTE => Some(ModeCommand::Enter),
            EXIT_MODE_BYTE => Some(ModeCommand::Exit),
            ZERO_POSITION_BYTE => Some(ModeCommand::Zero),
            _ => None,
        }
    }
}

// ============================================================================
// MIT 控制指令
// ============================================================================

/// MIT 控制设定值（物理单位）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MitSetpoint {
    /// 目标位置（rad）
    pub position: f32,
    /// 目标速度（rad/s）
    pub velocity: f32,
    /// 位置增益
    pub kp: f32,
    /// 速度增益
    pub kd: f32,
    /// 前馈力矩（N·m）
    pub torque: f32,
}

impl MitSetpoint {
    pub fn new(position: f32, velocity: f32, kp: f32, kd: f32, torque: f32) -> Self {
        Self {
            position,
            velocity,
            kp,
            kd,
            torque,
        }
    }

    /// 按参数表限幅
    pub fn clamped(&self, limits: &LimitsTable) -> Self {
        Self {
            position: limits.position.clamp(self.position),
            velocity: limits.velocity.clamp(self.velocity),
            kp: limits.kp.clamp(self.kp),
            kd: limits.kd.clamp(self.kd),
            torque: limits.torque.clamp(self.torque),
        }
    }
}

impl From<CommandedState> for MitSetpoint {
    fn from(c: CommandedState) -> Self {
        Self::new(c.position, c.velocity, c.kp, c.kd, c.torque)
    }
}

/// MIT 控制帧中的原始编码值
///
/// 位域布局（MSB 在前，无填充）：
/// - Byte 0-1: Position (16 位)
/// - Byte 2: Velocity [bit11~bit4]
/// - Byte 3: Velocity [bit3~bit0] | Kp [bit11~bit8]
/// - Byte 4: Kp [bit7~bit0]
/// - Byte 5: Kd [bit11~bit4]
/// - Byte 6: Kd [bit3~bit0] | Torque [bit11~bit8]
/// - Byte 7: Torque [bit7~bit0]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlCodes {
    pub position: u16,
    pub velocity: u16,
    pub kp: u16,
    pub kd: u16,
    pub torque: u16,
}

impl ControlCodes {
    /// 物理量 → 编码（内部限幅）
    pub fn from_setpoint(setpoint: &MitSetpoint, limits: &LimitsTable) -> Self {
        Self {
            position: codec::encode(setpoint.position, &limits.position),
            velocity: codec::encode(setpoint.velocity, &limits.velocity),
            kp: codec::encode(setpoint.kp, &limits.kp),
            kd: codec::encode(setpoint.kd, &limits.kd),
            torque: codec::encode(setpoint.torque, &limits.torque),
        }
    }

    /// 编码 → 物理量
    pub fn to_setpoint(&self, limits: &LimitsTable) -> MitSetpoint {
        MitSetpoint {
            position: codec::decode(self.position, &limits.position),
            velocity: codec::decode(self.velocity, &limits.velocity),
            kp: codec::decode(self.kp, &limits.kp),
            kd: codec::decode(self.kd, &limits.kd),
            torque: codec::decode(self.torque, &limits.torque),
        }
    }

    /// 打包为 8 字节
    pub fn pack(&self) -> [u8; CONTROL_FRAME_LEN] {
        let p = self.position;
        let v = self.velocity & 0x0FFF;
        let kp = self.kp & 0x0FFF;
        let kd = self.kd & 0x0FFF;
        let t = self.torque & 0x0FFF;

        [
            (p >> 8) as u8,
            (p & 0xFF) as u8,
            (v >> 4) as u8,
            (((v & 0x0F) << 4) | (kp >> 8)) as u8,
            (kp & 0xFF) as u8,
            (kd >> 4) as u8,
            (((kd & 0x0F) << 4) | (t >> 8)) as u8,
            (t & 0xFF) as u8,
        ]
    }

    /// 从 8 字节解包
    pub fn unpack(data: &[u8; CONTROL_FRAME_LEN]) -> Self {
        let b = data.map(u16::from);
        Self {
            position: (b[0] << 8) | b[1],
            velocity: (b[2] << 4) | (b[3] >> 4),
            kp: ((b[3] & 0x0F) << 8) | b[4],
            kd: (b[5] << 4) | (b[6] >> 4),
            torque: ((b[6] & 0x0F) << 8) | b[7],
        }
    }
}

// ============================================================================
// 指令编码器
// ============================================================================

/// 指令编码器
///
/// 无内部状态（只持有参数表和控制器 ID），可在任意线程中复制使用。
///
/// ```rust
/// use ak80_protocol::{CommandEncoder, MotorState};
///
/// let encoder = CommandEncoder::default();
/// let mut state = MotorState::new();
///
/// let enter = encoder.enter_control_mode();
/// assert_eq!(enter.data[7], 0xFC);
///
/// let frame = encoder.build_control_frame(&mut state.commanded, 1.0, 0.0, 50.0, 1.0, 0.0);
/// assert_eq!(frame.len, 8);
/// assert_eq!(state.commanded.kp, 50.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandEncoder {
    limits: LimitsTable,
    controller_id: u8,
}

impl CommandEncoder {
    pub fn new(limits: LimitsTable, controller_id: u8) -> Self {
        Self {
            limits,
            controller_id,
        }
    }

    pub fn limits(&self) -> &LimitsTable {
        &self.limits
    }

    pub fn controller_id(&self) -> u8 {
        self.controller_id
    }

    /// 进入 MIT 模式
    pub fn enter_control_mode(&self) -> Ak80Frame {
        self.mode_frame(ModeCommand::Enter)
    }

    /// 退出 MIT 模式
    pub fn exit_control_mode(&self) -> Ak80Frame {
        self.mode_frame(ModeCommand::Exit)
    }

    /// 将当前位置设为零点（不修改指令值）
    pub fn zero_position(&self) -> Ak80Frame {
        self.mode_frame(ModeCommand::Zero)
    }

    /// 构建模式指令帧
    pub fn mode_frame(&self, command: ModeCommand) -> Ak80Frame {
        Ak80Frame::new_standard(self.controller_id as u16, &command.payload())
    }

    /// 构建 MIT 控制帧
    ///
    /// 各值先按参数表限幅，限幅后的值写回 `commanded`，再编码打包。
    /// 超范围输入不会报错。
    pub fn build_control_frame(
        &self,
        commanded: &mut CommandedState,
        position: f32,
        velocity: f32,
        kp: f32,
        kd: f32,
        torque: f32,
    ) -> Ak80Frame {
        let setpoint = MitSetpoint::new(position, velocity, kp, kd, torque);
        self.build_setpoint_frame(commanded, &setpoint)
    }

    /// 同 [`build_control_frame`](Self::build_control_frame)，参数为 `MitSetpoint`
    pub fn build_setpoint_frame(
        &self,
        commanded: &mut CommandedState,
        setpoint: &MitSetpoint,
    ) -> Ak80Frame {
        let clamped = setpoint.clamped(&self.limits);
        *commanded = CommandedState {
            position: clamped.position,
            velocity: clamped.velocity,
            kp: clamped.kp,
            kd: clamped.kd,
            torque: clamped.torque,
        };

        let codes = ControlCodes::from_setpoint(&clamped, &self.limits);
        Ak80Frame::new_standard(self.controller_id as u16, &codes.pack())
    }
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new(LimitsTable::AK80_64, DEFAULT_CONTROLLER_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MotorState;

    #[test]
    fn test_mode_frames() {
        let encoder = CommandEncoder::default();

        let enter = encoder.enter_control_mode();
        assert_eq!(enter.id, 0x17);
        assert!(!enter.is_extended);
        assert_eq!(enter.data_slice(), &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFC]);

        let exit = encoder.exit_control_mode();
        assert_eq!(exit.data_slice(), &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFD]);

        let zero = encoder.zero_position();
        assert_eq!(zero.data_slice(), &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn test_mode_command_from_payload() {
        for cmd in [ModeCommand::Enter, ModeCommand::Exit, ModeCommand::Zero] {
            assert_eq!(ModeCommand::from_payload(&cmd.payload()), Some(cmd));
        }
        assert_eq!(ModeCommand::from_payload(&[0xFF; 8]), None);
        assert_eq!(ModeCommand::from_payload(&[0xFF, 0xFC]), None);
        assert_eq!(
            ModeCommand::from_payload(&[0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFC]),
            None
        );
    }

    #[test]
    fn test_custom_controller_id() {
        let encoder = CommandEncoder::new(LimitsTable::AK80_64, 0x02);
        assert_eq!(encoder.zero_position().id, 0x02);
        let mut state = MotorState::new();
        let frame = encoder.build_control_frame(&mut state.commanded, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(frame.id, 0x02);
    }

    #[test]
    fn test_zero_frame_does_not_touch_commanded() {
        let encoder = CommandEncoder::default();
        let state = MotorState::new();
        let before = state.commanded;
        let _ = encoder.zero_position();
        assert_eq!(state.commanded, before);
    }

    #[test]
    fn test_build_control_frame_all_zero() {
        let encoder = CommandEncoder::default();
        let limits = encoder.limits();
        let mut state = MotorState::new();

        let frame = encoder.build_control_frame(&mut state.commanded, 0.0, 0.0, 0.0, 0.0, 0.0);

        assert_eq!(
            state.commanded,
            CommandedState {
                position: 0.0,
                velocity: 0.0,
                kp: 0.0,
                kd: 0.0,
                torque: 0.0,
            }
        );

        let codes = ControlCodes::unpack(&frame.data);
        let decoded = codes.to_setpoint(limits);
        assert!(decoded.position.abs() <= limits.position.step());
        assert!(decoded.velocity.abs() <= limits.velocity.step());
        assert!(decoded.kp.abs() <= limits.kp.step());
        assert!(decoded.kd.abs() <= limits.kd.step());
        assert!(decoded.torque.abs() <= limits.torque.step());
    }

    #[test]
    fn test_build_control_frame_byte_layout() {
        let encoder = CommandEncoder::default();
        let mut state = MotorState::new();

        // 全部取最小值 → 全 0；Kp/Kd 下限为 0
        let frame = encoder.build_control_frame(&mut state.commanded, -12.5, -8.0, 0.0, 0.0, -144.0);
        assert_eq!(frame.data, [0u8; 8]);

        // 全部取最大值 → 全 1
        let frame = encoder.build_control_frame(&mut state.commanded, 12.5, 8.0, 500.0, 5.0, 144.0);
        assert_eq!(frame.data, [0xFFu8; 8]);
    }

    #[test]
    fn test_pack_cross_byte_fields() {
        let codes = ControlCodes {
            position: 0x1234,
            velocity: 0xABC,
            kp: 0xDEF,
            kd: 0x123,
            torque: 0x456,
        };
        let data = codes.pack();
        assert_eq!(data, [0x12, 0x34, 0xAB, 0xCD, 0xEF, 0x12, 0x34, 0x56]);
        assert_eq!(ControlCodes::unpack(&data), codes);
    }

    #[test]
    fn test_build_control_frame_clamps_and_reports() {
        let encoder = CommandEncoder::default();
        let mut state = MotorState::new();

        let frame = encoder.build_control_frame(&mut state.commanded, 20.0, -9.0, 600.0, -1.0, 200.0);

        assert_eq!(state.commanded.position, 12.5);
        assert_eq!(state.commanded.velocity, -8.0);
        assert_eq!(state.commanded.kp, 500.0);
        assert_eq!(state.commanded.kd, 0.0);
        assert_eq!(state.commanded.torque, 144.0);

        let codes = ControlCodes::unpack(&frame.data);
        assert_eq!(codes.position, 65535);
        assert_eq!(codes.velocity, 0);
        assert_eq!(codes.kp, 4095);
        assert_eq!(codes.kd, 0);
        assert_eq!(codes.torque, 4095);
    }

    #[test]
    fn test_control_frame_roundtrip_within_step() {
        let encoder = CommandEncoder::default();
        let limits = *encoder.limits();
        let mut state = MotorState::new();
        let setpoint = MitSetpoint::new(1.234, -2.5, 120.0, 1.7, -33.3);

        let frame = encoder.build_setpoint_frame(&mut state.commanded, &setpoint);
        let decoded = ControlCodes::unpack(&frame.data).to_setpoint(&limits);

        assert!((decoded.position - setpoint.position).abs() <= limits.position.step());
        assert!((decoded.velocity - setpoint.velocity).abs() <= limits.velocity.step());
        assert!((decoded.kp - setpoint.kp).abs() <= limits.kp.step());
        assert!((decoded.kd - setpoint.kd).abs() <= limits.kd.step());
        assert!((decoded.torque - setpoint.torque).abs() <= limits.torque.step());
    }

    #[test]
    fn test_custom_table_roundtrips_at_range_edges() {
        let limits = LimitsTable::new([
            (-95.5, 95.5, 16),
            (-30.0, 30.0, 12),
            (0.0, 500.0, 12),
            (0.0, 5.0, 12),
            (-18.0, 18.0, 12),
        ])
        .unwrap();
        let encoder = CommandEncoder::new(limits, 0x17);
        let mut state = MotorState::new();

        for setpoint in [
            MitSetpoint::new(95.5, 30.0, 500.0, 5.0, 18.0),
            MitSetpoint::new(-95.5, -30.0, 0.0, 0.0, -18.0),
        ] {
            let frame = encoder.build_setpoint_frame(&mut state.commanded, &setpoint);
            let decoded = ControlCodes::unpack(&frame.data).to_setpoint(&limits);

            assert!((decoded.position - setpoint.position).abs() <= limits.position().step());
            assert!((decoded.velocity - setpoint.velocity).abs() <= limits.velocity().step());
            assert!((decoded.torque - setpoint.torque).abs() <= limits.torque().step());
        }
    }
}

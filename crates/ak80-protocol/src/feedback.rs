//! 反馈帧解析
//!
//! 电机每收到一帧指令都会回复一帧 6 字节反馈：
//!
//! - Byte 0: 电机 ID
//! - Byte 1-2: Position (16 位)
//! - Byte 3: Velocity [bit11~bit4]
//! - Byte 4: Velocity [bit3~bit0] | Torque [bit11~bit8]
//! - Byte 5: Torque [bit7~bit0]
//!
//! 字段使用与控制帧相同的范围和定点规则解码。
//!
//! ## 帧长
//!
//! 只接受恰好 6 字节的回复，其他长度一律返回 `MalformedFrame`。
//! 较新的 AK 系列固件在 MIT 模式下回复 8 字节（额外携带温度和错误码），
//! 这类固件的回复会被 RX 线程计为 malformed 并丢弃；对接这类电机时需先确认
//! 固件版本，或在驱动外部自行解析原始帧。

use crate::codec;
use crate::ids::*;
use crate::limits::LimitsTable;
use crate::state::MeasuredState;
use crate::{Ak80Frame, ProtocolError};

/// 解析后的反馈数据（物理单位）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorFeedback {
    /// 回复帧中携带的电机 ID
    pub motor_id: u8,
    /// 位置（rad）
    pub position: f32,
    /// 速度（rad/s）
    pub velocity: f32,
    /// 力矩（N·m）
    pub torque: f32,
}

impl MotorFeedback {
    /// 解析反馈数据（纯函数，不修改状态）
    ///
    /// # 错误
    /// - `MalformedFrame`: 长度不是 6 字节
    /// - `UnexpectedSource`: Byte 0 与期望的电机 ID 不一致
    pub fn parse(data: &[u8], expected_id: u8, limits: &LimitsTable) -> Result<Self, ProtocolError> {
        if data.len() != FEEDBACK_FRAME_LEN {
            return Err(ProtocolError::MalformedFrame {
                expected: FEEDBACK_FRAME_LEN,
                actual: data.len(),
            });
        }

        let motor_id = data[0];
        if motor_id != expected_id {
            return Err(ProtocolError::UnexpectedSource {
                expected: expected_id,
                actual: motor_id,
            });
        }

        let b = |i: usize| data[i] as u16;
        let p_int = (b(1) << 8) | b(2);
        let v_int = (b(3) << 4) | (b(4) >> 4);
        let t_int = ((b(4) & 0x0F) << 8) | b(5);

        Ok(Self {
            motor_id,
            position: codec::decode(p_int, &limits.position),
            velocity: codec::decode(v_int, &limits.velocity),
            torque: codec::decode(t_int, &limits.torque),
        })
    }

    /// 构建反馈数据（用于仿真后端和测试）
    pub fn to_payload(&self, limits: &LimitsTable) -> [u8; FEEDBACK_FRAME_LEN] {
        let p = codec::encode(self.position, &limits.position);
        let v = codec::encode(self.velocity, &limits.velocity);
        let t = codec::encode(self.torque, &limits.torque);
        [
            self.motor_id,
            (p >> 8) as u8,
            (p & 0xFF) as u8,
            (v >> 4) as u8,
            (((v & 0x0F) << 4) | (t >> 8)) as u8,
            (t & 0xFF) as u8,
        ]
    }
}

/// 反馈解码器
///
/// 解析成功后写入 `MeasuredState`；任何错误都不会修改状态（保留上一次的有效值）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseDecoder {
    limits: LimitsTable,
    controller_id: u8,
}

impl ResponseDecoder {
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

    /// 解析反馈数据并更新测量值
    pub fn decode_feedback(
        &self,
        payload: &[u8],
        measured: &mut MeasuredState,
    ) -> Result<(), ProtocolError> {
        let feedback = MotorFeedback::parse(payload, self.controller_id, &self.limits)?;
        measured.position = feedback.position;
        measured.velocity = feedback.velocity;
        measured.torque = feedback.torque;
        measured.sequence = measured.sequence.wrapping_add(1);
        Ok(())
    }

    /// 同 [`decode_feedback`](Self::decode_feedback)，额外记录帧时间戳
    pub fn decode_feedback_frame(
        &self,
        frame: &Ak80Frame,
        measured: &mut MeasuredState,
    ) -> Result<(), ProtocolError> {
        self.decode_feedback(frame.data_slice(), measured)?;
        measured.timestamp_us = frame.timestamp_us;
        Ok(())
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new(LimitsTable::AK80_64, DEFAULT_CONTROLLER_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{CommandEncoder, ControlCodes};
    use crate::state::MotorState;

    #[test]
    fn test_decode_feedback_updates_measured() {
        let decoder = ResponseDecoder::default();
        let mut state = MotorState::new();

        // 位置 65535 (12.5)，速度 0 (-8.0)，力矩 4095 (144.0)
        let payload = [0x17, 0xFF, 0xFF, 0x00, 0x0F, 0xFF];
        decoder.decode_feedback(&payload, &mut state.measured).unwrap();

        assert_eq!(state.measured.position, 12.5);
        assert_eq!(state.measured.velocity, -8.0);
        assert_eq!(state.measured.torque, 144.0);
        assert_eq!(state.measured.sequence, 1);
    }

    #[test]
    fn test_wrong_length_keeps_state() {
        let decoder = ResponseDecoder::default();
        let mut state = MotorState::new();
        decoder
            .decode_feedback(&[0x17, 0x80, 0x00, 0x80, 0x08, 0x00], &mut state.measured)
            .unwrap();
        let before = state.measured;

        for len in [0usize, 1, 5, 7, 8] {
            let payload = vec![0x17; len];
            let err = decoder.decode_feedback(&payload, &mut state.measured).unwrap_err();
            assert_eq!(
                err,
                ProtocolError::MalformedFrame {
                    expected: 6,
                    actual: len
                }
            );
            assert_eq!(state.measured, before);
        }
    }

    #[test]
    fn test_unexpected_source_keeps_state() {
        let decoder = ResponseDecoder::default();
        let mut state = MotorState::new();
        let before = state.measured;

        let err = decoder
            .decode_feedback(&[0x02, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], &mut state.measured)
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnexpectedSource {
                expected: 0x17,
                actual: 0x02
            }
        );
        assert_eq!(state.measured, before);
    }

    #[test]
    fn test_decode_feedback_frame_records_timestamp() {
        let decoder = ResponseDecoder::default();
        let mut measured = MeasuredState::default();
        let mut frame = Ak80Frame::new_standard(0x00, &[0x17, 0x80, 0x00, 0x80, 0x08, 0x00]);
        frame.timestamp_us = 123_456;

        decoder.decode_feedback_frame(&frame, &mut measured).unwrap();
        assert_eq!(measured.timestamp_us, 123_456);
    }

    #[test]
    fn test_feedback_payload_roundtrip() {
        let limits = LimitsTable::AK80_64;
        let fb = MotorFeedback {
            motor_id: 0x17,
            position: -3.3,
            velocity: 4.2,
            torque: 17.5,
        };
        let parsed = MotorFeedback::parse(&fb.to_payload(&limits), 0x17, &limits).unwrap();
        assert!((parsed.position - fb.position).abs() <= limits.position.step());
        assert!((parsed.velocity - fb.velocity).abs() <= limits.velocity.step());
        assert!((parsed.torque - fb.torque).abs() <= limits.torque.step());
    }

    #[test]
    fn test_control_codes_reinterpreted_as_feedback() {
        // 控制帧中位置/速度/力矩的编码按反馈布局重新打包，解码结果应与原始值一致
        let encoder = CommandEncoder::default();
        let decoder = ResponseDecoder::default();
        let limits = *encoder.limits();
        let mut state = MotorState::new();

        let frame = encoder.build_control_frame(&mut state.commanded, 2.5, -1.25, 10.0, 0.8, 40.0);
        let codes = ControlCodes::unpack(&frame.data);
        let payload = [
            0x17,
            (codes.position >> 8) as u8,
            (codes.position & 0xFF) as u8,
            (codes.velocity >> 4) as u8,
            (((codes.velocity & 0x0F) << 4) | (codes.torque >> 8)) as u8,
            (codes.torque & 0xFF) as u8,
        ];

        decoder.decode_feedback(&payload, &mut state.measured).unwrap();
        assert!((state.measured.position - 2.5).abs() <= limits.position.step());
        assert!((state.measured.velocity + 1.25).abs() <= limits.velocity.step());
        assert!((state.measured.torque - 40.0).abs() <= limits.torque.step());
    }
}

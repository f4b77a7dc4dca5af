//! CAN ID 与固定帧常量定义

/// 默认电机控制器 ID（AK80-64 出厂配置为 0x17）
pub const DEFAULT_CONTROLLER_ID: u8 = 0x17;

/// 控制帧数据长度（字节）
pub const CONTROL_FRAME_LEN: usize = 8;

/// 控制帧各字段位宽（位置、速度、Kp、Kd、力矩），合计 64 位
///
/// 反馈帧沿用其中的位置 / 速度 / 力矩位宽。
pub const CONTROL_FIELD_BITS: [u8; 5] = [16, 12, 12, 12, 12];

/// 反馈帧数据长度（字节）
///
/// Byte 0: 电机 ID，Byte 1-5: 位置 (16 位) / 速度 (12 位) / 力矩 (12 位)
pub const FEEDBACK_FRAME_LEN: usize = 6;

/// 模式指令前缀（前 7 字节固定为 0xFF）
pub const MODE_COMMAND_PREFIX: [u8; 7] = [0xFF; 7];

/// 进入 MIT 模式指令的末字节
pub const ENTER_MODE_BYTE: u8 = 0xFC;

/// 退出 MIT 模式指令的末字节
pub const EXIT_MODE_BYTE: u8 = 0xFD;

/// 零位设定指令的末字节
pub const ZERO_POSITION_BYTE: u8 = 0xFE;

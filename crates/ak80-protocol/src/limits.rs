//! 物理量范围定义（Limits Table）
//!
//! 每个物理量在总线上都以固定位宽的无符号整数传输，
//! `QuantityRange` 描述 `[min, max]` 与位宽之间的映射关系。
//!
//! ## AK80-64 参数表
//!
//! | 物理量 | 最小值 | 最大值 | 位宽 |
//! |---|---|---|---|
//! | 位置 (rad) | -12.5 | 12.5 | 16 |
//! | 速度 (rad/s) | -8.0 | 8.0 | 12 |
//! | Kp (N·m/rad) | 0.0 | 500.0 | 12 |
//! | Kd (N·m·s/rad) | 0.0 | 5.0 | 12 |
//! | 力矩 (N·m) | -144.0 | 144.0 | 12 |

use crate::ProtocolError;
use crate::ids::CONTROL_FIELD_BITS;

/// 单个字段允许的最大位宽（编码结果存储为 u16）
pub const MAX_FIELD_BITS: u8 = 16;

/// 物理量种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Quantity {
    Position,
    Velocity,
    Kp,
    Kd,
    Torque,
}

impl Quantity {
    /// 所有物理量（按控制帧中的字段顺序）
    pub const ALL: [Quantity; 5] = [
        Quantity::Position,
        Quantity::Velocity,
        Quantity::Kp,
        Quantity::Kd,
        Quantity::Torque,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Quantity::Position => "position",
            Quantity::Velocity => "velocity",
            Quantity::Kp => "kp",
            Quantity::Kd => "kd",
            Quantity::Torque => "torque",
        }
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 物理量范围 `(min, max, bits)`
///
/// 只能通过 [`QuantityRange::new`] 构造（会校验 `min < max` 和位宽），
/// 因此编码器拿到的范围一定是合法的，不需要在热路径上再做检查。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct QuantityRange {
    min: f32,
    max: f32,
    bits: u8,
}

impl QuantityRange {
    /// 创建并校验范围
    ///
    /// # 错误
    /// - `ProtocolError::InvalidRangeConfiguration`: `min >= max`、边界非有限值，
    ///   或位宽不在 `1..=16` 内
    pub fn new(quantity: Quantity, min: f32, max: f32, bits: u8) -> Result<Self, ProtocolError> {
        let valid = min.is_finite()
            && max.is_finite()
            && min < max
            && (1..=MAX_FIELD_BITS).contains(&bits);
        if !valid {
            return Err(ProtocolError::InvalidRangeConfiguration {
                quantity,
                min,
                max,
                bits,
            });
        }
        Ok(Self { min, max, bits })
    }

    /// 编译期常量构造（不校验，仅用于内置参数表）
    const fn new_unchecked(min: f32, max: f32, bits: u8) -> Self {
        Self { min, max, bits }
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// 字段最大编码值 `2^bits - 1`
    pub fn max_code(&self) -> u16 {
        ((1u32 << self.bits) - 1) as u16
    }

    /// 量化步长 `(max - min) / (2^bits - 1)`
    pub fn step(&self) -> f32 {
        (self.max - self.min) / self.max_code() as f32
    }

    /// 将数值限制到 `[min, max]`
    ///
    /// NaN 被视为 `min`，与电机固件的饱和行为一致（不拒绝指令）。
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }
}

/// 电机参数表（5 个物理量的范围）
///
/// 位宽必须与帧格式 [`CONTROL_FIELD_BITS`] 一致，只能通过
/// [`LimitsTable::new`] 或内置常量构造。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LimitsTable {
    pub(crate) position: QuantityRange,
    pub(crate) velocity: QuantityRange,
    pub(crate) kp: QuantityRange,
    pub(crate) kd: QuantityRange,
    pub(crate) torque: QuantityRange,
}

impl LimitsTable {
    /// CubeMars AK80-64 官方参数（固定值，不要更改）
    pub const AK80_64: LimitsTable = LimitsTable {
        position: QuantityRange::new_unchecked(-12.5, 12.5, 16),
        velocity: QuantityRange::new_unchecked(-8.0, 8.0, 12),
        kp: QuantityRange::new_unchecked(0.0, 500.0, 12),
        kd: QuantityRange::new_unchecked(0.0, 5.0, 12),
        torque: QuantityRange::new_unchecked(-144.0, 144.0, 12),
    };

    /// 由 `(min, max, bits)` 元组构造参数表，任一范围非法即返回错误
    ///
    /// 参数顺序与控制帧字段顺序一致：位置、速度、Kp、Kd、力矩。
    /// 位宽与 [`CONTROL_FIELD_BITS`] 不符同样返回 `InvalidRangeConfiguration`，
    /// 帧格式是固定的，只有 `[min, max]` 可以按型号调整。
    pub fn new(ranges: [(f32, f32, u8); 5]) -> Result<Self, ProtocolError> {
        let mut checked = [QuantityRange::new_unchecked(0.0, 1.0, 1); 5];
        for (i, quantity) in Quantity::ALL.into_iter().enumerate() {
            let (min, max, bits) = ranges[i];
            let range = QuantityRange::new(quantity, min, max, bits)?;
            if bits != CONTROL_FIELD_BITS[i] {
                return Err(ProtocolError::InvalidRangeConfiguration {
                    quantity,
                    min,
                    max,
                    bits,
                });
            }
            checked[i] = range;
        }

        let [position, velocity, kp, kd, torque] = checked;
        Ok(Self {
            position,
            velocity,
            kp,
            kd,
            torque,
        })
    }

    pub fn position(&self) -> &QuantityRange {
        &self.position
    }

    pub fn velocity(&self) -> &QuantityRange {
        &self.velocity
    }

    pub fn kp(&self) -> &QuantityRange {
        &self.kp
    }

    pub fn kd(&self) -> &QuantityRange {
        &self.kd
    }

    pub fn torque(&self) -> &QuantityRange {
        &self.torque
    }

    /// 按物理量查询范围
    pub fn range(&self, quantity: Quantity) -> &QuantityRange {
        match quantity {
            Quantity::Position => &self.position,
            Quantity::Velocity => &self.velocity,
            Quantity::Kp => &self.kp,
            Quantity::Kd => &self.kd,
            Quantity::Torque => &self.torque,
        }
    }
}

impl Default for LimitsTable {
    fn default() -> Self {
        Self::AK80_64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_valid() {
        // 内置表绕过了校验，这里重新走一遍构造函数
        for quantity in Quantity::ALL {
            let r = LimitsTable::AK80_64.range(quantity);
            let checked = QuantityRange::new(quantity, r.min(), r.max(), r.bits()).unwrap();
            assert_eq!(&checked, r);
        }
    }

    #[test]
    fn test_ak80_64_values() {
        let t = LimitsTable::AK80_64;
        assert_eq!((t.position.min(), t.position.max(), t.position.bits()), (-12.5, 12.5, 16));
        assert_eq!((t.velocity.min(), t.velocity.max(), t.velocity.bits()), (-8.0, 8.0, 12));
        assert_eq!((t.kp.min(), t.kp.max(), t.kp.bits()), (0.0, 500.0, 12));
        assert_eq!((t.kd.min(), t.kd.max(), t.kd.bits()), (0.0, 5.0, 12));
        assert_eq!((t.torque.min(), t.torque.max(), t.torque.bits()), (-144.0, 144.0, 12));
    }

    #[test]
    fn test_invalid_range_rejected() {
        let err = QuantityRange::new(Quantity::Kp, 5.0, 5.0, 12).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidRangeConfiguration {
                quantity: Quantity::Kp,
                ..
            }
        ));

        assert!(QuantityRange::new(Quantity::Kd, 1.0, -1.0, 12).is_err());
        assert!(QuantityRange::new(Quantity::Torque, f32::NEG_INFINITY, 1.0, 12).is_err());
        assert!(QuantityRange::new(Quantity::Position, -1.0, 1.0, 0).is_err());
        assert!(QuantityRange::new(Quantity::Position, -1.0, 1.0, 17).is_err());
    }

    #[test]
    fn test_table_new_reports_first_broken_range() {
        let err = LimitsTable::new([
            (-12.5, 12.5, 16),
            (-8.0, 8.0, 12),
            (0.0, 500.0, 12),
            (5.0, 0.0, 12),
            (-144.0, 144.0, 12),
        ])
        .unwrap_err();
        match err {
            ProtocolError::InvalidRangeConfiguration { quantity, .. } => {
                assert_eq!(quantity, Quantity::Kd)
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builtin_table_matches_frame_layout() {
        for (quantity, bits) in Quantity::ALL.into_iter().zip(CONTROL_FIELD_BITS) {
            assert_eq!(LimitsTable::AK80_64.range(quantity).bits(), bits);
        }
        assert_eq!(CONTROL_FIELD_BITS.iter().map(|&b| b as usize).sum::<usize>(), 64);
    }

    #[test]
    fn test_table_new_rejects_widths_off_the_frame_layout() {
        // 16 位速度放不进 12 位字段
        let err = LimitsTable::new([
            (-12.5, 12.5, 16),
            (-8.0, 8.0, 16),
            (0.0, 500.0, 12),
            (0.0, 5.0, 12),
            (-144.0, 144.0, 12),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidRangeConfiguration {
                quantity: Quantity::Velocity,
                bits: 16,
                ..
            }
        ));

        // 12 位位置同样拒绝
        assert!(
            LimitsTable::new([
                (-12.5, 12.5, 12),
                (-8.0, 8.0, 12),
                (0.0, 500.0, 12),
                (0.0, 5.0, 12),
                (-144.0, 144.0, 12),
            ])
            .is_err()
        );
    }

    #[test]
    fn test_table_new_accepts_custom_bounds() {
        let table = LimitsTable::new([
            (-95.5, 95.5, 16),
            (-30.0, 30.0, 12),
            (0.0, 500.0, 12),
            (0.0, 5.0, 12),
            (-18.0, 18.0, 12),
        ])
        .unwrap();
        assert_eq!(table.velocity().max(), 30.0);
        assert_eq!(table.position().bits(), 16);
    }

    #[test]
    fn test_step_and_max_code() {
        let p = LimitsTable::AK80_64.position;
        assert_eq!(p.max_code(), 65535);
        assert!((p.step() - 25.0 / 65535.0).abs() < 1e-9);

        let v = LimitsTable::AK80_64.velocity;
        assert_eq!(v.max_code(), 4095);
    }

    #[test]
    fn test_clamp() {
        let t = LimitsTable::AK80_64.torque;
        assert_eq!(t.clamp(200.0), 144.0);
        assert_eq!(t.clamp(-200.0), -144.0);
        assert_eq!(t.clamp(12.0), 12.0);
        assert_eq!(t.clamp(f32::NAN), -144.0);
        assert_eq!(t.clamp(f32::INFINITY), 144.0);
    }
}

//! 定点编解码（Fixed-Point Codec）
//!
//! 物理量与 N 位无符号整数之间的仿射映射：
//!
//! - 编码：`code = round((clamp(x) - min) / (max - min) * (2^bits - 1))`
//! - 解码：`x = min + code / (2^bits - 1) * (max - min)`
//!
//! 取整规则为 **四舍五入（round-half-up）**，实现为 `floor(v + 0.5)`。
//! 例如位置范围 `[-12.5, 12.5]`、16 位时，`0.0` 编码为 `32768`。
//!
//! 中间计算使用 f64，避免 16 位字段在 f32 下损失精度。

use crate::limits::QuantityRange;

/// 物理量 → 定点编码
///
/// 超出范围的输入会被静默限幅（固件同样是饱和而非拒绝），
/// 因此结果一定落在 `[0, 2^bits - 1]` 内。
pub fn encode(value: f32, range: &QuantityRange) -> u16 {
    let clamped = range.clamp(value) as f64;
    let min = range.min() as f64;
    let span = range.max() as f64 - min;
    let max_code = range.max_code();

    let scaled = (clamped - min) / span * max_code as f64;
    let code = (scaled + 0.5).floor();
    // 限幅后 scaled ∈ [0, max_code]，这里的 min 只是防止浮点误差
    (code as u32).min(max_code as u32) as u16
}

/// 定点编码 → 物理量
///
/// 超出位宽的高位会被忽略（线上格式保证字段只有 `bits` 位）。
pub fn decode(code: u16, range: &QuantityRange) -> f32 {
    let max_code = range.max_code();
    let code = code & max_code;
    let min = range.min() as f64;
    let span = range.max() as f64 - min;
    (min + code as f64 / max_code as f64 * span) as f32
}

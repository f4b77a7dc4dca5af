//! SLCAN（Serial Line CAN）适配器实现
//!
//! 适用于 CANable 等 USB 串口 CAN 适配器，使用 Lawicel ASCII 协议：
//!
//! | 指令 | 含义 |
//! |---|---|
//! | `C\r` | 关闭通道 |
//! | `Sn\r` | 设置波特率（`S8` = 1 Mbit/s） |
//! | `O\r` | 打开通道 |
//! | `tIIILDD..\r` | 标准帧（3 位 ID，1 位长度，数据十六进制） |
//! | `TIIIIIIIILDD..\r` | 扩展帧（8 位 ID） |
//!
//! 适配器对发送成功回复 `z\r` / `Z\r`，出错回复 `\x07`（BEL），接收时均被忽略。

use crate::{
    Ak80Frame, CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, RxAdapter,
    SplittableAdapter, TxAdapter,
};
use serialport::SerialPort;
use std::io::Read;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// 串口波特率（USB CDC 设备实际忽略该值）
const SERIAL_BAUD_RATE: u32 = 115_200;

/// 行缓冲区上限，超出说明串口数据异常
const MAX_LINE_LEN: usize = 64;

/// CAN 波特率 → `Sn` 指令编号
pub fn bitrate_code(bitrate: u32) -> Option<u8> {
    match bitrate {
        10_000 => Some(0),
        20_000 => Some(1),
        50_000 => Some(2),
        100_000 => Some(3),
        125_000 => Some(4),
        250_000 => Some(5),
        500_000 => Some(6),
        800_000 => Some(7),
        1_000_000 => Some(8),
        _ => None,
    }
}

/// 将帧编码为 SLCAN 发送指令（含结尾 `\r`）
pub fn encode_frame(frame: &Ak80Frame) -> String {
    let data = frame.data_slice();
    let mut line = if frame.is_extended {
        format!("T{:08X}{:X}", frame.id & 0x1FFF_FFFF, data.len())
    } else {
        format!("t{:03X}{:X}", frame.id & 0x7FF, data.len())
    };
    for byte in data {
        line.push_str(&format!("{:02X}", byte));
    }
    line.push('\r');
    line
}

/// 解析一行 SLCAN 数据（不含 `\r`）
///
/// 非数据帧的行（发送确认、远程帧、状态回复）返回 `None`。
pub fn parse_line(line: &[u8]) -> Option<Ak80Frame> {
    let (&kind, rest) = line.split_first()?;
    let id_len = match kind {
        b't' => 3,
        b'T' => 8,
        _ => return None,
    };

    let text = std::str::from_utf8(rest).ok()?;
    if text.len() < id_len + 1 {
        return None;
    }
    let id = u32::from_str_radix(text.get(..id_len)?, 16).ok()?;
    let len = usize::from_str_radix(text.get(id_len..id_len + 1)?, 16).ok()?;
    if len > 8 {
        return None;
    }

    let hex = text.get(id_len + 1..)?;
    // 部分固件会在数据后附加 4 位时间戳，这里只取需要的部分
    if hex.len() < len * 2 {
        return None;
    }
    let mut data = [0u8; 8];
    for (i, byte) in data.iter_mut().take(len).enumerate() {
        *byte = u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok()?;
    }

    Some(if kind == b'T' {
        Ak80Frame::new_extended(id, &data[..len])
    } else {
        Ak80Frame::new_standard(id as u16, &data[..len])
    })
}

fn serial_error(e: serialport::Error) -> CanError {
    let kind = match e.kind() {
        serialport::ErrorKind::NoDevice => CanDeviceErrorKind::NoDevice,
        serialport::ErrorKind::InvalidInput => CanDeviceErrorKind::UnsupportedConfig,
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => CanDeviceErrorKind::NotFound,
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            CanDeviceErrorKind::AccessDenied
        }
        _ => CanDeviceErrorKind::Backend,
    };
    CanError::Device(CanDeviceError::new(kind, e.to_string()))
}

fn write_command(port: &mut dyn SerialPort, command: &str) -> Result<(), CanError> {
    port.write_all(command.as_bytes())?;
    port.flush()?;
    Ok(())
}

/// 串口行读取器（RX 半边）
struct LineReader {
    port: Box<dyn SerialPort>,
    buf: Vec<u8>,
    timeout: Duration,
}

impl LineReader {
    fn read_frame(&mut self) -> Result<Ak80Frame, CanError> {
        let deadline = Instant::now() + self.timeout;
        let mut chunk = [0u8; 64];

        loop {
            while let Some(pos) = self.buf.iter().position(|&b| b == b'\r' || b == 0x07) {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                let line = &line[..line.len() - 1];
                if line.is_empty() {
                    continue;
                }
                match parse_line(line) {
                    Some(frame) => {
                        trace!(
                            "Received SLCAN frame: ID=0x{:X}, len={}",
                            frame.id, frame.len
                        );
                        return Ok(frame);
                    }
                    None => trace!("Ignoring SLCAN line: {:?}", String::from_utf8_lossy(line)),
                }
            }

            if self.buf.len() > MAX_LINE_LEN {
                warn!(
                    "SLCAN line buffer overflow, discarding {} bytes",
                    self.buf.len()
                );
                self.buf.clear();
            }

            if Instant::now() >= deadline {
                return Err(CanError::Timeout);
            }

            match self.port.read(&mut chunk) {
                Ok(0) => return Err(CanError::Timeout),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(CanError::Timeout);
                }
                Err(e) => return Err(CanError::Io(e)),
            }
        }
    }
}

/// SLCAN 适配器
///
/// ```no_run
/// use ak80_can::{SlcanAdapter, CanAdapter, Ak80Frame};
///
/// let mut adapter = SlcanAdapter::new("/dev/ttyACM0", 1_000_000).unwrap();
/// adapter.send(Ak80Frame::new_standard(0x17, &[0xFF; 8])).unwrap();
/// ```
pub struct SlcanAdapter {
    reader: LineReader,
    /// 串口路径（如 "/dev/ttyACM0" 或 "COM5"）
    port_name: String,
    /// split 之后由 TX 半边负责关闭通道
    close_on_drop: bool,
}

impl SlcanAdapter {
    /// 打开串口并启动 CAN 通道
    ///
    /// # 错误
    /// - `CanError::Device(UnsupportedConfig)`: 不支持的 CAN 波特率
    /// - `CanError::Device`: 串口打开失败
    pub fn new(port_name: impl Into<String>, bitrate: u32) -> Result<Self, CanError> {
        let port_name = port_name.into();
        let code = bitrate_code(bitrate).ok_or_else(|| {
            CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::UnsupportedConfig,
                format!("Unsupported SLCAN bitrate: {}", bitrate),
            ))
        })?;

        let timeout = Duration::from_millis(10);
        let mut port = serialport::new(&port_name, SERIAL_BAUD_RATE)
            .timeout(timeout)
            .open()
            .map_err(serial_error)?;

        // 先关闭（忽略上次未正常关闭的通道），再设置波特率并打开
        write_command(port.as_mut(), "C\r")?;
        write_command(port.as_mut(), &format!("S{}\r", code))?;
        write_command(port.as_mut(), "O\r")?;

        trace!(
            "SLCAN channel opened on '{}' at {} bit/s",
            port_name, bitrate
        );

        Ok(Self {
            reader: LineReader {
                port,
                buf: Vec::with_capacity(MAX_LINE_LEN),
                timeout,
            },
            port_name,
            close_on_drop: true,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl CanAdapter for SlcanAdapter {
    fn send(&mut self, frame: Ak80Frame) -> Result<(), CanError> {
        write_command(self.reader.port.as_mut(), &encode_frame(&frame))?;
        trace!("Sent SLCAN frame: ID=0x{:X}, len={}", frame.id, frame.len);
        Ok(())
    }

    fn receive(&mut self) -> Result<Ak80Frame, CanError> {
        self.reader.read_frame()
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        match self.reader.port.set_timeout(timeout) {
            Ok(()) => self.reader.timeout = timeout,
            Err(e) => warn!("Failed to set SLCAN receive timeout: {}", e),
        }
    }
}

impl Drop for SlcanAdapter {
    fn drop(&mut self) {
        if !self.close_on_drop {
            return;
        }
        if let Err(e) = write_command(self.reader.port.as_mut(), "C\r") {
            warn!(
                "Failed to close SLCAN channel on '{}': {}",
                self.port_name, e
            );
        }
    }
}

/// 只读适配器（RX 线程）
pub struct SlcanRxAdapter {
    reader: LineReader,
}

impl RxAdapter for SlcanRxAdapter {
    fn receive(&mut self) -> Result<Ak80Frame, CanError> {
        self.reader.read_frame()
    }
}

/// 只写适配器（TX 线程）
///
/// Drop 时关闭 CAN 通道。
pub struct SlcanTxAdapter {
    port: Box<dyn SerialPort>,
}

impl TxAdapter for SlcanTxAdapter {
    fn send(&mut self, frame: Ak80Frame) -> Result<(), CanError> {
        write_command(self.port.as_mut(), &encode_frame(&frame))
    }
}

impl Drop for SlcanTxAdapter {
    fn drop(&mut self) {
        let _ = write_command(self.port.as_mut(), "C\r");
    }
}

impl SplittableAdapter for SlcanAdapter {
    type RxAdapter = SlcanRxAdapter;
    type TxAdapter = SlcanTxAdapter;

    fn split(mut self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError> {
        let rx_port = self.reader.port.try_clone().map_err(serial_error)?;
        let tx_port = self.reader.port.try_clone().map_err(serial_error)?;
        self.close_on_drop = false;

        trace!(
            "SlcanAdapter split into RX and TX adapters (port: {})",
            self.port_name
        );

        let reader = LineReader {
            port: rx_port,
            buf: std::mem::take(&mut self.reader.buf),
            timeout: self.reader.timeout,
        };
        Ok((SlcanRxAdapter { reader }, SlcanTxAdapter { port: tx_port }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_code() {
        assert_eq!(bitrate_code(1_000_000), Some(8));
        assert_eq!(bitrate_code(500_000), Some(6));
        assert_eq!(bitrate_code(125_000), Some(4));
        assert_eq!(bitrate_code(333_333), None);
    }

    #[test]
    fn test_encode_standard_frame() {
        let frame =
            Ak80Frame::new_standard(0x17, &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFC]);
        assert_eq!(encode_frame(&frame), "t0178FFFFFFFFFFFFFFFC\r");
    }

    #[test]
    fn test_encode_extended_frame() {
        let frame = Ak80Frame::new_extended(0x1234_5678, &[0x01, 0x02]);
        assert_eq!(encode_frame(&frame), "T1234567820102\r");
    }

    #[test]
    fn test_parse_feedback_line() {
        let frame = parse_line(b"t0006178000800800").unwrap();
        assert_eq!(frame.id, 0x000);
        assert!(!frame.is_extended);
        assert_eq!(frame.data_slice(), &[0x17, 0x80, 0x00, 0x80, 0x08, 0x00]);
    }

    #[test]
    fn test_parse_line_with_timestamp_suffix() {
        let frame = parse_line(b"t0172ABCD1A2B").unwrap();
        assert_eq!(frame.data_slice(), &[0xAB, 0xCD]);
    }

    #[test]
    fn test_parse_extended_line() {
        let frame = parse_line(b"T1234567810A").unwrap();
        assert!(frame.is_extended);
        assert_eq!(frame.id, 0x1234_5678);
        assert_eq!(frame.data_slice(), &[0x0A]);
    }

    #[test]
    fn test_parse_ignores_non_data_lines() {
        assert!(parse_line(b"z").is_none());
        assert!(parse_line(b"Z").is_none());
        assert!(parse_line(b"r0170").is_none());
        assert!(parse_line(b"").is_none());
        assert!(parse_line(b"t01").is_none());
        assert!(parse_line(b"t0179").is_none()); // 长度 > 8
        assert!(parse_line(b"t0172AB").is_none()); // 数据不足
        assert!(parse_line(b"tXYZ0").is_none());
    }

    #[test]
    fn test_encode_parse_consistency() {
        let frame = Ak80Frame::new_standard(0x17, &[0x12, 0x34, 0x56]);
        let line = encode_frame(&frame);
        let parsed = parse_line(line.trim_end_matches('\r').as_bytes()).unwrap();
        assert_eq!(parsed, frame);
    }
}

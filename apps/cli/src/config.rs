//! 连接配置
//!
//! 配置来源按优先级从低到高：默认值 → `<config_dir>/ak80/config.toml` → 命令行参数。

use ak80_can::BackendKind;
use ak80_driver::MotorConfig;
use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};

/// 默认配置文件路径
pub fn default_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("ak80");
    path.push("config.toml");
    Ok(path)
}

/// 读取配置文件，文件不存在时返回默认配置
pub fn load_file(path: &Path) -> Result<MotorConfig> {
    if !path.exists() {
        return Ok(MotorConfig::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
}

/// 写入配置文件（自动创建目录）
pub fn save_file(path: &Path, config: &MotorConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("创建配置目录失败")?;
    }
    let content = toml::to_string_pretty(config).context("序列化配置失败")?;
    fs::write(path, content).with_context(|| format!("写入配置文件失败: {}", path.display()))
}

/// 全局连接参数（覆盖配置文件）
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// 配置文件路径（默认 <config_dir>/ak80/config.toml）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 后端：socketcan / slcan / sim
    #[arg(short, long, global = true)]
    pub backend: Option<BackendKind>,

    /// 接口名（can0）或串口路径（/dev/ttyACM0, COM5）
    #[arg(short, long, global = true)]
    pub interface: Option<String>,

    /// 电机控制器 ID（如 0x17 或 23）
    #[arg(long, global = true, value_parser = parse_controller_id)]
    pub controller_id: Option<u8>,

    /// CAN 波特率
    #[arg(long, global = true)]
    pub bitrate: Option<u32>,
}

impl ConnectionArgs {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => default_config_path(),
        }
    }

    /// 加载配置文件并应用命令行覆盖项
    pub fn resolve(&self) -> Result<MotorConfig> {
        let path = self.config_path()?;
        let config = load_file(&path)?;
        Ok(self.apply(config))
    }

    pub fn apply(&self, mut config: MotorConfig) -> MotorConfig {
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(ref interface) = self.interface {
            config.interface = interface.clone();
        }
        if let Some(controller_id) = self.controller_id {
            config.controller_id = controller_id;
        }
        if let Some(bitrate) = self.bitrate {
            config.bitrate = bitrate;
        }
        config
    }
}

/// 解析十进制或 0x 前缀的十六进制 ID
pub fn parse_controller_id(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid controller id '{}': {}", s, e))
}

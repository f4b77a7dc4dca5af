//! 配置管理命令

use crate::config::{ConnectionArgs, load_file, save_file};
use ak80_driver::MotorConfig;
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示生效的配置（文件 + 命令行覆盖）
    Show,

    /// 显示配置文件路径
    Path,

    /// 写入默认配置（已存在时需要 --force）
    Init {
        #[arg(long)]
        force: bool,
    },

    /// 把命令行连接参数写入配置文件
    Set {
        /// 周期控制频率（Hz）
        #[arg(long)]
        rate: Option<u32>,

        /// 接收超时（毫秒）
        #[arg(long)]
        receive_timeout_ms: Option<u64>,
    },
}

impl ConfigCommand {
    pub fn execute(self, args: &ConnectionArgs) -> Result<()> {
        let path = args.config_path()?;

        match self {
            ConfigCommand::Show => {
                let config = args.resolve()?;
                println!("# {}", path.display());
                print!("{}", toml::to_string_pretty(&config)?);
                if let Err(e) = config.validate() {
                    println!("# ⚠️ {}", e);
                }
            },

            ConfigCommand::Path => println!("{}", path.display()),

            ConfigCommand::Init { force } => {
                if path.exists() && !force {
                    anyhow::bail!("{} 已存在（使用 --force 覆盖）", path.display());
                }
                save_file(&path, &args.apply(MotorConfig::default()))?;
                println!("✅ 已写入 {}", path.display());
            },

            ConfigCommand::Set {
                rate,
                receive_timeout_ms,
            } => {
                let mut config = args.apply(load_file(&path)?);
                if let Some(rate) = rate {
                    config.command_rate_hz = rate;
                }
                if let Some(timeout) = receive_timeout_ms {
                    config.receive_timeout_ms = timeout;
                }
                config.validate()?;
                save_file(&path, &config)?;
                println!("✅ 已更新 {}", path.display());
            },
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ak80_can::BackendKind;

    fn args_with(path: std::path::PathBuf) -> ConnectionArgs {
        ConnectionArgs {
            config: Some(path),
            ..ConnectionArgs::default()
        }
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let args = args_with(path.clone());

        ConfigCommand::Init { force: false }.execute(&args).unwrap();
        assert!(path.exists());
        assert!(ConfigCommand::Init { force: false }.execute(&args).is_err());
        ConfigCommand::Init { force: true }.execute(&args).unwrap();
    }

    #[test]
    fn test_set_persists_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let args = ConnectionArgs {
            backend: Some(BackendKind::Simulated),
            controller_id: Some(0x30),
            ..args_with(path.clone())
        };

        ConfigCommand::Set {
            rate: Some(25),
            receive_timeout_ms: None,
        }
        .execute(&args)
        .unwrap();

        let saved = load_file(&path).unwrap();
        assert_eq!(saved.backend, BackendKind::Simulated);
        assert_eq!(saved.controller_id, 0x30);
        assert_eq!(saved.command_rate_hz, 25);
    }

    #[test]
    fn test_set_rejects_invalid_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let result = ConfigCommand::Set {
            rate: Some(500),
            receive_timeout_ms: None,
        }
        .execute(&args_with(path.clone()));
        assert!(result.is_err());
        assert!(!path.exists());
    }
}

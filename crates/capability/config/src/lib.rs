//! 应用运行配置加载（YAML）。

use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::path::Path;

/// 配置文件路径环境变量；未设置时使用默认文件名。
pub const CONFIG_PATH_ENV: &str = "MBUS_EXPORTER_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "mbus-exporter.yml";

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read config file {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("invalid config file {0}: {1}")]
    Parse(String, #[source] serde_yaml::Error),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// M-Bus 串口与记录筛选配置。
#[derive(Debug, Clone, Deserialize)]
pub struct MbusConfig {
    /// 串口设备路径（如 /dev/ttyUSB0）。
    pub device: String,
    /// 表计主站地址。
    pub meter_id: u32,
    /// 串口波特率。
    pub baud_rate: u32,
    /// 允许导出的记录 id 白名单。
    #[serde(default)]
    pub record_ids: BTreeSet<u32>,
    /// 单位文本命中任一关键字时按 Gauge 分类（大小写不敏感）。
    #[serde(default)]
    pub gauges: Vec<String>,
    /// 外部采集命令，默认 mbus-serial-request-data。
    #[serde(default = "default_command")]
    pub command: String,
}

/// 导出端点配置。
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// 所有指标附带的静态 location 标签。
    pub location: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_address")]
    pub address: String,
}

/// 应用运行配置。
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub mbus: MbusConfig,
    pub exporter: ExporterConfig,
}

impl AppConfig {
    /// 从 `MBUS_EXPORTER_CONFIG` 指向的 YAML 文件读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load(path)
    }

    /// 从 YAML 文件读取并校验配置。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let content =
            std::fs::read_to_string(path).map_err(|err| ConfigError::Io(shown.clone(), err))?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|err| ConfigError::Parse(shown, err))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置取值。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mbus.device.is_empty() {
            return Err(ConfigError::Invalid("mbus.device", "must not be empty".into()));
        }
        if self.mbus.baud_rate == 0 {
            return Err(ConfigError::Invalid("mbus.baud_rate", "must be > 0".into()));
        }
        if self.mbus.command.is_empty() {
            return Err(ConfigError::Invalid("mbus.command", "must not be empty".into()));
        }
        if self.exporter.location.is_empty() {
            return Err(ConfigError::Invalid(
                "exporter.location",
                "must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_command() -> String {
    "mbus-serial-request-data".to_string()
}

fn default_port() -> u16 {
    9502
}

fn default_address() -> String {
    "::".to_string()
}

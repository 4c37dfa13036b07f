use async_trait::async_trait;
use domain::{AcquireStatus, RawTelegram};
use tokio::process::Command;
use tracing::debug;

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("failed to invoke {0}: {1}")]
    Invoke(String, #[source] std::io::Error),
}

/// 电报采集源抽象。
#[async_trait]
pub trait TelegramSource: Send + Sync {
    async fn fetch(&self) -> Result<RawTelegram, AcquireError>;
}

/// 占位源（用于接线与测试），始终返回空的成功电报。
#[derive(Debug, Default)]
pub struct NoopSource;

#[async_trait]
impl TelegramSource for NoopSource {
    async fn fetch(&self) -> Result<RawTelegram, AcquireError> {
        Ok(RawTelegram {
            payload: Vec::new(),
            status: AcquireStatus::Success,
        })
    }
}

/// 串口请求命令配置。
#[derive(Debug, Clone)]
pub struct SerialRequestConfig {
    /// 外部命令名，默认 mbus-serial-request-data。
    pub command: String,
    pub baud_rate: u32,
    pub device: String,
    pub meter_address: u32,
}

/// 通过外部串口命令采集电报。
///
/// 以参数列表直接调用（不经过 shell），参数顺序与上游命令约定一致：
/// `-b {baud_rate} {device} {meter_address}`。
#[derive(Debug, Clone)]
pub struct SerialRequestCommand {
    config: SerialRequestConfig,
}

impl SerialRequestCommand {
    pub fn new(config: SerialRequestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SerialRequestConfig {
        &self.config
    }
}

#[async_trait]
impl TelegramSource for SerialRequestCommand {
    async fn fetch(&self) -> Result<RawTelegram, AcquireError> {
        let output = Command::new(&self.config.command)
            .arg("-b")
            .arg(self.config.baud_rate.to_string())
            .arg(&self.config.device)
            .arg(self.config.meter_address.to_string())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| AcquireError::Invoke(self.config.command.clone(), err))?;

        let status = if output.status.success() {
            AcquireStatus::Success
        } else {
            AcquireStatus::Failed(output.status.code())
        };
        debug!(
            target: "mbus.acquire",
            device = %self.config.device,
            meter_address = self.config.meter_address,
            payload_size = output.stdout.len(),
            status = ?status,
            "telegram_fetched"
        );

        // 失败状态也保留 stdout，部分载荷仍可作为格式错误兜底暴露
        Ok(RawTelegram {
            payload: output.stdout,
            status,
        })
    }
}

//! 电报解析与记录规范化：XML -> MeterRecord -> ScaledSample。

mod classify;
mod parse;

pub use classify::classify;
pub use parse::parse_telegram;

/// 规范化错误。
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("invalid telegram: {0}")]
    Parse(String),
    #[error("invalid record value: {0}")]
    Value(String),
}

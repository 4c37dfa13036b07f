pub mod data;

pub use data::{AcquireStatus, MeterRecord, MetricKind, RawTelegram, ScaledSample};

/// 可导出的记录 Function 值，其余一律丢弃。
pub const INSTANTANEOUS_FUNCTION: &str = "Instantaneous value";

//! 追踪、请求 ID 与导出器内部计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 导出器内部指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub acquire_success: u64,
    pub acquire_failure: u64,
    pub telegrams_published: u64,
    pub parse_failures: u64,
    pub records_dropped: u64,
    pub scrapes: u64,
    pub samples_exported: u64,
    pub signals_emitted: u64,
}

/// 导出器内部指标。
pub struct TelemetryMetrics {
    acquire_success: AtomicU64,
    acquire_failure: AtomicU64,
    telegrams_published: AtomicU64,
    parse_failures: AtomicU64,
    records_dropped: AtomicU64,
    scrapes: AtomicU64,
    samples_exported: AtomicU64,
    signals_emitted: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            acquire_success: AtomicU64::new(0),
            acquire_failure: AtomicU64::new(0),
            telegrams_published: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            scrapes: AtomicU64::new(0),
            samples_exported: AtomicU64::new(0),
            signals_emitted: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            acquire_success: self.acquire_success.load(Ordering::Relaxed),
            acquire_failure: self.acquire_failure.load(Ordering::Relaxed),
            telegrams_published: self.telegrams_published.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            scrapes: self.scrapes.load(Ordering::Relaxed),
            samples_exported: self.samples_exported.load(Ordering::Relaxed),
            signals_emitted: self.signals_emitted.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录采集成功次数。
pub fn record_acquire_success() {
    metrics().acquire_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录采集失败次数（非零退出或调用异常）。
pub fn record_acquire_failure() {
    metrics().acquire_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录电报入队次数。
pub fn record_telegram_published() {
    metrics()
        .telegrams_published
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录电报解析失败次数（抓取落入兜底指标族）。
pub fn record_parse_failure() {
    metrics().parse_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录分类阶段丢弃的记录数（数值无法解析等）。
pub fn record_record_dropped() {
    metrics().records_dropped.fetch_add(1, Ordering::Relaxed);
}

/// 记录 /metrics 抓取次数。
pub fn record_scrape() {
    metrics().scrapes.fetch_add(1, Ordering::Relaxed);
}

/// 记录导出样本次数。
pub fn record_sample_exported() {
    metrics().samples_exported.fetch_add(1, Ordering::Relaxed);
}

/// 记录活动信号回馈次数。
pub fn record_signal_emitted() {
    metrics().signals_emitted.fetch_add(1, Ordering::Relaxed);
}

//! 抓取侧适配：每次抓取取最新电报，分类为 Prometheus 指标族。

use domain::{MetricKind, RawTelegram, ScaledSample};
use mbus_normalize::{classify, parse_telegram};
use mbus_pipeline::LatestWins;
use mbus_telemetry::{
    record_parse_failure, record_record_dropped, record_sample_exported, record_scrape,
    record_signal_emitted,
};
use prometheus::core::Collector as _;
use prometheus::proto::{MetricFamily, MetricType};
use prometheus::{Counter, CounterVec, Encoder, GaugeVec, Opts, TextEncoder};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// 解析失败时的兜底指标族。
const FALLBACK_SERIES: &str = "kamstrup_energy_kwh";
const FALLBACK_HELP: &str = "Energy in kWh";

/// 表计指标收集器。
///
/// 每次抓取：取队列最新电报（无新电报时复用上次载荷，初始为空视为
/// 非法 XML）、解析、按白名单过滤、逐条分类，并把功率/流量样本的
/// 换算值作为活动信号回馈给采集循环。跨抓取仅保留上次载荷。
pub struct MeterCollector {
    telegrams: Arc<LatestWins<RawTelegram>>,
    signals: mpsc::UnboundedSender<f64>,
    record_ids: BTreeSet<u32>,
    gauges: Vec<String>,
    location: String,
    last_payload: Mutex<Vec<u8>>,
}

impl MeterCollector {
    pub fn new(
        telegrams: Arc<LatestWins<RawTelegram>>,
        signals: mpsc::UnboundedSender<f64>,
        record_ids: BTreeSet<u32>,
        gauges: Vec<String>,
        location: String,
    ) -> Self {
        Self {
            telegrams,
            signals,
            record_ids,
            gauges,
            location,
            last_payload: Mutex::new(Vec::new()),
        }
    }

    /// 抓取回调：构造本次抓取的全部指标族。可重入，无跨抓取状态。
    pub fn collect(&self) -> Vec<MetricFamily> {
        record_scrape();
        let payload = self.latest_payload();
        let mut families = Vec::new();

        match parse_telegram(&payload) {
            Ok(records) => {
                for record in records.iter().filter(|r| self.record_ids.contains(&r.id)) {
                    match classify(record, &self.gauges) {
                        Ok(Some(sample)) => {
                            if sample.is_activity() && self.signals.send(sample.value).is_ok() {
                                record_signal_emitted();
                            }
                            match self.sample_family(&sample) {
                                Ok(sample_families) => {
                                    record_sample_exported();
                                    debug!(
                                        target: "mbus.export",
                                        series = %sample.name,
                                        value = sample.value,
                                        "sample_exported"
                                    );
                                    families.extend(sample_families);
                                }
                                Err(err) => {
                                    record_record_dropped();
                                    warn!(
                                        target: "mbus.export",
                                        record_id = record.id,
                                        series = %sample.name,
                                        error = %err,
                                        "family_build_failed"
                                    );
                                }
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            record_record_dropped();
                            warn!(
                                target: "mbus.export",
                                record_id = record.id,
                                error = %err,
                                "record_skipped"
                            );
                        }
                    }
                }
            }
            Err(err) => {
                record_parse_failure();
                debug!(target: "mbus.export", error = %err, "telegram_unparseable");
                families.extend(fallback_family());
            }
        }

        families.extend(internal_families());
        families
    }

    /// 取最新电报载荷；队列为空时复用上次载荷。
    fn latest_payload(&self) -> Vec<u8> {
        let mut last = self
            .last_payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(telegram) = self.telegrams.pop_latest() {
            *last = telegram.payload;
        }
        last.clone()
    }

    fn sample_family(&self, sample: &ScaledSample) -> Result<Vec<MetricFamily>, prometheus::Error> {
        let opts = Opts::new(sample.name.clone(), sample.help.clone());
        match sample.kind {
            MetricKind::Gauge => {
                let (names, values): (Vec<&str>, Vec<&str>) = match &sample.type_label {
                    Some(type_label) => (
                        vec!["type", "location"],
                        vec![type_label.as_str(), self.location.as_str()],
                    ),
                    None => (vec!["location"], vec![self.location.as_str()]),
                };
                let family = GaugeVec::new(opts, &names)?;
                family.with_label_values(&values).set(sample.value);
                Ok(family.collect())
            }
            MetricKind::Counter => {
                let family = CounterVec::new(opts, &["location"])?;
                family
                    .with_label_values(&[self.location.as_str()])
                    .inc_by(sample.value.max(0.0));
                let mut families = family.collect();
                // 负值照实透传：inc_by 在 debug 下拒绝负数，直接改写 proto 值
                if sample.value < 0.0 {
                    for family in &mut families {
                        for metric in family.mut_metric().iter_mut() {
                            metric.mut_counter().set_value(sample.value);
                        }
                    }
                }
                Ok(families)
            }
        }
    }
}

/// 解析失败兜底：仅注册、不带样本的 Counter 族。
fn fallback_family() -> Vec<MetricFamily> {
    match CounterVec::new(Opts::new(FALLBACK_SERIES, FALLBACK_HELP), &["location"]) {
        Ok(family) => family.collect(),
        Err(err) => {
            warn!(target: "mbus.export", error = %err, "fallback_family_failed");
            Vec::new()
        }
    }
}

/// 导出器自监控指标族（mbus_exporter_*）。
fn internal_families() -> Vec<MetricFamily> {
    let snapshot = mbus_telemetry::metrics().snapshot();
    let mut families = Vec::new();

    if let Ok(family) = CounterVec::new(
        Opts::new(
            "mbus_exporter_acquisitions_total",
            "Telegram acquisitions by status",
        ),
        &["status"],
    ) {
        family
            .with_label_values(&["success"])
            .inc_by(snapshot.acquire_success as f64);
        family
            .with_label_values(&["failure"])
            .inc_by(snapshot.acquire_failure as f64);
        families.extend(family.collect());
    }

    let counters = [
        (
            "mbus_exporter_telegrams_published_total",
            "Telegrams pushed onto the latest-wins queue",
            snapshot.telegrams_published,
        ),
        (
            "mbus_exporter_parse_failures_total",
            "Scrapes that fell back to the empty energy family",
            snapshot.parse_failures,
        ),
        (
            "mbus_exporter_records_dropped_total",
            "Records skipped during classification",
            snapshot.records_dropped,
        ),
        (
            "mbus_exporter_scrapes_total",
            "Metrics scrapes served",
            snapshot.scrapes,
        ),
        (
            "mbus_exporter_samples_total",
            "Meter samples exported",
            snapshot.samples_exported,
        ),
        (
            "mbus_exporter_signals_total",
            "Activity signals fed back to the poll scheduler",
            snapshot.signals_emitted,
        ),
    ];
    for (name, help, value) in counters {
        if let Ok(counter) = Counter::new(name, help) {
            counter.inc_by(value as f64);
            families.extend(counter.collect());
        }
    }
    families
}

/// 按 Prometheus 文本格式编码指标族。
///
/// TextEncoder 拒绝不带样本的指标族，兜底族这类"仅注册"的族
/// 单独补写 HELP/TYPE 头。
pub fn encode_families(families: &[MetricFamily]) -> Result<String, prometheus::Error> {
    let (populated, empty): (Vec<MetricFamily>, Vec<MetricFamily>) = families
        .iter()
        .cloned()
        .partition(|family| !family.get_metric().is_empty());

    let mut buf = Vec::new();
    TextEncoder::new().encode(&populated, &mut buf)?;
    let mut body =
        String::from_utf8(buf).map_err(|err| prometheus::Error::Msg(err.to_string()))?;
    for family in empty {
        body.push_str(&format!(
            "# HELP {name} {help}\n# TYPE {name} {kind}\n",
            name = family.get_name(),
            help = family.get_help(),
            kind = type_name(family.get_field_type()),
        ));
    }
    Ok(body)
}

fn type_name(kind: MetricType) -> &'static str {
    match kind {
        MetricType::COUNTER => "counter",
        MetricType::GAUGE => "gauge",
        MetricType::SUMMARY => "summary",
        MetricType::HISTOGRAM => "histogram",
        MetricType::UNTYPED => "untyped",
    }
}

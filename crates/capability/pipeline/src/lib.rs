use domain::RawTelegram;
use mbus_acquire::TelegramSource;
use mbus_telemetry::{record_acquire_failure, record_acquire_success, record_telegram_published};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Latest-wins 信箱：push 永远成功并覆盖旧值，pop 取走最新值。
///
/// 单生产者/单消费者，两侧都不阻塞。抓取是拉式的，只需反映
/// 当前状态，过期积压直接丢弃。
#[derive(Debug)]
pub struct LatestWins<T> {
    slot: Mutex<Option<T>>,
}

impl<T> LatestWins<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn push(&self, item: T) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(item);
    }

    /// 取走最新条目；之后队列为空。
    pub fn pop_latest(&self) -> Option<T> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.take()
    }
}

impl<T> Default for LatestWins<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// 自适应轮询调度：表计活动越新，轮询越密。
///
/// 采集失败按"近期活动"的紧迫度处理（尽快重试），但不计为活动信号。
#[derive(Debug)]
pub struct PollScheduler {
    last_positive_signal: Instant,
}

impl PollScheduler {
    pub fn new(now: Instant) -> Self {
        Self {
            last_positive_signal: now,
        }
    }

    /// 记录一次活动信号；整数截断后为正才算有效活动。
    pub fn observe(&mut self, value: f64, now: Instant) {
        if value as i64 > 0 {
            self.last_positive_signal = now;
        }
    }

    /// 距上次有效活动的时长映射为下一次轮询延迟。
    pub fn next_delay(&self, acquisition_failed: bool, now: Instant) -> Duration {
        if acquisition_failed {
            return Duration::from_secs(10);
        }
        let elapsed = now.saturating_duration_since(self.last_positive_signal);
        let secs = match elapsed.as_secs() {
            0..60 => 10,
            60..300 => 60,
            300..600 => 120,
            600..3600 => 300,
            3600..86400 => 900,
            _ => 3600,
        };
        Duration::from_secs(secs)
    }
}

/// 采集循环任务。
///
/// `Acquire -> Drain-Signals -> Sleep` 循环，停机标志只在每轮
/// 循环顶部检查（协作式取消，睡满当轮延迟后才观察到停机）。
pub struct CollectorTask {
    source: Arc<dyn TelegramSource>,
    telegrams: Arc<LatestWins<RawTelegram>>,
    signals: mpsc::UnboundedReceiver<f64>,
    shutdown: watch::Receiver<bool>,
}

impl CollectorTask {
    pub fn new(
        source: Arc<dyn TelegramSource>,
        telegrams: Arc<LatestWins<RawTelegram>>,
        signals: mpsc::UnboundedReceiver<f64>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            telegrams,
            signals,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut scheduler = PollScheduler::new(Instant::now());
        info!(target: "mbus.collect", "collector_started");
        loop {
            if *self.shutdown.borrow() {
                info!(target: "mbus.collect", "collector_stopped");
                return;
            }

            let failed = match self.source.fetch().await {
                Ok(telegram) => {
                    let failed = !telegram.status.is_success();
                    if failed {
                        record_acquire_failure();
                        warn!(
                            target: "mbus.collect",
                            status = ?telegram.status,
                            payload_size = telegram.payload.len(),
                            "acquire_failed_status"
                        );
                    } else {
                        record_acquire_success();
                        debug!(
                            target: "mbus.collect",
                            payload_size = telegram.payload.len(),
                            "telegram_acquired"
                        );
                    }
                    // 失败状态的部分载荷同样入队，由导出侧兜底
                    self.telegrams.push(telegram);
                    record_telegram_published();
                    failed
                }
                Err(err) => {
                    record_acquire_failure();
                    warn!(target: "mbus.collect", error = %err, "acquire_invoke_failed");
                    true
                }
            };

            let now = Instant::now();
            while let Ok(value) = self.signals.try_recv() {
                scheduler.observe(value, now);
            }

            let delay = scheduler.next_delay(failed, now);
            debug!(
                target: "mbus.collect",
                delay_secs = delay.as_secs(),
                failed,
                "next_poll_scheduled"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::AcquireStatus;
    use mbus_acquire::AcquireError;

    #[test]
    fn latest_wins_returns_newest_and_drains() {
        let queue = LatestWins::new();
        queue.push("a");
        queue.push("b");
        queue.push("c");
        assert_eq!(queue.pop_latest(), Some("c"));
        assert_eq!(queue.pop_latest(), None);
    }

    #[test]
    fn latest_wins_empty_is_none() {
        let queue: LatestWins<u8> = LatestWins::new();
        assert_eq!(queue.pop_latest(), None);
    }

    #[test]
    fn scheduler_polls_tight_after_recent_activity() {
        let start = Instant::now();
        let scheduler = PollScheduler::new(start);
        let now = start + Duration::from_secs(45);
        assert_eq!(scheduler.next_delay(false, now), Duration::from_secs(10));
    }

    #[test]
    fn scheduler_backoff_table() {
        let start = Instant::now();
        let scheduler = PollScheduler::new(start);
        let cases = [
            (59, 10),
            (60, 60),
            (299, 60),
            (300, 120),
            (599, 120),
            (600, 300),
            (3599, 300),
            (3600, 900),
            (86399, 900),
            (86400, 3600),
            (90000, 3600),
        ];
        for (elapsed, delay) in cases {
            let now = start + Duration::from_secs(elapsed);
            assert_eq!(
                scheduler.next_delay(false, now),
                Duration::from_secs(delay),
                "elapsed {elapsed}s"
            );
        }
    }

    #[test]
    fn scheduler_retries_soon_after_failure() {
        let start = Instant::now();
        let scheduler = PollScheduler::new(start);
        let now = start + Duration::from_secs(90_000);
        assert_eq!(scheduler.next_delay(true, now), Duration::from_secs(10));
    }

    #[test]
    fn scheduler_positive_signal_resets_elapsed() {
        let start = Instant::now();
        let mut scheduler = PollScheduler::new(start);
        let later = start + Duration::from_secs(90_000);
        scheduler.observe(3.0, later);
        assert_eq!(scheduler.next_delay(false, later), Duration::from_secs(10));
    }

    #[test]
    fn scheduler_ignores_sub_integer_signal() {
        let start = Instant::now();
        let mut scheduler = PollScheduler::new(start);
        let later = start + Duration::from_secs(90_000);
        // 0.4 截断为 0，不算活动
        scheduler.observe(0.4, later);
        assert_eq!(scheduler.next_delay(false, later), Duration::from_secs(3600));
    }

    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        payload: &'static [u8],
    }

    #[async_trait]
    impl TelegramSource for FixedSource {
        async fn fetch(&self) -> Result<RawTelegram, AcquireError> {
            Ok(RawTelegram {
                payload: self.payload.to_vec(),
                status: AcquireStatus::Success,
            })
        }
    }

    struct FailedStatusSource;

    #[async_trait]
    impl TelegramSource for FailedStatusSource {
        async fn fetch(&self) -> Result<RawTelegram, AcquireError> {
            Ok(RawTelegram {
                payload: b"partial telegram".to_vec(),
                status: AcquireStatus::Failed(Some(1)),
            })
        }
    }

    struct InvokeErrorSource {
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TelegramSource for InvokeErrorSource {
        async fn fetch(&self) -> Result<RawTelegram, AcquireError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Err(AcquireError::Invoke(
                "mbus-serial-request-data".to_string(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing binary"),
            ))
        }
    }

    struct CountingSource {
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TelegramSource for CountingSource {
        async fn fetch(&self) -> Result<RawTelegram, AcquireError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(RawTelegram {
                payload: b"<MBusData></MBusData>".to_vec(),
                status: AcquireStatus::Success,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn collector_publishes_and_stops_on_shutdown() {
        let telegrams = Arc::new(LatestWins::new());
        let (_signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = CollectorTask::new(
            Arc::new(FixedSource {
                payload: b"<MBusData></MBusData>",
            }),
            telegrams.clone(),
            signal_rx,
            shutdown_rx,
        );
        let handle = tokio::spawn(task.run());

        // 第一轮采集后电报应已入队
        tokio::time::sleep(Duration::from_secs(1)).await;
        let telegram = telegrams.pop_latest().expect("telegram");
        assert_eq!(telegram.payload, b"<MBusData></MBusData>");

        shutdown_tx.send(true).expect("shutdown");
        tokio::time::sleep(Duration::from_secs(11)).await;
        handle.await.expect("collector task");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_still_publishes_partial_payload() {
        let telegrams = Arc::new(LatestWins::new());
        let (_signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = CollectorTask::new(
            Arc::new(FailedStatusSource),
            telegrams.clone(),
            signal_rx,
            shutdown_rx,
        );
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let telegram = telegrams.pop_latest().expect("telegram");
        assert_eq!(telegram.payload, b"partial telegram");
        assert_eq!(telegram.status, AcquireStatus::Failed(Some(1)));

        shutdown_tx.send(true).expect("shutdown");
        tokio::time::sleep(Duration::from_secs(11)).await;
        handle.await.expect("collector task");
    }

    #[tokio::test(start_paused = true)]
    async fn invoke_error_publishes_nothing_and_retries_soon() {
        let telegrams: Arc<LatestWins<RawTelegram>> = Arc::new(LatestWins::new());
        let fetches = Arc::new(AtomicUsize::new(0));
        let (_signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = CollectorTask::new(
            Arc::new(InvokeErrorSource {
                fetches: fetches.clone(),
            }),
            telegrams.clone(),
            signal_rx,
            shutdown_rx,
        );
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(telegrams.pop_latest().is_none());
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        // 失败后按 10s 重试
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(telegrams.pop_latest().is_none());
        assert_eq!(fetches.load(Ordering::SeqCst), 2);

        shutdown_tx.send(true).expect("shutdown");
        tokio::time::sleep(Duration::from_secs(11)).await;
        handle.await.expect("collector task");
    }

    #[tokio::test(start_paused = true)]
    async fn positive_signals_keep_poll_tight() {
        let telegrams = Arc::new(LatestWins::new());
        let fetches = Arc::new(AtomicUsize::new(0));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = CollectorTask::new(
            Arc::new(CountingSource {
                fetches: fetches.clone(),
            }),
            telegrams,
            signal_rx,
            shutdown_rx,
        );
        let handle = tokio::spawn(task.run());

        // 每轮都有正信号，越过 60s 边界后仍保持 10s 轮询
        for _ in 0..12 {
            signal_tx.send(5.0).expect("signal");
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        assert!(fetches.load(Ordering::SeqCst) >= 12);

        shutdown_tx.send(true).expect("shutdown");
        tokio::time::sleep(Duration::from_secs(11)).await;
        handle.await.expect("collector task");
    }

    #[tokio::test(start_paused = true)]
    async fn poll_backs_off_without_signals() {
        let telegrams = Arc::new(LatestWins::new());
        let fetches = Arc::new(AtomicUsize::new(0));
        let (_signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = CollectorTask::new(
            Arc::new(CountingSource {
                fetches: fetches.clone(),
            }),
            telegrams,
            signal_rx,
            shutdown_rx,
        );
        let handle = tokio::spawn(task.run());

        // 无信号时 60s 后退到 60s 档：130s 内最多 0..=60s 的 7 次 + 120s 的 1 次
        tokio::time::sleep(Duration::from_secs(130)).await;
        let count = fetches.load(Ordering::SeqCst);
        assert!((7..=9).contains(&count), "unexpected fetch count {count}");

        shutdown_tx.send(true).expect("shutdown");
        tokio::time::sleep(Duration::from_secs(61)).await;
        handle.await.expect("collector task");
    }
}

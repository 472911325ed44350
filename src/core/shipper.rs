//! Log shipper: queues, flush scheduler, and the drain pipeline
//!
//! Producers push records into two bounded severity queues without ever
//! blocking. A background task wakes every `batch_interval`, drains both
//! queues completely and runs each record through
//! dedup → format → rate limiter → delivery, downgrading anything that cannot
//! be delivered to the fallback sink. `stop` interrupts the sleep, lets an
//! in-flight drain finish, then performs one last full drain.

use super::{
    config::ShipperConfig,
    dedup::Deduplicator,
    delivery::{endpoint_label, Deliverer, DeliveryOutcome, RetryPolicy},
    error::{Result, ShipperError},
    formatter::{BatchFormatter, Payload},
    log_item::LogItem,
    log_level::{LogLevel, SeverityClass},
    metrics::ShipperMetrics,
    queue::{Enqueued, SeverityQueue},
    rate_limiter::RateLimiter,
    sink::{DurableSink, FallbackTag},
    transport::WebhookTransport,
};
use crate::appenders::{FileSink, HttpTransport};
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after each individually sent critical payload
pub const CRITICAL_SEND_PAUSE: Duration = Duration::from_millis(100);

/// Pause between chunks of one batch
pub const CHUNK_SEND_PAUSE: Duration = Duration::from_millis(200);

/// Back-off after a drain cycle faulted
pub const FAULT_BACKOFF: Duration = Duration::from_secs(1);

/// What one drain pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Records taken out of the queues
    pub drained: usize,
    /// Records dropped as duplicates
    pub suppressed: usize,
    /// Payloads the endpoint accepted
    pub delivered: usize,
    /// Payloads or records written to the fallback sink
    pub fallback: usize,
    /// Fallback writes that failed
    pub sink_failures: usize,
    /// Classes whose flush panicked; their unsettled records went to the sink
    pub faults: usize,
}

impl DrainReport {
    fn merge(&mut self, other: DrainReport) {
        self.drained += other.drained;
        self.suppressed += other.suppressed;
        self.delivered += other.delivered;
        self.fallback += other.fallback;
        self.sink_failures += other.sink_failures;
        self.faults += other.faults;
    }

    pub fn is_empty(&self) -> bool {
        self.drained == 0
    }
}

/// Flush scheduler lifecycle
///
/// `Stopped → Idle ⇄ Draining`, and on shutdown `Stopping → Stopped` once the
/// final drain has run. There is no separate drained or terminal state: a
/// scheduler that finished its final drain reports `Stopped`, and `start` may
/// leave it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    /// Not started, or stopped after the final drain
    Stopped = 0,
    /// Sleeping until the next drain cycle
    Idle = 1,
    /// Emptying the queues and delivering
    Draining = 2,
    /// Cancelled; waiting for the in-flight cycle and the final drain
    Stopping = 3,
}

impl SchedulerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SchedulerState::Idle,
            2 => SchedulerState::Draining,
            3 => SchedulerState::Stopping,
            _ => SchedulerState::Stopped,
        }
    }
}

struct Shared<T> {
    config: ShipperConfig,
    state: AtomicU8,
    error_queue: SeverityQueue,
    info_queue: SeverityQueue,
    dedup: Deduplicator,
    formatter: BatchFormatter,
    deliverer: Deliverer<T>,
    sink: Arc<dyn DurableSink>,
    metrics: Arc<ShipperMetrics>,
}

impl<T> Shared<T> {
    fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move `from → to` unless shutdown changed the state meanwhile
    fn transition(&self, from: SchedulerState, to: SchedulerState) {
        let _ = self.state.compare_exchange(
            from as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn queue(&self, class: SeverityClass) -> &SeverityQueue {
        match class {
            SeverityClass::Error => &self.error_queue,
            SeverityClass::Info => &self.info_queue,
        }
    }

    fn enqueue(&self, item: LogItem) -> Enqueued {
        let class = item.class();
        let level = item.level;
        let outcome = self.queue(class).push(item);
        debug!(target: "log_shipper", %level, %class, ?outcome, "Record enqueued");
        outcome
    }

    fn persist_offline(&self, item: &LogItem) -> Result<()> {
        let result = self
            .sink
            .persist(FallbackTag::NoConsumerLoop, item.class(), &item.to_record_line());
        match result {
            Ok(()) => {
                self.metrics.record_fallback();
                Ok(())
            }
            Err(e) => {
                self.metrics.record_sink_failure();
                Err(e)
            }
        }
    }

    fn persist_or_log(
        &self,
        tag: FallbackTag,
        class: SeverityClass,
        content: &str,
        report: &mut DrainReport,
    ) {
        match self.sink.persist(tag, class, content) {
            Ok(()) => {
                self.metrics.record_fallback();
                report.fallback += 1;
            }
            Err(e) => {
                self.metrics.record_sink_failure();
                report.sink_failures += 1;
                error!(
                    target: "log_shipper",
                    %class,
                    %tag,
                    sink = self.sink.name(),
                    error = %e,
                    "Fallback sink rejected record; it is lost"
                );
            }
        }
    }
}

impl<T: WebhookTransport> Shared<T> {
    /// One pass over both queues
    ///
    /// Each class is flushed behind its own unwind boundary. The drained
    /// records and their settled flags live outside it, so a panic mid-flush
    /// only costs the in-flight attempt: every record no outcome covered yet
    /// is persisted as a delivery failure.
    async fn drain_cycle(&self) -> DrainReport {
        let mut report = DrainReport::default();
        for class in SeverityClass::ALL {
            let items = self.queue(class).drain();
            if items.is_empty() {
                continue;
            }
            let mut settled = vec![false; items.len()];
            let flushed = AssertUnwindSafe(self.flush_class(class, &items, &mut settled))
                .catch_unwind()
                .await;
            match flushed {
                Ok(class_report) => report.merge(class_report),
                Err(panic_info) => {
                    self.metrics.record_background_fault();
                    report.drained += items.len();
                    report.faults += 1;
                    let fault = ShipperError::background(panic_message(panic_info));
                    let unsettled = settled.iter().filter(|done| !**done).count();
                    error!(
                        target: "log_shipper",
                        %class,
                        unsettled,
                        error = %fault,
                        "Flush panicked, persisting undelivered records locally"
                    );
                    for (item, _) in items.iter().zip(&settled).filter(|(_, done)| !**done) {
                        self.persist_or_log(
                            FallbackTag::DeliveryFailure,
                            class,
                            &item.to_record_line(),
                            &mut report,
                        );
                    }
                }
            }
        }
        report
    }

    /// Drain cycle with any panic outside a class flush turned into a fault
    async fn guarded_drain(&self) -> Result<DrainReport> {
        match AssertUnwindSafe(self.drain_cycle()).catch_unwind().await {
            Ok(report) => Ok(report),
            Err(panic_info) => {
                self.metrics.record_background_fault();
                Err(ShipperError::background(panic_message(panic_info)))
            }
        }
    }

    /// Dedup, format and deliver one class's drained records
    ///
    /// `settled[i]` flips once record `i` needs no further handling.
    async fn flush_class(
        &self,
        class: SeverityClass,
        items: &[LogItem],
        settled: &mut [bool],
    ) -> DrainReport {
        let mut report = DrainReport {
            drained: items.len(),
            ..DrainReport::default()
        };

        let Some(endpoint) = self.config.webhook_for(class) else {
            warn!(
                target: "log_shipper",
                %class,
                records = items.len(),
                "No webhook configured for class, persisting records locally"
            );
            for (idx, item) in items.iter().enumerate() {
                self.persist_or_log(
                    FallbackTag::DeliveryFailure,
                    class,
                    &item.to_record_line(),
                    &mut report,
                );
                settled[idx] = true;
            }
            return report;
        };

        let mut critical = Vec::new();
        let mut batched = Vec::new();
        let mut lines = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            if self.dedup.is_duplicate(&item.message, item.level) {
                self.metrics.record_suppressed();
                report.suppressed += 1;
                settled[idx] = true;
                debug!(target: "log_shipper", level = %item.level, "Duplicate record suppressed");
                continue;
            }
            if item.level.is_critical() {
                critical.push((idx, self.formatter.critical_payload(item)));
            } else {
                batched.push(idx);
                lines.push(self.formatter.batch_line(item));
            }
        }

        for (idx, payload) in &critical {
            self.deliver(endpoint, class, payload, &mut report).await;
            settled[*idx] = true;
            tokio::time::sleep(CRITICAL_SEND_PAUSE).await;
        }

        // Chunks do not map back to records, so the batch settles as a whole
        // once its last chunk has an outcome.
        let batch = self.formatter.batch_payloads(class, &lines);
        if !batch.is_empty() {
            debug!(
                target: "log_shipper",
                %class,
                messages = lines.len(),
                chunks = batch.len(),
                "Sending grouped batch"
            );
        }
        for (idx, payload) in batch.iter().enumerate() {
            self.deliver(endpoint, class, payload, &mut report).await;
            if idx + 1 < batch.len() {
                tokio::time::sleep(CHUNK_SEND_PAUSE).await;
            }
        }
        for idx in batched {
            settled[idx] = true;
        }

        report
    }

    async fn deliver(
        &self,
        endpoint: &str,
        class: SeverityClass,
        payload: &Payload,
        report: &mut DrainReport,
    ) {
        match self.deliverer.send(endpoint, payload).await {
            DeliveryOutcome::Delivered { .. } => report.delivered += 1,
            outcome => {
                debug!(
                    target: "log_shipper",
                    endpoint = %endpoint_label(endpoint),
                    %class,
                    ?outcome,
                    "Payload not delivered, persisting locally"
                );
                let record = serde_json::to_string(payload).unwrap_or_else(|_| payload.full_text());
                self.persist_or_log(FallbackTag::DeliveryFailure, class, &record, report);
            }
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // Last owner gone: whatever is still queued goes to the sink.
        for class in SeverityClass::ALL {
            let leftovers = self.queue(class).drain();
            if leftovers.is_empty() {
                continue;
            }
            warn!(
                target: "log_shipper",
                %class,
                records = leftovers.len(),
                "Shipper dropped with queued records, persisting them locally"
            );
            for item in &leftovers {
                if let Err(e) = self.persist_offline(item) {
                    error!(target: "log_shipper", %class, error = %e, "Failed to persist record on drop");
                }
            }
        }
        let _ = self.sink.flush();
    }
}

/// Extract a readable message from a panic payload
fn panic_message(panic_info: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

async fn run_scheduler<T: WebhookTransport>(shared: Arc<Shared<T>>, token: CancellationToken) {
    let interval = shared.config.batch_interval;
    info!(
        target: "log_shipper",
        interval_ms = interval.as_millis() as u64,
        "Flush scheduler started"
    );

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        shared.transition(SchedulerState::Idle, SchedulerState::Draining);
        let outcome = shared.guarded_drain().await;
        shared.transition(SchedulerState::Draining, SchedulerState::Idle);

        let faulted = match outcome {
            Ok(report) => {
                if report.sink_failures > 0 {
                    error!(
                        target: "log_shipper",
                        sink_failures = report.sink_failures,
                        "Drain cycle lost records the fallback sink refused"
                    );
                }
                if !report.is_empty() {
                    info!(
                        target: "log_shipper",
                        drained = report.drained,
                        suppressed = report.suppressed,
                        delivered = report.delivered,
                        fallback = report.fallback,
                        faults = report.faults,
                        "Drain cycle complete"
                    );
                }
                report.faults > 0
            }
            Err(e) => {
                error!(target: "log_shipper", error = %e, "Drain cycle faulted");
                true
            }
        };

        if faulted {
            warn!(
                target: "log_shipper",
                backoff_ms = FAULT_BACKOFF.as_millis() as u64,
                "Backing off after a faulted drain cycle"
            );
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(FAULT_BACKOFF) => {}
            }
        }
    }

    debug!(target: "log_shipper", "Flush scheduler stopped");
}

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Cloneable producer handle
///
/// Both producer paths are explicit: [`enqueue`](Self::enqueue) feeds the
/// async pipeline and never blocks, [`persist_offline`](Self::persist_offline)
/// writes straight to the fallback sink for call sites that know no flush
/// scheduler is available.
pub struct ShipperHandle<T = HttpTransport> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ShipperHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> ShipperHandle<T> {
    /// Queue a record; never blocks, never fails
    pub fn enqueue(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        stack_trace: Option<String>,
    ) -> Enqueued {
        let mut item = LogItem::new(level, message);
        item.stack_trace = stack_trace;
        self.shared.enqueue(item)
    }

    /// Queue a prepared record
    pub fn enqueue_item(&self, item: LogItem) -> Enqueued {
        self.shared.enqueue(item)
    }

    /// Degraded synchronous path: write the record to the fallback sink
    pub fn persist_offline(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        stack_trace: Option<String>,
    ) -> Result<()> {
        let mut item = LogItem::new(level, message);
        item.stack_trace = stack_trace;
        self.shared.persist_offline(&item)
    }

    #[inline]
    pub fn info(&self, message: impl Into<String>) -> Enqueued {
        self.enqueue(LogLevel::Info, message, None)
    }

    #[inline]
    pub fn error(&self, message: impl Into<String>) -> Enqueued {
        self.enqueue(LogLevel::Error, message, None)
    }

    #[inline]
    pub fn critical(&self, message: impl Into<String>, stack_trace: Option<String>) -> Enqueued {
        self.enqueue(LogLevel::Critical, message, stack_trace)
    }
}

/// Pipeline object owning the queues and the flush scheduler
///
/// Construction, start and stop are owned by the caller; there is no global
/// instance.
///
/// # Example
///
/// ```no_run
/// use log_shipper::{LogLevel, LogShipper, ShipperConfig};
///
/// # async fn run() -> log_shipper::Result<()> {
/// let config = ShipperConfig::from_env()?;
/// let shipper = LogShipper::from_config(config)?;
/// shipper.start()?;
///
/// let handle = shipper.handle();
/// handle.enqueue(LogLevel::Error, "payment failed", None);
///
/// let report = shipper.stop().await?;
/// println!("final drain: {:?}", report);
/// # Ok(())
/// # }
/// ```
pub struct LogShipper<T = HttpTransport> {
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<Worker>>,
}

impl LogShipper<HttpTransport> {
    /// HTTP transport plus file fallback sink under `config.fallback_dir`
    pub fn from_config(config: ShipperConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.request_timeout)?;
        LogShipper::builder(config, transport).build()
    }
}

impl<T: WebhookTransport + 'static> LogShipper<T> {
    pub fn builder(config: ShipperConfig, transport: T) -> LogShipperBuilder<T> {
        LogShipperBuilder::new(config, transport)
    }

    /// Spawn the flush scheduler on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ShipperError::NoRuntime)?;

        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(ShipperError::AlreadyRunning);
        }

        for class in SeverityClass::ALL {
            if self.shared.config.webhook_for(class).is_none() {
                warn!(
                    target: "log_shipper",
                    %class,
                    "No webhook configured; records of this class go to the fallback sink"
                );
            }
        }

        self.shared.set_state(SchedulerState::Idle);
        let token = CancellationToken::new();
        let handle = runtime.spawn(run_scheduler(Arc::clone(&self.shared), token.clone()));
        *worker = Some(Worker { token, handle });
        Ok(())
    }

    /// Stop the scheduler and deliver everything still queued
    ///
    /// An in-flight drain is allowed to finish; then one final full drain
    /// runs before this returns.
    pub async fn stop(&self) -> Result<DrainReport> {
        let worker = self.worker.lock().take().ok_or(ShipperError::NotRunning)?;

        self.shared.set_state(SchedulerState::Stopping);
        worker.token.cancel();
        if let Err(e) = worker.handle.await {
            self.shared.metrics.record_background_fault();
            error!(target: "log_shipper", error = %e, "Flush scheduler ended abnormally");
        }

        info!(
            target: "log_shipper",
            error_queue = self.shared.error_queue.len(),
            info_queue = self.shared.info_queue.len(),
            "Draining remaining records"
        );
        let drained = self.shared.guarded_drain().await;
        self.shared.set_state(SchedulerState::Stopped);
        let flushed = self.shared.sink.flush();
        let report = drained?;
        flushed?;

        info!(
            target: "log_shipper",
            drained = report.drained,
            delivered = report.delivered,
            fallback = report.fallback,
            faults = report.faults,
            "Log shipper stopped"
        );
        Ok(report)
    }

    /// Run one drain cycle now, independent of the scheduler
    ///
    /// A class whose flush panicked shows up in [`DrainReport::faults`];
    /// `Err` means the cycle itself could not finish.
    pub async fn flush(&self) -> Result<DrainReport> {
        self.shared.guarded_drain().await
    }
}

impl<T> LogShipper<T> {
    pub fn handle(&self) -> ShipperHandle<T> {
        ShipperHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn enqueue(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        stack_trace: Option<String>,
    ) -> Enqueued {
        let mut item = LogItem::new(level, message);
        item.stack_trace = stack_trace;
        self.shared.enqueue(item)
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.state()
    }

    pub fn queue_len(&self, class: SeverityClass) -> usize {
        self.shared.queue(class).len()
    }

    pub fn config(&self) -> &ShipperConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> &ShipperMetrics {
        &self.shared.metrics
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        self.shared.deliverer.limiter()
    }

    pub fn deduplicator(&self) -> &Deduplicator {
        &self.shared.dedup
    }

    pub fn transport(&self) -> &T {
        self.shared.deliverer.transport()
    }
}

impl<T> Drop for LogShipper<T> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            warn!(
                target: "log_shipper",
                "Log shipper dropped without stop(); cancelling the flush scheduler"
            );
            worker.token.cancel();
        }
    }
}

/// Builder for [`LogShipper`]
///
/// # Example
///
/// ```no_run
/// use log_shipper::appenders::{HttpTransport, MemorySink};
/// use log_shipper::{LogShipper, ShipperConfig};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let shipper = LogShipper::builder(
///     ShipperConfig::default(),
///     HttpTransport::new(Duration::from_secs(10)).unwrap(),
/// )
/// .sink(Arc::new(MemorySink::new()))
/// .build()
/// .unwrap();
/// ```
pub struct LogShipperBuilder<T> {
    config: ShipperConfig,
    transport: T,
    sink: Option<Arc<dyn DurableSink>>,
    retry_policy: Option<RetryPolicy>,
    formatter: Option<BatchFormatter>,
}

impl<T: WebhookTransport + 'static> LogShipperBuilder<T> {
    pub fn new(config: ShipperConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            sink: None,
            retry_policy: None,
            formatter: None,
        }
    }

    /// Fallback sink; defaults to a [`FileSink`] under `config.fallback_dir`
    #[must_use = "builder methods return a new value"]
    pub fn sink(mut self, sink: Arc<dyn DurableSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Retry policy; defaults to the config's retry values with 10% jitter
    #[must_use = "builder methods return a new value"]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Formatter; defaults to one honouring `config.max_message_length`
    #[must_use = "builder methods return a new value"]
    pub fn formatter(mut self, formatter: BatchFormatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn build(self) -> Result<LogShipper<T>> {
        let config = self.config;
        config.validate()?;

        let sink: Arc<dyn DurableSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(FileSink::new(&config.fallback_dir)?),
        };
        let metrics = Arc::new(ShipperMetrics::new());

        let retry = self.retry_policy.unwrap_or_else(|| RetryPolicy {
            max_attempts: config.max_retries,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
            ..RetryPolicy::default()
        });
        let limiter = Arc::new(RateLimiter::new(
            config.max_requests_per_window,
            config.rate_limit_window,
            config.emergency_cooldown,
        ));
        let deliverer = Deliverer::new(self.transport, limiter, retry, Arc::clone(&metrics));
        let formatter = self
            .formatter
            .unwrap_or_else(|| BatchFormatter::new(config.max_message_length));

        let shared = Shared {
            state: AtomicU8::new(SchedulerState::Stopped as u8),
            error_queue: SeverityQueue::new(
                SeverityClass::Error,
                config.max_queue_size,
                Arc::clone(&sink),
                Arc::clone(&metrics),
            ),
            info_queue: SeverityQueue::new(
                SeverityClass::Info,
                config.max_queue_size,
                Arc::clone(&sink),
                Arc::clone(&metrics),
            ),
            dedup: Deduplicator::new(config.dedup_window),
            formatter,
            deliverer,
            sink,
            metrics,
            config,
        };

        Ok(LogShipper {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appenders::MemorySink;
    use crate::core::transport::WebhookResponse;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::AtomicUsize;

    const ERROR_HOOK: &str = "https://hooks.example.com/error";
    const INFO_HOOK: &str = "https://hooks.example.com/info";

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, Payload)>>,
        status: Mutex<Option<StatusCode>>,
    }

    impl RecordingTransport {
        fn answering(status: StatusCode) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                status: Mutex::new(Some(status)),
            }
        }

        fn sent(&self) -> Vec<(String, Payload)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl WebhookTransport for RecordingTransport {
        async fn post(&self, endpoint: &str, payload: &Payload) -> Result<WebhookResponse> {
            self.sent.lock().push((endpoint.to_owned(), payload.clone()));
            let status = (*self.status.lock()).unwrap_or(StatusCode::NO_CONTENT);
            Ok(WebhookResponse::new(status))
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    /// Panics on the `panic_on`-th post, accepts everything else
    struct PanickingTransport {
        panic_on: usize,
        posts: AtomicUsize,
        delivered: Mutex<Vec<String>>,
    }

    impl PanickingTransport {
        fn on_post(panic_on: usize) -> Self {
            Self {
                panic_on,
                posts: AtomicUsize::new(0),
                delivered: Mutex::new(Vec::new()),
            }
        }

        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().clone()
        }
    }

    #[async_trait]
    impl WebhookTransport for PanickingTransport {
        async fn post(&self, _endpoint: &str, payload: &Payload) -> Result<WebhookResponse> {
            let n = self.posts.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.panic_on {
                panic!("transport blew up on post {}", n);
            }
            self.delivered.lock().push(payload.full_text());
            Ok(WebhookResponse::new(StatusCode::NO_CONTENT))
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    fn config() -> ShipperConfig {
        ShipperConfig {
            error_webhook: Some(ERROR_HOOK.to_string()),
            info_webhook: Some(INFO_HOOK.to_string()),
            max_queue_size: 10,
            batch_interval: Duration::from_secs(5),
            ..ShipperConfig::default()
        }
    }

    fn shipper_with(
        config: ShipperConfig,
        transport: RecordingTransport,
    ) -> (LogShipper<RecordingTransport>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let shipper = LogShipper::builder(config, transport)
            .sink(sink.clone())
            .build()
            .expect("valid shipper");
        (shipper, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_routes_classes_to_their_webhooks() {
        let (shipper, sink) = shipper_with(config(), RecordingTransport::default());
        shipper.enqueue(LogLevel::Info, "started", None);
        shipper.enqueue(LogLevel::Error, "failed", None);

        let report = shipper.flush().await.expect("drain");
        assert_eq!(report.drained, 2);
        assert_eq!(report.delivered, 2);

        let sent = shipper.transport().sent();
        assert_eq!(sent.len(), 2);
        // error class drains first
        assert_eq!(sent[0].0, ERROR_HOOK);
        assert!(sent[0].1.content.starts_with("**ERROR LOGS:**"));
        assert_eq!(sent[1].0, INFO_HOOK);
        assert!(sent[1].1.content.contains("started"));
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_sent_individually_before_batch() {
        let (shipper, _) = shipper_with(config(), RecordingTransport::default());
        shipper.enqueue(LogLevel::Error, "plain error", None);
        shipper.enqueue(LogLevel::Critical, "meltdown", Some("trace".into()));

        shipper.flush().await.expect("drain");

        let sent = shipper.transport().sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].1.content.contains("**CRITICAL ERROR**"));
        assert_eq!(sent[0].1.embeds.len(), 1);
        assert!(sent[1].1.content.contains("plain error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delivery_goes_to_fallback() {
        let config = ShipperConfig {
            max_retries: 2,
            ..config()
        };
        let (shipper, sink) =
            shipper_with(config, RecordingTransport::answering(StatusCode::BAD_GATEWAY));
        shipper.enqueue(LogLevel::Info, "lost cause", None);

        let report = shipper.flush().await.expect("drain");
        assert_eq!(report.delivered, 0);
        assert_eq!(report.fallback, 1);
        assert_eq!(shipper.transport().sent().len(), 2);

        let records = sink.records_tagged(FallbackTag::DeliveryFailure);
        assert_eq!(records.len(), 1);
        assert!(records[0].content.contains("lost cause"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_webhook_persists_records() {
        let config = ShipperConfig {
            info_webhook: None,
            ..config()
        };
        let (shipper, sink) = shipper_with(config, RecordingTransport::default());
        shipper.enqueue(LogLevel::Info, "nowhere to go", None);

        let report = shipper.flush().await.expect("drain");
        assert_eq!(report.fallback, 1);
        assert!(shipper.transport().sent().is_empty());
        assert!(sink.records()[0].content.contains("nowhere to go"));
        assert_eq!(shipper.queue_len(SeverityClass::Info), 0);
    }

    #[test]
    fn test_flush_from_blocking_context() {
        let (shipper, _) = shipper_with(config(), RecordingTransport::default());
        shipper.enqueue(LogLevel::Info, "from sync code", None);

        let report = tokio_test::block_on(shipper.flush()).expect("drain");
        assert_eq!(report.delivered, 1);
        assert_eq!(shipper.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let (shipper, _) = shipper_with(config(), RecordingTransport::default());
        assert_eq!(shipper.state(), SchedulerState::Stopped);
        shipper.start().expect("first start");
        assert!(matches!(shipper.start(), Err(ShipperError::AlreadyRunning)));
        assert!(shipper.is_running());
        assert_eq!(shipper.state(), SchedulerState::Idle);
        shipper.stop().await.expect("stop");
        assert!(!shipper.is_running());
        assert_eq!(shipper.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_start() {
        let (shipper, _) = shipper_with(config(), RecordingTransport::default());
        assert!(matches!(shipper.stop().await, Err(ShipperError::NotRunning)));
    }

    #[test]
    fn test_start_outside_runtime() {
        let (shipper, _) = shipper_with(config(), RecordingTransport::default());
        assert!(matches!(shipper.start(), Err(ShipperError::NoRuntime)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_drains_on_interval() {
        let (shipper, _) = shipper_with(config(), RecordingTransport::default());
        shipper.start().expect("start");
        shipper.enqueue(LogLevel::Info, "tick", None);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(shipper.transport().sent().len(), 1);
        assert_eq!(shipper.queue_len(SeverityClass::Info), 0);

        shipper.stop().await.expect("stop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_performs_final_drain() {
        let config = ShipperConfig {
            batch_interval: Duration::from_secs(3600),
            ..config()
        };
        let (shipper, _) = shipper_with(config, RecordingTransport::default());
        shipper.start().expect("start");
        shipper.enqueue(LogLevel::Error, "last words", None);

        let report = shipper.stop().await.expect("stop");
        assert_eq!(report.drained, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(shipper.transport().sent().len(), 1);
    }

    #[test]
    fn test_persist_offline_writes_no_loop_record() {
        let (shipper, sink) = shipper_with(config(), RecordingTransport::default());
        shipper
            .handle()
            .persist_offline(LogLevel::Error, "no scheduler here", None)
            .expect("persist");

        let records = sink.records_tagged(FallbackTag::NoConsumerLoop);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].class, SeverityClass::Error);
    }

    #[test]
    fn test_drop_persists_queued_records() {
        let sink = Arc::new(MemorySink::new());
        {
            let shipper = LogShipper::builder(config(), RecordingTransport::default())
                .sink(sink.clone())
                .build()
                .expect("valid shipper");
            shipper.enqueue(LogLevel::Info, "never flushed", None);
        }
        let records = sink.records_tagged(FallbackTag::NoConsumerLoop);
        assert_eq!(records.len(), 1);
        assert!(records[0].content.contains("never flushed"));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = ShipperConfig {
            max_retries: 0,
            ..config()
        };
        let result = LogShipper::builder(config, RecordingTransport::default())
            .sink(Arc::new(MemorySink::new()))
            .build();
        assert!(matches!(result, Err(ShipperError::InvalidConfiguration { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_counted_in_report() {
        let config = ShipperConfig {
            max_retries: 1,
            ..config()
        };
        let (shipper, sink) =
            shipper_with(config, RecordingTransport::answering(StatusCode::BAD_GATEWAY));
        sink.set_failing(true);
        shipper.enqueue(LogLevel::Error, "doubly unlucky", None);

        let report = shipper.flush().await.expect("drain");
        assert_eq!(report.drained, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(report.fallback, 0);
        assert_eq!(report.sink_failures, 1);
        assert_eq!(shipper.metrics().sink_failures(), 1);
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_flush_persists_unsettled_records() {
        let sink = Arc::new(MemorySink::new());
        let shipper = LogShipper::builder(config(), PanickingTransport::on_post(2))
            .sink(sink.clone())
            .build()
            .expect("valid shipper");
        shipper.enqueue(LogLevel::Critical, "first critical", None);
        shipper.enqueue(LogLevel::Critical, "second critical", None);
        shipper.enqueue(LogLevel::Error, "plain error", None);

        let report = shipper.flush().await.expect("cycle completes");
        assert_eq!(report.faults, 1);
        assert_eq!(report.drained, 3);
        assert_eq!(report.fallback, 2);
        assert_eq!(shipper.metrics().background_faults(), 1);
        assert_eq!(shipper.queue_len(SeverityClass::Error), 0);

        // The first critical was delivered before the panic
        let delivered = shipper.transport().delivered();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].contains("first critical"));

        let records = sink.records_tagged(FallbackTag::DeliveryFailure);
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.content.contains("second critical")));
        assert!(records.iter().any(|r| r.content.contains("plain error")));
        assert!(records.iter().all(|r| !r.content.contains("first critical")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_survives_panicking_transport() {
        let sink = Arc::new(MemorySink::new());
        let shipper = LogShipper::builder(config(), PanickingTransport::on_post(1))
            .sink(sink.clone())
            .build()
            .expect("valid shipper");
        shipper.enqueue(LogLevel::Critical, "first critical", None);
        shipper.enqueue(LogLevel::Info, "routine", None);
        shipper.start().expect("start");

        // First cycle at 5s: the critical post panics, the info batch still goes out
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(shipper.metrics().background_faults(), 1);
        let records = sink.records_tagged(FallbackTag::DeliveryFailure);
        assert_eq!(records.len(), 1);
        assert!(records[0].content.contains("first critical"));
        assert!(shipper.transport().delivered()[0].contains("routine"));

        // After the back-off the scheduler keeps draining
        shipper.enqueue(LogLevel::Error, "after the fault", None);
        tokio::time::sleep(Duration::from_secs(6)).await;
        let delivered = shipper.transport().delivered();
        assert_eq!(delivered.len(), 2);
        assert!(delivered[1].contains("after the fault"));
        assert_eq!(shipper.state(), SchedulerState::Idle);
        assert_eq!(shipper.metrics().background_faults(), 1);

        shipper.stop().await.expect("stop");
    }
}

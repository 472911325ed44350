//! Shipper metrics for observability
//!
//! Provides counters for monitoring pipeline health: how much was queued,
//! evicted, suppressed, delivered, and downgraded to the fallback sink.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for shipper observability
///
/// # Example
///
/// ```
/// use log_shipper::ShipperMetrics;
///
/// let metrics = ShipperMetrics::new();
///
/// metrics.record_enqueued();
/// metrics.record_delivered();
///
/// assert_eq!(metrics.enqueued(), 1);
/// assert_eq!(metrics.delivered(), 1);
/// ```
#[derive(Debug)]
pub struct ShipperMetrics {
    /// Records accepted by a severity queue
    enqueued: AtomicU64,

    /// Records evicted from a full queue
    evicted: AtomicU64,

    /// Records dropped by the deduplicator
    suppressed: AtomicU64,

    /// Payloads the endpoint accepted
    delivered: AtomicU64,

    /// Payloads and records written to the fallback sink
    fallback: AtomicU64,

    /// 429 responses received
    throttled: AtomicU64,

    /// Sends refused locally by the rate limiter
    rate_limited: AtomicU64,

    /// Fallback writes that failed
    sink_failures: AtomicU64,

    /// Drain cycles that failed or panicked
    background_faults: AtomicU64,
}

impl ShipperMetrics {
    pub const fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            fallback: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            background_faults: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn fallback(&self) -> u64 {
        self.fallback.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn throttled(&self) -> u64 {
        self.throttled.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rate_limited(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn background_faults(&self) -> u64 {
        self.background_faults.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_enqueued(&self) -> u64 {
        self.enqueued.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_evicted(&self) -> u64 {
        self.evicted.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_suppressed(&self) -> u64 {
        self.suppressed.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_delivered(&self) -> u64 {
        self.delivered.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_fallback(&self) -> u64 {
        self.fallback.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_throttled(&self) -> u64 {
        self.throttled.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_rate_limited(&self) -> u64 {
        self.rate_limited.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_sink_failure(&self) -> u64 {
        self.sink_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_background_fault(&self) -> u64 {
        self.background_faults.fetch_add(1, Ordering::Relaxed)
    }

    /// Share of delivery attempts that ended in the fallback sink (0.0 - 100.0)
    ///
    /// Returns 0.0 if nothing has been sent yet.
    pub fn fallback_rate(&self) -> f64 {
        let fallback = self.fallback() as f64;
        let total = self.delivered() as f64 + fallback;
        if total == 0.0 {
            0.0
        } else {
            (fallback / total) * 100.0
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        self.enqueued.store(0, Ordering::Relaxed);
        self.evicted.store(0, Ordering::Relaxed);
        self.suppressed.store(0, Ordering::Relaxed);
        self.delivered.store(0, Ordering::Relaxed);
        self.fallback.store(0, Ordering::Relaxed);
        self.throttled.store(0, Ordering::Relaxed);
        self.rate_limited.store(0, Ordering::Relaxed);
        self.sink_failures.store(0, Ordering::Relaxed);
        self.background_faults.store(0, Ordering::Relaxed);
    }
}

impl Default for ShipperMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ShipperMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            enqueued: AtomicU64::new(self.enqueued()),
            evicted: AtomicU64::new(self.evicted()),
            suppressed: AtomicU64::new(self.suppressed()),
            delivered: AtomicU64::new(self.delivered()),
            fallback: AtomicU64::new(self.fallback()),
            throttled: AtomicU64::new(self.throttled()),
            rate_limited: AtomicU64::new(self.rate_limited()),
            sink_failures: AtomicU64::new(self.sink_failures()),
            background_faults: AtomicU64::new(self.background_faults()),
        }
    }
}

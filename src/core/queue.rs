//! Bounded severity queues with evict-oldest overflow
//!
//! Producers never block and never fail: when a queue is at capacity the
//! oldest record is popped, written to the fallback sink tagged as an
//! overflow eviction, and the new record takes its place. Under sustained
//! overload this keeps the freshest records in memory.

use super::log_item::LogItem;
use super::log_level::SeverityClass;
use super::metrics::ShipperMetrics;
use super::sink::{DurableSink, FallbackTag};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use tracing::{error, warn};

/// Result of [`SeverityQueue::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Inserted without displacing anything
    Queued,
    /// Inserted after evicting the oldest record to the fallback sink
    EvictedOldest,
}

pub struct SeverityQueue {
    class: SeverityClass,
    capacity: usize,
    sender: Sender<LogItem>,
    // Kept on the producer side so overflow can pop the oldest record.
    receiver: Receiver<LogItem>,
    sink: Arc<dyn DurableSink>,
    metrics: Arc<ShipperMetrics>,
}

impl SeverityQueue {
    pub fn new(
        class: SeverityClass,
        capacity: usize,
        sink: Arc<dyn DurableSink>,
        metrics: Arc<ShipperMetrics>,
    ) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            class,
            capacity,
            sender,
            receiver,
            sink,
            metrics,
        }
    }

    pub fn class(&self) -> SeverityClass {
        self.class
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Insert without blocking, evicting the oldest record when full
    pub fn push(&self, item: LogItem) -> Enqueued {
        let mut item = item;
        let mut evicted = false;

        loop {
            match self.sender.try_send(item) {
                Ok(()) => {
                    self.metrics.record_enqueued();
                    return if evicted {
                        Enqueued::EvictedOldest
                    } else {
                        Enqueued::Queued
                    };
                }
                // The queue owns a receiver, so the channel never disconnects
                // and every rejection means it is full.
                Err(rejected) => {
                    item = rejected.into_inner();
                    // Another producer may refill the slot before we retry;
                    // every round evicts one record, so this terminates.
                    if let Ok(oldest) = self.receiver.try_recv() {
                        self.evict(oldest);
                        evicted = true;
                    }
                }
            }
        }
    }

    /// Take every record present when the drain starts
    ///
    /// Records pushed while draining stay queued for the next cycle. The
    /// snapshot is a count, not a set of records: a producer evicting at the
    /// same moment pops one of the counted records, and the drain then takes
    /// the next one in line, which may be newer than the snapshot. Nothing is
    /// lost or duplicated, since the evicted record goes to the sink and the
    /// drain never takes more than `len()` at the start.
    pub fn drain(&self) -> Vec<LogItem> {
        let snapshot = self.receiver.len();
        let mut items = Vec::with_capacity(snapshot);
        for _ in 0..snapshot {
            match self.receiver.try_recv() {
                Ok(item) => items.push(item),
                Err(_) => break,
            }
        }
        items
    }

    fn evict(&self, oldest: LogItem) {
        let evicted_before = self.metrics.record_evicted();

        // Alert on first eviction and periodically thereafter
        if evicted_before == 0 || (evicted_before + 1) % 1000 == 0 {
            warn!(
                target: "log_shipper",
                class = %self.class,
                capacity = self.capacity,
                evicted = evicted_before + 1,
                "Queue full, evicting oldest records to the fallback sink"
            );
        }

        self.persist(&oldest);
    }

    fn persist(&self, item: &LogItem) {
        match self
            .sink
            .persist(FallbackTag::Overflow, self.class, &item.to_record_line())
        {
            Ok(()) => {
                self.metrics.record_fallback();
            }
            Err(e) => {
                self.metrics.record_sink_failure();
                error!(
                    target: "log_shipper",
                    class = %self.class,
                    sink = self.sink.name(),
                    error = %e,
                    "Failed to persist evicted record"
                );
            }
        }
    }
}

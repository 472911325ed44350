//! In-memory fallback sink
//!
//! Keeps every persisted record in a vector. Useful for tests and for hosts
//! that want to inspect fallback traffic without touching the filesystem.

use crate::core::{DurableSink, FallbackTag, Result, SeverityClass, ShipperError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRecord {
    pub tag: FallbackTag,
    pub class: SeverityClass,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SinkRecord>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `persist` fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().clone()
    }

    pub fn records_tagged(&self, tag: FallbackTag) -> Vec<SinkRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.tag == tag)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl DurableSink for MemorySink {
    fn persist(&self, tag: FallbackTag, class: SeverityClass, content: &str) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(ShipperError::io_operation(
                "persisting fallback record",
                "memory sink set to fail",
                std::io::Error::other("injected failure"),
            ));
        }
        self.records.lock().push(SinkRecord {
            tag,
            class,
            content: content.to_owned(),
        });
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

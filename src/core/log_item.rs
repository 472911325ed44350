//! Ingested log record

use super::log_level::{LogLevel, SeverityClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One record handed to the shipper by a producer
///
/// Immutable once created. Owned by its severity queue until a drain cycle
/// takes it, then by the formatting/delivery path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogItem {
    pub message: String,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl LogItem {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            stack_trace: None,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn class(&self) -> SeverityClass {
        self.level.class()
    }

    /// Single-line description used when the item itself lands in the fallback sink
    pub fn to_record_line(&self) -> String {
        let mut line = format!(
            "{} [{}] {}",
            self.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        );
        if let Some(ref trace) = self.stack_trace {
            line.push_str(" | trace: ");
            line.push_str(trace);
        }
        line
    }
}

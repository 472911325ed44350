//! Durable fallback sink trait

use super::error::Result;
use super::log_level::SeverityClass;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a record ended up in the fallback sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FallbackTag {
    /// Evicted from a full queue to make room for a newer record
    Overflow,
    /// Outbound delivery was impossible (throttled, rate limited, retries exhausted)
    DeliveryFailure,
    /// Written through the synchronous path, no flush scheduler involved
    NoConsumerLoop,
}

impl FallbackTag {
    pub fn to_str(&self) -> &'static str {
        match self {
            FallbackTag::Overflow => "OVERFLOW",
            FallbackTag::DeliveryFailure => "DELIVERY_FAILURE",
            FallbackTag::NoConsumerLoop => "NO_LOOP",
        }
    }
}

impl fmt::Display for FallbackTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// Append-only local storage of last resort
///
/// Implementations must be cheap enough to call from the producer path
/// (overflow eviction) and must never panic.
pub trait DurableSink: Send + Sync {
    fn persist(&self, tag: FallbackTag, class: SeverityClass, content: &str) -> Result<()>;
    fn flush(&self) -> Result<()>;
    fn name(&self) -> &str;
}

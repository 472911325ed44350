//! # Log Shipper
//!
//! Asynchronous shipping of application log records to chat-style webhook
//! endpoints, with a local file fallback.
//!
//! ## Features
//!
//! - **Non-blocking ingestion**: bounded per-severity queues that evict the
//!   oldest record instead of blocking or failing the producer
//! - **Noise control**: time-windowed deduplication and per-endpoint rate
//!   limiting with escalating cooldown on HTTP 429
//! - **Readable batches**: critical records sent individually, everything
//!   else grouped, redacted and chunked to the endpoint's size limit
//! - **No silent loss**: evicted, undeliverable and offline records land in
//!   append-only fallback files
//!
//! ## Example
//!
//! ```no_run
//! use log_shipper::prelude::*;
//!
//! # async fn run() -> log_shipper::Result<()> {
//! let shipper = LogShipper::from_config(ShipperConfig::from_env()?)?;
//! shipper.start()?;
//!
//! let handle = shipper.handle();
//! log_shipper::ship_info!(handle, "worker {} online", 3);
//! log_shipper::ship_critical!(handle, "database unreachable");
//!
//! shipper.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod appenders;
pub mod core;
pub mod macros;

pub mod prelude {
    pub use crate::appenders::{FileSink, HttpTransport, MemorySink};
    pub use crate::core::{
        BatchFormatter, DrainReport, DurableSink, Enqueued, Environment, FallbackTag, LogItem,
        LogLevel, LogShipper, LogShipperBuilder, Payload, Result, RetryPolicy, SchedulerState,
        SeverityClass, ShipperConfig, ShipperError, ShipperHandle, ShipperMetrics,
        WebhookResponse, WebhookTransport,
    };
}

pub use crate::appenders::{FileSink, HttpTransport, MemorySink};
pub use crate::core::{
    BatchFormatter, Deduplicator, DrainReport, DurableSink, Embed, Enqueued, Environment,
    FallbackTag, LogItem, LogLevel, LogShipper, LogShipperBuilder, Payload, RateDecision,
    RateLimiter, Result, RetryPolicy, SchedulerState, SeverityClass, ShipperConfig, ShipperError,
    ShipperHandle, ShipperMetrics, WebhookResponse, WebhookTransport,
};

//! Core shipper types and traits

pub mod config;
pub mod dedup;
pub mod delivery;
pub mod error;
pub mod formatter;
pub mod log_item;
pub mod log_level;
pub mod metrics;
pub mod queue;
pub mod rate_limiter;
pub mod shipper;
pub mod sink;
pub mod transport;

pub use config::{Environment, ShipperConfig};
pub use dedup::Deduplicator;
pub use delivery::{endpoint_label, Deliverer, DeliveryOutcome, RetryPolicy};
pub use error::{Result, ShipperError};
pub use formatter::{BatchFormatter, Embed, Payload};
pub use log_item::LogItem;
pub use log_level::{LogLevel, SeverityClass};
pub use metrics::ShipperMetrics;
pub use queue::{Enqueued, SeverityQueue};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use shipper::{DrainReport, LogShipper, LogShipperBuilder, SchedulerState, ShipperHandle};
pub use sink::{DurableSink, FallbackTag};
pub use transport::{WebhookResponse, WebhookTransport};

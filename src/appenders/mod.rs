//! Transport and fallback sink implementations

pub mod fallback_file;
pub mod memory;
pub mod webhook;

pub use fallback_file::FileSink;
pub use memory::{MemorySink, SinkRecord};
pub use webhook::HttpTransport;

// Re-export traits so implementors need a single import
pub use crate::core::{DurableSink, WebhookTransport};

//! Shipping macros for ergonomic message formatting.
//!
//! These macros format their arguments like `format!` and enqueue the result
//! on anything exposing `enqueue(level, message, stack_trace)`: a
//! [`LogShipper`](crate::LogShipper) or a [`ShipperHandle`](crate::ShipperHandle).
//!
//! # Examples
//!
//! ```
//! use log_shipper::prelude::*;
//! use log_shipper::{ship_error, ship_info};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let shipper = LogShipper::builder(
//!     ShipperConfig::default(),
//!     HttpTransport::new(Duration::from_secs(10)).unwrap(),
//! )
//! .sink(Arc::new(MemorySink::new()))
//! .build()
//! .unwrap();
//! let handle = shipper.handle();
//!
//! ship_info!(handle, "Server started");
//! let port = 8080;
//! ship_info!(handle, "Server listening on port {}", port);
//! ship_error!(handle, "Upstream {} answered {}", "billing", 503);
//! ```

/// Enqueue a formatted message at the given level.
///
/// # Examples
///
/// ```
/// # use log_shipper::prelude::*;
/// # use std::sync::Arc;
/// # let shipper = LogShipper::builder(
/// #     ShipperConfig::default(),
/// #     HttpTransport::new(std::time::Duration::from_secs(10)).unwrap(),
/// # ).sink(Arc::new(MemorySink::new())).build().unwrap();
/// use log_shipper::ship;
/// ship!(shipper, LogLevel::Info, "Simple message");
/// ship!(shipper, LogLevel::Error, "Error code: {}", 500);
/// ```
#[macro_export]
macro_rules! ship {
    ($shipper:expr, $level:expr, $($arg:tt)+) => {
        $shipper.enqueue($level, format!($($arg)+), None)
    };
}

/// Enqueue an info-level message.
#[macro_export]
macro_rules! ship_info {
    ($shipper:expr, $($arg:tt)+) => {
        $crate::ship!($shipper, $crate::LogLevel::Info, $($arg)+)
    };
}

/// Enqueue an error-level message.
#[macro_export]
macro_rules! ship_error {
    ($shipper:expr, $($arg:tt)+) => {
        $crate::ship!($shipper, $crate::LogLevel::Error, $($arg)+)
    };
}

/// Enqueue a critical message, optionally with a stack trace.
///
/// # Examples
///
/// ```
/// # use log_shipper::prelude::*;
/// # use std::sync::Arc;
/// # let shipper = LogShipper::builder(
/// #     ShipperConfig::default(),
/// #     HttpTransport::new(std::time::Duration::from_secs(10)).unwrap(),
/// # ).sink(Arc::new(MemorySink::new())).build().unwrap();
/// use log_shipper::ship_critical;
/// ship_critical!(shipper, "Unable to recover: {}", "disk full");
///
/// let trace = std::backtrace::Backtrace::force_capture().to_string();
/// ship_critical!(shipper, trace = trace, "Worker {} crashed", 7);
/// ```
#[macro_export]
macro_rules! ship_critical {
    ($shipper:expr, trace = $trace:expr, $($arg:tt)+) => {
        $shipper.enqueue(
            $crate::LogLevel::Critical,
            format!($($arg)+),
            Some(::std::string::ToString::to_string(&$trace)),
        )
    };
    ($shipper:expr, $($arg:tt)+) => {
        $crate::ship!($shipper, $crate::LogLevel::Critical, $($arg)+)
    };
}

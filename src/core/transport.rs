//! Async transport trait for webhook delivery

use super::error::Result;
use super::formatter::Payload;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// What the endpoint answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: StatusCode,
    /// Parsed `retry-after` hint, if the endpoint sent one
    pub retry_after: Option<Duration>,
}

impl WebhookResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_throttled(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS
    }
}

/// One network call per payload
///
/// `Err` means no HTTP response was obtained at all (connect failure,
/// timeout, malformed request). Any response, whatever its status, is `Ok`.
///
/// # Example
///
/// ```no_run
/// use log_shipper::{Payload, Result, WebhookResponse, WebhookTransport};
/// use async_trait::async_trait;
/// use reqwest::StatusCode;
///
/// struct AcceptEverything;
///
/// #[async_trait]
/// impl WebhookTransport for AcceptEverything {
///     async fn post(&self, _endpoint: &str, _payload: &Payload) -> Result<WebhookResponse> {
///         Ok(WebhookResponse::new(StatusCode::NO_CONTENT))
///     }
///
///     fn name(&self) -> &str {
///         "accept_everything"
///     }
/// }
/// ```
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, endpoint: &str, payload: &Payload) -> Result<WebhookResponse>;

    fn name(&self) -> &str;
}

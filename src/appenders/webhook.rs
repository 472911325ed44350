//! HTTP webhook transport
//!
//! Posts each payload as a JSON body. A `retry-after` header (seconds,
//! fractional allowed) is surfaced to the delivery layer on every response.

use crate::core::{Payload, Result, WebhookResponse, WebhookTransport};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Webhook transport backed by a shared `reqwest::Client`
///
/// # Example
///
/// ```no_run
/// use log_shipper::appenders::HttpTransport;
/// use std::time::Duration;
///
/// let transport = HttpTransport::new(Duration::from_secs(30))
///     .expect("Failed to build HTTP client");
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport whose every request times out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("log_shipper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Reuse an existing client (connection pool, proxy settings, ...)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, endpoint: &str, payload: &Payload) -> Result<WebhookResponse> {
        let response = self.client.post(endpoint).json(payload).send().await?;

        Ok(WebhookResponse {
            status: response.status(),
            retry_after: parse_retry_after(response.headers()),
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let seconds = raw.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

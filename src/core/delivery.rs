//! Rate-limited, retrying payload delivery
//!
//! Every send first asks the [`RateLimiter`]; a refusal returns immediately
//! without network I/O. Admitted sends are attempted up to
//! `max_attempts` times with exponential backoff. A 429 answer is not a
//! generic failure: it ends the attempt loop at once and puts the endpoint in
//! cooldown. Anything other than `Delivered` obliges the caller to persist the
//! payload to the fallback sink.

use super::error::ShipperError;
use super::formatter::Payload;
use super::metrics::ShipperMetrics;
use super::rate_limiter::{RateDecision, RateLimiter};
use super::transport::WebhookTransport;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff between delivery attempts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per payload, first one included
    pub max_attempts: u32,
    /// Wait after the first failed attempt
    pub base_delay: Duration,
    /// Ceiling for any single wait
    pub max_delay: Duration,
    /// Random extra wait as a fraction of the delay (0.0 disables)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Wait before attempt `failed_attempt + 1`, without jitter
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    fn backoff(&self, failed_attempt: u32) -> Duration {
        let delay = self.delay_for(failed_attempt);
        if self.jitter <= 0.0 {
            return delay;
        }
        let extra = delay.mul_f64(rand::thread_rng().gen_range(0.0..self.jitter.min(1.0)));
        (delay + extra).min(self.max_delay)
    }
}

/// Result of one [`Deliverer::send`]
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Endpoint accepted the payload
    Delivered { attempts: u32 },
    /// Refused locally by the rate limiter; no request was made
    RateLimited { wait: Duration },
    /// Endpoint answered 429; it is now in cooldown
    Throttled { cooldown: Duration },
    /// Retries exhausted or a non-recoverable error
    Failed { attempts: u32, error: ShipperError },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

pub struct Deliverer<T> {
    transport: T,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    metrics: Arc<ShipperMetrics>,
}

impl<T> Deliverer<T> {
    pub fn new(
        transport: T,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        metrics: Arc<ShipperMetrics>,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry,
            metrics,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl<T: WebhookTransport> Deliverer<T> {
    pub async fn send(&self, endpoint: &str, payload: &Payload) -> DeliveryOutcome {
        if let RateDecision::Wait(wait) = self.limiter.can_send(endpoint) {
            self.metrics.record_rate_limited();
            debug!(
                target: "log_shipper",
                endpoint = %endpoint_label(endpoint),
                wait_ms = wait.as_millis() as u64,
                "Rate limit active, skipping send"
            );
            return DeliveryOutcome::RateLimited { wait };
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match self.transport.post(endpoint, payload).await {
                Ok(response) if response.is_success() => {
                    self.limiter.record_request(endpoint);
                    self.metrics.record_delivered();
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Ok(response) if response.is_throttled() => {
                    let cooldown = self.limiter.apply_cooldown(endpoint, response.retry_after);
                    self.metrics.record_throttled();
                    warn!(
                        target: "log_shipper",
                        endpoint = %endpoint_label(endpoint),
                        retry_after_ms = response.retry_after.map(|d| d.as_millis() as u64),
                        cooldown_ms = cooldown.as_millis() as u64,
                        "Endpoint throttled delivery, cooling down"
                    );
                    return DeliveryOutcome::Throttled { cooldown };
                }
                Ok(response) => ShipperError::UnexpectedStatus {
                    status: response.status,
                },
                Err(e) => e,
            };

            if !error.is_transient() || attempt >= max_attempts {
                warn!(
                    target: "log_shipper",
                    endpoint = %endpoint_label(endpoint),
                    transport = self.transport.name(),
                    attempts = attempt,
                    error = %error,
                    "Delivery failed"
                );
                return DeliveryOutcome::Failed {
                    attempts: attempt,
                    error,
                };
            }

            let delay = self.retry.backoff(attempt);
            debug!(
                target: "log_shipper",
                endpoint = %endpoint_label(endpoint),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Delivery attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// `scheme://host/…` form of a webhook URL; the path usually embeds a secret
pub fn endpoint_label(endpoint: &str) -> String {
    match reqwest::Url::parse(endpoint) {
        Ok(url) => match url.host_str() {
            Some(host) => format!("{}://{}/…", url.scheme(), host),
            None => format!("{}:…", url.scheme()),
        },
        Err(_) => "<invalid endpoint>".to_owned(),
    }
}

//! Endpoint-aware rate limiting with escalating cooldowns
//!
//! Each destination gets a sliding window of successful send timestamps and an
//! optional cooldown deadline. A cooldown always wins over the window: while it
//! is active nothing is admitted. Cooldowns come either from the endpoint's own
//! retry hint or, lacking one, from an exponential backoff that grows with the
//! number of cooldowns the endpoint received in the last ten minutes.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Seed of the backoff used when the endpoint gives no retry hint
pub const BASE_COOLDOWN: Duration = Duration::from_secs(5);

/// Cooldowns older than this no longer escalate the next one
pub const ESCALATION_HORIZON: Duration = Duration::from_secs(600);

/// Shortest wait reported for a full window
const MIN_WINDOW_WAIT: Duration = Duration::from_secs(1);

/// Outcome of [`RateLimiter::can_send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admit,
    /// Not admitted; retrying earlier than this is pointless
    Wait(Duration),
}

impl RateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, RateDecision::Admit)
    }

    pub fn wait(&self) -> Option<Duration> {
        match self {
            RateDecision::Admit => None,
            RateDecision::Wait(wait) => Some(*wait),
        }
    }
}

#[derive(Debug, Default)]
struct EndpointState {
    history: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
    cooldowns_applied: VecDeque<Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    emergency_cooldown: Duration,
    endpoints: Mutex<HashMap<String, EndpointState>>,
}

impl RateLimiter {
    /// # Arguments
    ///
    /// * `max_requests` - Sends admitted per window and endpoint
    /// * `window` - Length of the sliding window
    /// * `emergency_cooldown` - Cap for every cooldown
    pub fn new(max_requests: usize, window: Duration, emergency_cooldown: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            emergency_cooldown,
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether a send to `endpoint` may happen now
    pub fn can_send(&self, endpoint: &str) -> RateDecision {
        let now = Instant::now();
        let mut endpoints = self.endpoints.lock();
        let state = endpoints.entry(endpoint.to_owned()).or_default();

        if let Some(until) = state.cooldown_until {
            if now < until {
                return RateDecision::Wait(until - now);
            }
            state.cooldown_until = None;
        }

        self.prune_history(state, now);

        if state.history.len() >= self.max_requests {
            if let Some(oldest) = state.history.front() {
                let elapsed = now.saturating_duration_since(*oldest);
                let wait = self.window.saturating_sub(elapsed).max(MIN_WINDOW_WAIT);
                return RateDecision::Wait(wait);
            }
        }

        RateDecision::Admit
    }

    /// Remember a confirmed successful send
    pub fn record_request(&self, endpoint: &str) {
        let now = Instant::now();
        let mut endpoints = self.endpoints.lock();
        let state = endpoints.entry(endpoint.to_owned()).or_default();
        self.prune_history(state, now);
        state.history.push_back(now);
    }

    /// Put `endpoint` in cooldown and return the applied duration
    ///
    /// An explicit `retry_after` from the endpoint is honoured up to the
    /// emergency cap; otherwise the duration doubles with every cooldown
    /// received in the last ten minutes, starting at [`BASE_COOLDOWN`].
    pub fn apply_cooldown(&self, endpoint: &str, retry_after: Option<Duration>) -> Duration {
        let now = Instant::now();
        let mut endpoints = self.endpoints.lock();
        let state = endpoints.entry(endpoint.to_owned()).or_default();

        while let Some(applied) = state.cooldowns_applied.front() {
            if now.saturating_duration_since(*applied) >= ESCALATION_HORIZON {
                state.cooldowns_applied.pop_front();
            } else {
                break;
            }
        }

        let cooldown = match retry_after {
            Some(hint) if !hint.is_zero() => hint.min(self.emergency_cooldown),
            _ => {
                let recent = state.cooldowns_applied.len().min(31) as u32;
                BASE_COOLDOWN
                    .saturating_mul(1u32 << recent)
                    .min(self.emergency_cooldown)
            }
        };

        state.cooldowns_applied.push_back(now);
        state.cooldown_until = Some(now + cooldown);
        cooldown
    }

    /// Remaining cooldown for `endpoint`, if any
    pub fn cooldown_remaining(&self, endpoint: &str) -> Option<Duration> {
        let now = Instant::now();
        let endpoints = self.endpoints.lock();
        endpoints
            .get(endpoint)
            .and_then(|state| state.cooldown_until)
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Sends recorded inside the current window
    pub fn requests_in_window(&self, endpoint: &str) -> usize {
        let now = Instant::now();
        let mut endpoints = self.endpoints.lock();
        match endpoints.get_mut(endpoint) {
            Some(state) => {
                self.prune_history(state, now);
                state.history.len()
            }
            None => 0,
        }
    }

    fn prune_history(&self, state: &mut EndpointState, now: Instant) {
        while let Some(sent) = state.history.front() {
            if now.saturating_duration_since(*sent) >= self.window {
                state.history.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOOK: &str = "https://hooks.example.com/a";

    fn limiter(max: usize, window_secs: u64) -> RateLimiter {
        RateLimiter::new(max, Duration::from_secs(window_secs), Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_window_denies_then_recovers() {
        let limiter = limiter(3, 60);
        for _ in 0..3 {
            assert!(limiter.can_send(HOOK).is_admitted());
            limiter.record_request(HOOK);
        }

        let decision = limiter.can_send(HOOK);
        assert!(!decision.is_admitted());
        let wait = decision.wait().expect("wait estimate");
        assert!(wait > Duration::ZERO && wait <= Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.can_send(HOOK).is_admitted());
        assert_eq!(limiter.requests_in_window(HOOK), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_wait_is_floored_at_one_second() {
        let limiter = limiter(1, 10);
        limiter.record_request(HOOK);
        tokio::time::advance(Duration::from_millis(9_800)).await;

        assert_eq!(limiter.can_send(HOOK), RateDecision::Wait(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_measured_from_oldest_request() {
        let limiter = limiter(2, 60);
        limiter.record_request(HOOK);
        tokio::time::advance(Duration::from_secs(20)).await;
        limiter.record_request(HOOK);

        assert_eq!(limiter.can_send(HOOK), RateDecision::Wait(Duration::from_secs(40)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoints_are_independent() {
        let limiter = limiter(1, 60);
        limiter.record_request(HOOK);
        assert!(!limiter.can_send(HOOK).is_admitted());
        assert!(limiter.can_send("https://hooks.example.com/b").is_admitted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_retry_after_is_capped() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60), Duration::from_secs(30));
        let applied = limiter.apply_cooldown(HOOK, Some(Duration::from_secs(120)));
        assert_eq!(applied, Duration::from_secs(30));
        assert_eq!(limiter.can_send(HOOK), RateDecision::Wait(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_overrides_empty_history() {
        let limiter = limiter(10, 60);
        limiter.apply_cooldown(HOOK, Some(Duration::from_secs(5)));
        assert_eq!(limiter.can_send(HOOK), RateDecision::Wait(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.can_send(HOOK).is_admitted());
        assert_eq!(limiter.cooldown_remaining(HOOK), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_escalates_without_hint() {
        let limiter = limiter(10, 60);
        let first = limiter.apply_cooldown(HOOK, None);
        tokio::time::advance(Duration::from_secs(30)).await;
        let second = limiter.apply_cooldown(HOOK, None);
        tokio::time::advance(Duration::from_secs(30)).await;
        let third = limiter.apply_cooldown(HOOK, None);

        assert_eq!(first, Duration::from_secs(5));
        assert_eq!(second, Duration::from_secs(10));
        assert_eq!(third, Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_is_capped_and_decays() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60), Duration::from_secs(60));
        let mut last = Duration::ZERO;
        for _ in 0..8 {
            last = limiter.apply_cooldown(HOOK, None);
        }
        assert_eq!(last, Duration::from_secs(60));

        tokio::time::advance(ESCALATION_HORIZON).await;
        assert_eq!(limiter.apply_cooldown(HOOK, None), BASE_COOLDOWN);
    }
}

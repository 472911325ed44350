//! Shipper configuration and per-environment presets
//!
//! The presets differ only in numbers, never in logic. Every value can be
//! overridden from the process environment through [`ShipperConfig::from_env`].

use super::error::{Result, ShipperError};
use super::log_level::SeverityClass;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Deployment environment selecting a preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(format!("Invalid environment: '{}'", s)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Configuration consumed by the pipeline
///
/// # Example
///
/// ```
/// use log_shipper::{Environment, ShipperConfig};
/// use std::time::Duration;
///
/// let config = ShipperConfig {
///     error_webhook: Some("https://hooks.example.com/errors".to_string()),
///     ..ShipperConfig::for_environment(Environment::Production)
/// };
/// assert_eq!(config.batch_interval, Duration::from_secs(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ShipperConfig {
    /// Destination for the ERROR class (ERROR + CRITICAL)
    pub error_webhook: Option<String>,
    /// Destination for the INFO class
    pub info_webhook: Option<String>,

    /// Capacity of each severity queue
    pub max_queue_size: usize,
    /// Sleep between drain cycles
    pub batch_interval: Duration,
    /// Delivery attempts per payload, first attempt included
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Ceiling applied to every single HTTP call
    pub request_timeout: Duration,

    pub max_requests_per_window: usize,
    pub rate_limit_window: Duration,
    /// Upper bound for any cooldown, explicit retry-after included
    pub emergency_cooldown: Duration,

    pub dedup_window: Duration,
    /// Sanitized messages are truncated to this many characters
    pub max_message_length: usize,

    /// Directory holding the durable fallback files
    pub fallback_dir: PathBuf,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            error_webhook: None,
            info_webhook: None,
            max_queue_size: 2000,
            batch_interval: Duration::from_secs(5),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(2),
            retry_max_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_requests_per_window: 50,
            rate_limit_window: Duration::from_secs(60),
            emergency_cooldown: Duration::from_secs(300),
            dedup_window: Duration::from_secs(30),
            max_message_length: 500,
            fallback_dir: PathBuf::from("logs"),
        }
    }
}

impl ShipperConfig {
    /// Preset for the given environment
    pub fn for_environment(environment: Environment) -> Self {
        let base = Self::default();
        match environment {
            Environment::Production => Self {
                max_queue_size: 5000,
                max_retries: 5,
                batch_interval: Duration::from_secs(10),
                max_requests_per_window: 30,
                emergency_cooldown: Duration::from_secs(600),
                ..base
            },
            Environment::Staging => Self {
                max_queue_size: 2000,
                max_retries: 3,
                batch_interval: Duration::from_secs(5),
                max_requests_per_window: 50,
                emergency_cooldown: Duration::from_secs(300),
                ..base
            },
            Environment::Development => Self {
                max_queue_size: 1000,
                max_retries: 3,
                batch_interval: Duration::from_secs(3),
                max_requests_per_window: 100,
                emergency_cooldown: Duration::from_secs(60),
                ..base
            },
        }
    }

    /// Build a configuration from the process environment
    ///
    /// `ENVIRONMENT` selects the preset (development when unset or unknown),
    /// then individual variables override single values.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a caller supplied lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .and_then(|value| value.parse::<Environment>().ok())
            .unwrap_or_default();
        let mut config = Self::for_environment(environment);

        if let Some(url) = lookup("ERROR_HOOK").filter(|v| !v.trim().is_empty()) {
            config.error_webhook = Some(url);
        }
        if let Some(url) = lookup("INFO_HOOK").filter(|v| !v.trim().is_empty()) {
            config.info_webhook = Some(url);
        }
        if let Some(raw) = lookup("MAX_QUEUE_SIZE") {
            config.max_queue_size = parse_number("MAX_QUEUE_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("MAX_RETRIES") {
            config.max_retries = parse_number("MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("BATCH_INTERVAL") {
            config.batch_interval = parse_seconds("BATCH_INTERVAL", &raw)?;
        }
        if let Some(raw) = lookup("MAX_REQUESTS_PER_WINDOW") {
            config.max_requests_per_window = parse_number("MAX_REQUESTS_PER_WINDOW", &raw)?;
        }
        if let Some(raw) = lookup("RATE_LIMIT_WINDOW") {
            config.rate_limit_window = parse_seconds("RATE_LIMIT_WINDOW", &raw)?;
        }
        if let Some(raw) = lookup("EMERGENCY_COOLDOWN") {
            config.emergency_cooldown = parse_seconds("EMERGENCY_COOLDOWN", &raw)?;
        }
        if let Some(raw) = lookup("DEDUP_WINDOW") {
            config.dedup_window = parse_seconds("DEDUP_WINDOW", &raw)?;
        }
        if let Some(raw) = lookup("MAX_MESSAGE_LENGTH") {
            config.max_message_length = parse_number("MAX_MESSAGE_LENGTH", &raw)?;
        }
        if let Some(dir) = lookup("FALLBACK_DIR").filter(|v| !v.trim().is_empty()) {
            config.fallback_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Webhook serving the given severity class
    pub fn webhook_for(&self, class: SeverityClass) -> Option<&str> {
        match class {
            SeverityClass::Error => self.error_webhook.as_deref(),
            SeverityClass::Info => self.info_webhook.as_deref(),
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        const COMPONENT: &str = "ShipperConfig";

        if self.max_queue_size == 0 {
            return Err(ShipperError::config(COMPONENT, "max_queue_size must be at least 1"));
        }
        if self.max_retries == 0 {
            return Err(ShipperError::config(COMPONENT, "max_retries must be at least 1"));
        }
        if self.max_requests_per_window == 0 {
            return Err(ShipperError::config(
                COMPONENT,
                "max_requests_per_window must be at least 1",
            ));
        }
        if self.max_message_length == 0 {
            return Err(ShipperError::config(COMPONENT, "max_message_length must be at least 1"));
        }
        for (name, value) in [
            ("batch_interval", self.batch_interval),
            ("rate_limit_window", self.rate_limit_window),
            ("emergency_cooldown", self.emergency_cooldown),
            ("dedup_window", self.dedup_window),
            ("request_timeout", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(ShipperError::config(COMPONENT, format!("{} must be positive", name)));
            }
        }
        if self.retry_base_delay > self.retry_max_delay {
            return Err(ShipperError::config(
                COMPONENT,
                "retry_base_delay must not exceed retry_max_delay",
            ));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ShipperError::config(key, format!("'{}' is not a valid integer", raw)))
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration> {
    let seconds = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| ShipperError::config(key, format!("'{}' is not a number of seconds", raw)))?;
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| ShipperError::config(key, format!("'{}' is out of range", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_presets_differ_only_in_numbers() {
        let prod = ShipperConfig::for_environment(Environment::Production);
        assert_eq!(prod.max_queue_size, 5000);
        assert_eq!(prod.max_retries, 5);
        assert_eq!(prod.max_requests_per_window, 30);
        assert_eq!(prod.emergency_cooldown, Duration::from_secs(600));

        let dev = ShipperConfig::for_environment(Environment::Development);
        assert_eq!(dev.batch_interval, Duration::from_secs(3));
        assert_eq!(dev.emergency_cooldown, Duration::from_secs(60));
        assert_eq!(dev.dedup_window, prod.dedup_window);
    }

    #[test]
    fn test_lookup_overrides_preset() {
        let config = ShipperConfig::from_lookup(lookup_from(&[
            ("ENVIRONMENT", "production"),
            ("ERROR_HOOK", "https://hooks.example.com/err"),
            ("MAX_QUEUE_SIZE", "42"),
            ("BATCH_INTERVAL", "0.5"),
            ("DEDUP_WINDOW", "12"),
        ]))
        .expect("valid config");

        assert_eq!(config.error_webhook.as_deref(), Some("https://hooks.example.com/err"));
        assert_eq!(config.info_webhook, None);
        assert_eq!(config.max_queue_size, 42);
        assert_eq!(config.batch_interval, Duration::from_millis(500));
        assert_eq!(config.dedup_window, Duration::from_secs(12));
        // untouched production values survive
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_unknown_environment_falls_back_to_development() {
        let config = ShipperConfig::from_lookup(lookup_from(&[("ENVIRONMENT", "qa")]))
            .expect("valid config");
        assert_eq!(config, ShipperConfig::for_environment(Environment::Development));
    }

    #[test]
    fn test_unparsable_value_is_an_error() {
        let err = ShipperConfig::from_lookup(lookup_from(&[("MAX_RETRIES", "many")]))
            .expect_err("must reject");
        assert!(err.to_string().contains("MAX_RETRIES"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = ShipperConfig {
            max_queue_size: 0,
            ..ShipperConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ShipperError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_webhook_for_class() {
        let config = ShipperConfig {
            error_webhook: Some("e".into()),
            info_webhook: Some("i".into()),
            ..ShipperConfig::default()
        };
        assert_eq!(config.webhook_for(SeverityClass::Error), Some("e"));
        assert_eq!(config.webhook_for(SeverityClass::Info), Some("i"));
    }
}

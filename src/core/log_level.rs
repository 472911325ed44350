//! Log level and severity class definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Default)]
pub enum LogLevel {
    #[default]
    Info = 0,
    Error = 1,
    Critical = 2,
}

impl LogLevel {
    pub fn to_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Queue (and destination) this level is routed to
    pub fn class(&self) -> SeverityClass {
        match self {
            LogLevel::Info => SeverityClass::Info,
            LogLevel::Error | LogLevel::Critical => SeverityClass::Error,
        }
    }

    /// Critical records are delivered one payload per message
    pub fn is_critical(&self) -> bool {
        matches!(self, LogLevel::Critical)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INFO" => Ok(LogLevel::Info),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            _ => Err(format!("Invalid log level: '{}'", s)),
        }
    }
}

/// Two-tier grouping used to select a queue and a webhook destination
///
/// `Error` aggregates ERROR and CRITICAL records, `Info` aggregates INFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeverityClass {
    Error,
    Info,
}

impl SeverityClass {
    /// Drain order of a flush cycle
    pub const ALL: [SeverityClass; 2] = [SeverityClass::Error, SeverityClass::Info];

    pub fn to_str(&self) -> &'static str {
        match self {
            SeverityClass::Error => "ERROR",
            SeverityClass::Info => "INFO",
        }
    }
}

impl fmt::Display for SeverityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Severity of a log record.
///
/// Every format-specific severity folds into this five-level vocabulary.
/// Serialized as the upper-case name (`"WARN"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown log level '{0}' (expected one of DEBUG, INFO, WARN, WARNING, ERROR, CRITICAL, FATAL)")]
pub struct UnknownLevel(pub String);

/// Syslog severity 0..=7 mapped onto the vocabulary.
const SYSLOG_SEVERITY_LEVELS: [LogLevel; 8] = [
    LogLevel::Critical, // emergency
    LogLevel::Critical, // alert
    LogLevel::Critical, // critical
    LogLevel::Error,
    LogLevel::Warn,
    LogLevel::Info, // notice
    LogLevel::Info,
    LogLevel::Debug,
];

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Fold an arbitrary severity label into the vocabulary.
    ///
    /// Matching is case-insensitive. Aliases (`WARNING`, `FATAL`, `CRIT`, `ERR`,
    /// `NOTICE`, `TRACE`) map to their canonical level and anything unrecognized
    /// becomes `Info`.
    pub fn normalize(raw: &str) -> Self {
        Self::lookup(raw).unwrap_or(LogLevel::Info)
    }

    /// Level for a syslog severity digit. Out-of-range values fall back to `Info`.
    pub fn from_syslog_severity(severity: u8) -> Self {
        SYSLOG_SEVERITY_LEVELS
            .get(severity as usize)
            .copied()
            .unwrap_or(LogLevel::Info)
    }

    /// Level implied by an HTTP status code.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            0..=399 => LogLevel::Info,
            400..=499 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }

    fn lookup(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        let level = match upper.as_str() {
            "DEBUG" | "TRACE" => LogLevel::Debug,
            "INFO" | "NOTICE" => LogLevel::Info,
            "WARN" | "WARNING" => LogLevel::Warn,
            "ERROR" | "ERR" => LogLevel::Error,
            "CRITICAL" | "CRIT" | "FATAL" => LogLevel::Critical,
            _ => return None,
        };
        Some(level)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parsing used where callers hand us an explicit level.
impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            _ => Err(UnknownLevel(s.to_string())),
        }
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(LogLevel::normalize(&raw))
    }
}

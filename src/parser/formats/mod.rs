//! Format-specific log parsers.
//!
//! This module provides one parser per supported line format:
//! - Structured objects (one JSON object per line)
//! - Access logs (Common and Combined log format)
//! - Structured events (syslog RFC 5424 and RFC 3164)
//! - User patterns (caller-supplied regex with named groups)

mod access_log;
mod structured_event;
mod structured_object;
mod user_pattern;

use super::error::ParseError;
use crate::domain::LogRecord;
use serde::Serialize;

pub use access_log::AccessLogParser;
pub use structured_event::StructuredEventParser;
pub use structured_object::StructuredObjectParser;
pub use user_pattern::{PatternValidation, UserPatternParser};

/// Which family a parser belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    StructuredObject,
    AccessLog,
    StructuredEvent,
    UserPattern,
}

/// Trait for line-format parsers.
///
/// Implementations are stateless: `can_parse` and `parse` never mutate
/// shared state and may be called concurrently.
pub trait LogParser: Send + Sync {
    /// Stable identifier used for lookup and for `metadata.parser`.
    fn name(&self) -> &str;

    fn kind(&self) -> ParserKind;

    /// Parse one raw line. A line in another format yields a
    /// format-mismatch error, never a panic.
    fn parse(&self, raw: &str) -> Result<LogRecord, ParseError>;

    /// Priority for auto-detection (higher = tried first).
    /// Default is 50. Range: 0-100.
    fn detection_priority(&self) -> u8 {
        50
    }

    /// Cheap check used by auto-detection.
    fn can_parse(&self, raw: &str) -> bool;

    /// Source pattern for parsers built from one.
    fn pattern(&self) -> Option<&str> {
        None
    }
}

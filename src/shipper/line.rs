//! The shipper's fixed line grammar: `TIMESTAMP [LEVEL] source:application - message`.

use crate::domain::timestamp::parse_iso;
use crate::domain::{LogLevel, LogRecord};
use crate::parser::RegexError;
use crate::parser::regex_patterns::{BUILTIN_PATTERNS, pattern_index};
use thiserror::Error;

pub const SHIPPER_TAG: &str = "log-shipper";

#[derive(Error, Debug)]
pub enum LineRejected {
    #[error("line does not match 'TIMESTAMP [LEVEL] source:application - message'")]
    Grammar,

    #[error("unparseable timestamp '{0}'")]
    Timestamp(String),

    #[error(transparent)]
    Pattern(#[from] RegexError),
}

pub fn parse_line(line: &str, file: &str) -> Result<LogRecord, LineRejected> {
    let regex = BUILTIN_PATTERNS.get(pattern_index::SHIPPER_LINE)?;
    let captures = regex.captures(line.trim()).ok_or(LineRejected::Grammar)?;
    let field = |name: &str| captures.name(name).map_or("", |m| m.as_str());

    let raw_timestamp = field("timestamp");
    let timestamp =
        parse_iso(raw_timestamp).ok_or_else(|| LineRejected::Timestamp(raw_timestamp.to_string()))?;

    Ok(LogRecord::new(
        timestamp,
        LogLevel::normalize(field("level")),
        field("source"),
        field("application"),
        field("message").trim(),
    )
    .with_metadata("shipper", SHIPPER_TAG)
    .with_metadata("file", file))
}

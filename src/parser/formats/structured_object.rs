//! Parser for one-object-per-line structured logs.

use super::{LogParser, ParserKind};
use crate::domain::timestamp::parse_flexible;
use crate::domain::{LogLevel, LogRecord, Metadata};
use crate::parser::error::ParseError;
use chrono::Utc;
use serde_json::Value;

const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "time", "@timestamp", "ts", "datetime", "date"];
const LEVEL_ALIASES: &[&str] = &["level", "severity", "loglevel", "log_level"];
const SOURCE_ALIASES: &[&str] = &["source", "host", "hostname", "server", "instance"];
const APPLICATION_ALIASES: &[&str] = &["application", "app", "service", "component", "logger", "name"];
const MESSAGE_ALIASES: &[&str] = &["message", "msg", "text", "log", "event"];

const ALL_ALIASES: &[&[&str]] = &[
    TIMESTAMP_ALIASES,
    LEVEL_ALIASES,
    SOURCE_ALIASES,
    APPLICATION_ALIASES,
    MESSAGE_ALIASES,
];

pub const DEFAULT_SOURCE: &str = "json-log";
pub const DEFAULT_APPLICATION: &str = "unknown";

/// Parser for JSON object lines.
///
/// Base fields are pulled through priority-ordered alias lists (first present
/// alias wins); every key outside those lists lands in `metadata` unchanged.
#[derive(Debug, Default)]
pub struct StructuredObjectParser;

impl StructuredObjectParser {
    pub fn new() -> Self {
        Self
    }

    fn decode(raw: &str) -> Result<serde_json::Map<String, Value>, ParseError> {
        match serde_json::from_str::<Value>(raw.trim())? {
            Value::Object(object) => Ok(object),
            _ => Err(ParseError::NotAnObject),
        }
    }

    /// First alias present in the object, rendered as text. A `null` value
    /// counts as absent.
    fn extract(object: &serde_json::Map<String, Value>, aliases: &[&str]) -> Option<String> {
        let value = aliases.iter().find_map(|alias| object.get(*alias))?;
        match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn is_alias(key: &str) -> bool {
        ALL_ALIASES.iter().any(|list| list.contains(&key))
    }
}

impl LogParser for StructuredObjectParser {
    fn name(&self) -> &str {
        "json"
    }

    fn kind(&self) -> ParserKind {
        ParserKind::StructuredObject
    }

    fn parse(&self, raw: &str) -> Result<LogRecord, ParseError> {
        let object = Self::decode(raw)?;

        let timestamp = Self::extract(&object, TIMESTAMP_ALIASES)
            .and_then(|ts| parse_flexible(&ts))
            .unwrap_or_else(Utc::now);
        let level = Self::extract(&object, LEVEL_ALIASES)
            .map(|level| LogLevel::normalize(&level))
            .unwrap_or_default();
        let source =
            Self::extract(&object, SOURCE_ALIASES).unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        let application = Self::extract(&object, APPLICATION_ALIASES)
            .unwrap_or_else(|| DEFAULT_APPLICATION.to_string());
        let message = Self::extract(&object, MESSAGE_ALIASES)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| raw.trim().to_string());

        let metadata: Metadata = object
            .into_iter()
            .filter(|(key, _)| !Self::is_alias(key))
            .collect();

        let mut record = LogRecord::new(timestamp, level, source, application, message);
        record.extend_metadata(metadata);
        Ok(record)
    }

    fn detection_priority(&self) -> u8 {
        90
    }

    fn can_parse(&self, raw: &str) -> bool {
        let trimmed = raw.trim_start();
        trimmed.starts_with('{') && Self::decode(trimmed).is_ok()
    }
}

//! Apache/Nginx access log parser (Common and Combined log format).

use super::{LogParser, ParserKind};
use crate::domain::timestamp::parse_access_log;
use crate::domain::{LogLevel, LogRecord};
use crate::parser::error::ParseError;
use crate::parser::regex_patterns::{BUILTIN_PATTERNS, pattern_index};
use chrono::Utc;
use regex::Captures;
use serde_json::Value;

pub const ACCESS_LOG_APPLICATION: &str = "web-server";

/// Parser for web server access logs.
///
/// Combined is tried before Common because it is the stricter grammar.
#[derive(Debug, Default)]
pub struct AccessLogParser;

impl AccessLogParser {
    pub fn new() -> Self {
        Self
    }

    fn captures<'a>(&self, line: &'a str) -> Result<(Captures<'a>, bool), ParseError> {
        let combined = BUILTIN_PATTERNS.get(pattern_index::ACCESS_LOG_COMBINED)?;
        if let Some(captures) = combined.captures(line) {
            return Ok((captures, true));
        }

        let common = BUILTIN_PATTERNS.get(pattern_index::ACCESS_LOG_COMMON)?;
        if let Some(captures) = common.captures(line) {
            return Ok((captures, false));
        }

        Err(ParseError::no_match(self.name()))
    }

    /// Split `METHOD PATH PROTOCOL` into at most three tokens.
    fn split_request(request: &str) -> (String, String, String) {
        let mut parts = request.splitn(3, char::is_whitespace);
        let method = parts.next().filter(|s| !s.is_empty()).unwrap_or("GET");
        let path = parts.next().filter(|s| !s.is_empty()).unwrap_or("/");
        let protocol = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("HTTP/1.0");
        (method.to_string(), path.to_string(), protocol.to_string())
    }

    fn dash_to_null(value: &str) -> Value {
        if value == "-" {
            Value::Null
        } else {
            Value::from(value)
        }
    }
}

impl LogParser for AccessLogParser {
    fn name(&self) -> &str {
        "apache"
    }

    fn kind(&self) -> ParserKind {
        ParserKind::AccessLog
    }

    fn parse(&self, raw: &str) -> Result<LogRecord, ParseError> {
        let line = raw.trim();
        let (captures, is_combined) = self.captures(line)?;
        let field = |name: &str| captures.name(name).map_or("", |m| m.as_str());

        let (method, path, protocol) = Self::split_request(field("request"));
        let status: u16 = field("status")
            .parse()
            .map_err(|_| ParseError::no_match(self.name()))?;
        let size = match field("size") {
            "-" => "0",
            other => other,
        };
        let host = field("host");

        let timestamp = parse_access_log(field("time")).unwrap_or_else(Utc::now);
        let message = format!("{method} {path} {status} {size}");

        let mut record = LogRecord::new(
            timestamp,
            LogLevel::from_http_status(status),
            host,
            ACCESS_LOG_APPLICATION,
            message,
        )
        .with_metadata("ip", host)
        .with_metadata("method", method)
        .with_metadata("path", path)
        .with_metadata("protocol", protocol)
        .with_metadata("status_code", status)
        .with_metadata("response_size", size)
        .with_metadata("user", Self::dash_to_null(field("user")));

        if is_combined {
            record.insert_metadata("referrer", Self::dash_to_null(field("referrer")));
            record.insert_metadata("user_agent", Self::dash_to_null(field("agent")));
        }

        Ok(record)
    }

    fn detection_priority(&self) -> u8 {
        80
    }

    fn can_parse(&self, raw: &str) -> bool {
        let line = raw.trim();
        [
            pattern_index::ACCESS_LOG_COMBINED,
            pattern_index::ACCESS_LOG_COMMON,
        ]
        .iter()
        .any(|index| {
            BUILTIN_PATTERNS
                .get(*index)
                .is_ok_and(|regex| regex.is_match(line))
        })
    }
}

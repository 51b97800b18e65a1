//! Syslog parser (RFC 5424 with RFC 3164 fallback).

use super::{LogParser, ParserKind};
use crate::domain::timestamp::{parse_iso, parse_legacy_syslog};
use crate::domain::{LogLevel, LogRecord};
use crate::parser::error::ParseError;
use crate::parser::regex_patterns::{BUILTIN_PATTERNS, pattern_index};
use chrono::Utc;
use serde_json::Value;

/// Facility numbers with a well-known name.
const FACILITIES: &[(u32, &str)] = &[
    (0, "kern"),
    (1, "user"),
    (2, "mail"),
    (3, "daemon"),
    (4, "auth"),
    (5, "syslog"),
    (6, "lpr"),
    (7, "news"),
    (8, "uucp"),
    (9, "cron"),
    (10, "authpriv"),
    (11, "ftp"),
    (16, "local0"),
    (17, "local1"),
    (18, "local2"),
    (19, "local3"),
    (20, "local4"),
    (21, "local5"),
    (22, "local6"),
    (23, "local7"),
];

/// Decomposed `<PRI>` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub facility: u32,
    pub severity: u8,
}

impl Priority {
    pub fn from_pri(pri: u32) -> Self {
        Self {
            facility: pri / 8,
            severity: (pri % 8) as u8,
        }
    }

    pub fn facility_name(&self) -> String {
        FACILITIES
            .iter()
            .find(|(code, _)| *code == self.facility)
            .map_or_else(|| format!("unknown({})", self.facility), |(_, name)| (*name).to_string())
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_syslog_severity(self.severity)
    }
}

#[derive(Debug, Default)]
pub struct StructuredEventParser;

impl StructuredEventParser {
    pub fn new() -> Self {
        Self
    }

    fn priority(&self, raw: &str) -> Result<Priority, ParseError> {
        raw.parse::<u32>()
            .map(Priority::from_pri)
            .map_err(|_| ParseError::no_match(self.name()))
    }

    fn nil_to_null(value: &str) -> Value {
        if value == "-" {
            Value::Null
        } else {
            Value::from(value)
        }
    }

    fn parse_rfc5424(&self, line: &str) -> Result<Option<LogRecord>, ParseError> {
        let regex = BUILTIN_PATTERNS.get(pattern_index::SYSLOG_RFC5424)?;
        let Some(captures) = regex.captures(line) else {
            return Ok(None);
        };
        let field = |name: &str| captures.name(name).map_or("", |m| m.as_str());

        let priority = self.priority(field("pri"))?;
        let timestamp = match field("timestamp") {
            "-" => None,
            ts => parse_iso(ts),
        }
        .unwrap_or_else(Utc::now);
        let source = match field("hostname") {
            "-" => "unknown",
            host => host,
        };
        let application = match field("appname") {
            "-" => "syslog",
            app => app,
        };

        let mut record = LogRecord::new(
            timestamp,
            priority.level(),
            source,
            application,
            Self::message_or_line(field("message"), line),
        )
        .with_metadata("facility", priority.facility_name())
        .with_metadata("severity", priority.severity)
        .with_metadata("version", field("version"))
        .with_metadata("procid", Self::nil_to_null(field("procid")))
        .with_metadata("msgid", Self::nil_to_null(field("msgid")));

        let structured = field("structured");
        if structured != "-" {
            record.insert_metadata("structured_data", structured);
        }

        Ok(Some(record))
    }

    fn parse_rfc3164(&self, line: &str) -> Result<Option<LogRecord>, ParseError> {
        let regex = BUILTIN_PATTERNS.get(pattern_index::SYSLOG_RFC3164)?;
        let Some(captures) = regex.captures(line) else {
            return Ok(None);
        };
        let field = |name: &str| captures.name(name).map_or("", |m| m.as_str());

        let priority = self.priority(field("pri"))?;
        let timestamp = parse_legacy_syslog(field("timestamp")).unwrap_or_else(Utc::now);
        let procid = captures
            .name("procid")
            .map_or(Value::Null, |m| Value::from(m.as_str()));

        let record = LogRecord::new(
            timestamp,
            priority.level(),
            field("hostname"),
            field("tag").trim(),
            Self::message_or_line(field("message"), line),
        )
        .with_metadata("facility", priority.facility_name())
        .with_metadata("severity", priority.severity)
        .with_metadata("procid", procid);

        Ok(Some(record))
    }

    fn message_or_line(message: &str, line: &str) -> String {
        let message = message.trim();
        if message.is_empty() {
            line.to_string()
        } else {
            message.to_string()
        }
    }
}

impl LogParser for StructuredEventParser {
    fn name(&self) -> &str {
        "syslog"
    }

    fn kind(&self) -> ParserKind {
        ParserKind::StructuredEvent
    }

    fn parse(&self, raw: &str) -> Result<LogRecord, ParseError> {
        let line = raw.trim();
        if let Some(record) = self.parse_rfc5424(line)? {
            return Ok(record);
        }
        if let Some(record) = self.parse_rfc3164(line)? {
            return Ok(record);
        }
        Err(ParseError::no_match(self.name()))
    }

    fn detection_priority(&self) -> u8 {
        70
    }

    /// `<PRI>` prefix: starts with `<` and closes within the first 10 characters.
    fn can_parse(&self, raw: &str) -> bool {
        let line = raw.trim();
        line.starts_with('<') && line.chars().take(10).any(|c| c == '>')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn test_rfc5424_priority_decomposition() {
        let parser = StructuredEventParser::new();
        let line = "<34>1 2025-11-11T16:00:00.000Z host app 1 - - hi";

        let record = parser.parse(line).unwrap();

        assert_eq!(record.level, LogLevel::Critical);
        assert_eq!(record.metadata["facility"], Value::from("auth"));
        assert_eq!(record.metadata["severity"], Value::from(2));
        assert_eq!(record.metadata["version"], Value::from("1"));
        assert_eq!(record.metadata["procid"], Value::from("1"));
        assert_eq!(record.metadata["msgid"], Value::Null);
        assert!(!record.metadata.contains_key("structured_data"));
        assert_eq!(record.source, "host");
        assert_eq!(record.application, "app");
        assert_eq!(record.message, "hi");
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2025, 11, 11, 16, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_rfc5424_structured_data_and_nil_fields() {
        let parser = StructuredEventParser::new();
        let line = r#"<165>1 2025-11-11T16:00:00Z - - - ID47 [exampleSDID@32473 iut="3"] An application event"#;

        let record = parser.parse(line).unwrap();

        assert_eq!(record.level, LogLevel::Info);
        assert_eq!(record.metadata["facility"], Value::from("local4"));
        assert_eq!(record.source, "unknown");
        assert_eq!(record.application, "syslog");
        assert_eq!(
            record.metadata["structured_data"],
            Value::from(r#"[exampleSDID@32473 iut="3"]"#)
        );
        assert_eq!(record.message, "An application event");
    }

    #[test]
    fn test_rfc3164_fallback() {
        let parser = StructuredEventParser::new();
        let line = "<13>Nov 11 16:00:00 mymachine sshd[4242]: Accepted publickey";

        let record = parser.parse(line).unwrap();

        assert_eq!(record.level, LogLevel::Info);
        assert_eq!(record.source, "mymachine");
        assert_eq!(record.application, "sshd");
        assert_eq!(record.message, "Accepted publickey");
        assert_eq!(record.metadata["facility"], Value::from("user"));
        assert_eq!(record.metadata["procid"], Value::from("4242"));
        assert_eq!(record.timestamp.year(), Utc::now().year());
    }

    #[test]
    fn test_unknown_facility() {
        assert_eq!(Priority::from_pri(8 * 14 + 3).facility_name(), "unknown(14)");
        assert_eq!(Priority::from_pri(191).facility_name(), "local7");
        assert_eq!(Priority::from_pri(191).level(), LogLevel::Debug);
    }

    #[test]
    fn test_can_parse_requires_priority_prefix() {
        let parser = StructuredEventParser::new();

        assert!(parser.can_parse("<34>1 2025-11-11T16:00:00Z h a - - - x"));
        assert!(!parser.can_parse("no priority here"));
        assert!(!parser.can_parse("<notclosedwithinten"));
        assert!(parser.parse("<34> garbage").unwrap_err().is_format_mismatch());
    }
}

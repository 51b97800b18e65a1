//! Parser Registry
//!
//! Holds the built-in parsers in detection order plus a name-keyed set of
//! user-registered pattern parsers, and performs format auto-detection.

use super::error::ParseError;
use super::formats::{
    AccessLogParser, LogParser, ParserKind, PatternValidation, StructuredEventParser,
    StructuredObjectParser, UserPatternParser,
};
use super::regex_patterns::{PREDEFINED_PATTERNS, PredefinedPattern};
use crate::domain::LogRecord;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

pub const CUSTOM_PREFIX: &str = "custom:";

/// Listing entry returned by [`ParserRegistry::list_parsers`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParserInfo {
    pub name: String,
    pub kind: ParserKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Registry for log format parsers.
///
/// Built-ins are always consulted before custom parsers, so a line matching
/// both a built-in grammar and a generic custom pattern goes to the built-in.
pub struct ParserRegistry {
    /// Built-in parsers sorted by detection priority (highest first)
    builtins: Vec<Arc<dyn LogParser>>,
    /// Custom parsers in registration order, keyed by their bare name
    custom: RwLock<Vec<(String, Arc<UserPatternParser>)>>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ParserRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            builtins: Vec::new(),
            custom: RwLock::new(Vec::new()),
        }
    }

    /// Registry with the structured-object, access-log and structured-event parsers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtin(StructuredObjectParser::new());
        registry.register_builtin(AccessLogParser::new());
        registry.register_builtin(StructuredEventParser::new());
        registry
    }

    /// Register a built-in parser, keeping detection order sorted by priority.
    pub fn register_builtin<P: LogParser + 'static>(&mut self, parser: P) {
        let parser: Arc<dyn LogParser> = Arc::new(parser);
        let priority = parser.detection_priority();
        tracing::debug!(parser = parser.name(), priority, "Registered parser");

        self.builtins.push(parser);
        // Stable sort keeps registration order among equal priorities
        self.builtins
            .sort_by(|a, b| b.detection_priority().cmp(&a.detection_priority()));
    }

    /// Validate and register a custom pattern parser.
    ///
    /// Invalid patterns are rejected without touching the registry. An existing
    /// parser with the same name is replaced in place.
    pub fn add_custom_parser(
        &self,
        name: &str,
        pattern: &str,
    ) -> Result<PatternValidation, ParseError> {
        let parser = UserPatternParser::new(&format!("{CUSTOM_PREFIX}{name}"), pattern)?;
        let validation = parser.validate()?;
        for warning in &validation.warnings {
            tracing::warn!(parser = name, "{warning}");
        }

        let parser = Arc::new(parser);
        let mut custom = self.custom.write();
        if let Some(slot) = custom.iter_mut().find(|(existing, _)| existing == name) {
            slot.1 = parser;
        } else {
            custom.push((name.to_string(), parser));
        }
        tracing::info!(parser = name, groups = ?validation.groups, "Registered custom parser");
        Ok(validation)
    }

    /// Returns `true` when a parser with that name existed.
    pub fn remove_custom_parser(&self, name: &str) -> bool {
        let name = name.strip_prefix(CUSTOM_PREFIX).unwrap_or(name);
        let mut custom = self.custom.write();
        let before = custom.len();
        custom.retain(|(existing, _)| existing != name);
        before != custom.len()
    }

    /// Look up a parser by name.
    ///
    /// Built-in names are case-insensitive; custom parsers need the `custom:` prefix.
    pub fn get_parser(&self, name: &str) -> Option<Arc<dyn LogParser>> {
        if let Some(parser) = self
            .builtins
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
        {
            return Some(parser.clone());
        }

        let custom_name = name.strip_prefix(CUSTOM_PREFIX)?;
        self.custom
            .read()
            .iter()
            .find(|(existing, _)| existing == custom_name)
            .map(|(_, parser)| parser.clone() as Arc<dyn LogParser>)
    }

    /// Name of the first parser whose `can_parse` accepts the line.
    pub fn detect(&self, raw: &str) -> Option<String> {
        self.detect_parser(raw).map(|p| p.name().to_string())
    }

    /// First accepting built-in in priority order, else the first accepting custom parser.
    pub fn detect_parser(&self, raw: &str) -> Option<Arc<dyn LogParser>> {
        self.candidates()
            .into_iter()
            .find(|parser| parser.can_parse(raw))
            .inspect(|parser| {
                tracing::trace!(parser = parser.name(), "Auto-detected parser for log");
            })
    }

    /// Parse a line, either with the named parser or by auto-detection.
    ///
    /// Auto-detection tags `metadata.parser` with the winning parser's name. A
    /// parser that accepts the line in `can_parse` but then fails to parse it
    /// hands the line on to the next candidate.
    pub fn parse(&self, raw: &str, parser_name: Option<&str>) -> Result<LogRecord, ParseError> {
        if let Some(name) = parser_name {
            let parser = self
                .get_parser(name)
                .ok_or_else(|| ParseError::UnknownParser(name.to_string()))?;
            return parser.parse(raw);
        }

        for parser in self.candidates() {
            if !parser.can_parse(raw) {
                continue;
            }
            match parser.parse(raw) {
                Ok(mut record) => {
                    record.insert_metadata("parser", parser.name());
                    return Ok(record);
                }
                Err(e) if e.is_format_mismatch() => {
                    tracing::trace!(parser = parser.name(), error = %e, "Parser declined line");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ParseError::NoParserDetected)
    }

    pub fn list_parsers(&self) -> Vec<ParserInfo> {
        self.candidates()
            .into_iter()
            .map(|parser| ParserInfo {
                name: parser.name().to_string(),
                kind: parser.kind(),
                pattern: parser.pattern().map(str::to_string),
            })
            .collect()
    }

    pub fn predefined_patterns(&self) -> &'static [PredefinedPattern] {
        PREDEFINED_PATTERNS
    }

    pub fn has_parser(&self, name: &str) -> bool {
        self.get_parser(name).is_some()
    }

    /// Snapshot of every parser in detection order.
    fn candidates(&self) -> Vec<Arc<dyn LogParser>> {
        let custom = self.custom.read();
        let mut all = Vec::with_capacity(self.builtins.len() + custom.len());
        all.extend(self.builtins.iter().cloned());
        all.extend(
            custom
                .iter()
                .map(|(_, parser)| parser.clone() as Arc<dyn LogParser>),
        );
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogLevel;
    use chrono::Utc;

    // Mock parser for testing
    struct MockParser {
        name: &'static str,
        priority: u8,
        can_parse_fn: fn(&str) -> bool,
    }

    impl LogParser for MockParser {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> ParserKind {
            ParserKind::StructuredObject
        }

        fn parse(&self, log: &str) -> Result<LogRecord, ParseError> {
            Ok(LogRecord::new(Utc::now(), LogLevel::Info, "mock", self.name, log))
        }

        fn detection_priority(&self) -> u8 {
            self.priority
        }

        fn can_parse(&self, log: &str) -> bool {
            (self.can_parse_fn)(log)
        }
    }

    #[test]
    fn test_builtin_detection_order() {
        let registry = ParserRegistry::with_builtins();
        let names: Vec<String> = registry.list_parsers().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["json", "apache", "syslog"]);
    }

    #[test]
    fn test_auto_detection_priority() {
        let mut registry = ParserRegistry::new();

        registry.register_builtin(MockParser {
            name: "low",
            priority: 10,
            can_parse_fn: |_| true,
        });
        registry.register_builtin(MockParser {
            name: "high",
            priority: 90,
            can_parse_fn: |_| true,
        });
        registry.register_builtin(MockParser {
            name: "medium",
            priority: 50,
            can_parse_fn: |_| true,
        });

        assert_eq!(registry.detect("any log").as_deref(), Some("high"));
    }

    #[test]
    fn test_detect_formats() {
        let registry = ParserRegistry::with_builtins();

        assert_eq!(registry.detect(r#"{"msg":"x"}"#).as_deref(), Some("json"));
        assert_eq!(
            registry
                .detect(r#"192.168.1.1 - - [11/Nov/2025:16:00:00 +0000] "GET / HTTP/1.1" 200 1"#)
                .as_deref(),
            Some("apache")
        );
        assert_eq!(
            registry.detect("<34>1 2025-11-11T16:00:00Z h a - - - x").as_deref(),
            Some("syslog")
        );
        assert_eq!(registry.detect("free text"), None);
    }

    #[test]
    fn test_auto_parse_tags_parser_name() {
        let registry = ParserRegistry::with_builtins();

        let record = registry.parse(r#"{"message":"hello"}"#, None).unwrap();

        assert_eq!(record.metadata["parser"], serde_json::Value::from("json"));
    }

    #[test]
    fn test_builtin_wins_over_custom() {
        let registry = ParserRegistry::with_builtins();
        registry.add_custom_parser("anything", r"(?P<message>.+)").unwrap();

        let line = r#"192.168.1.1 - - [11/Nov/2025:16:00:00 +0000] "GET /health HTTP/1.1" 200 45"#;
        assert_eq!(registry.detect(line).as_deref(), Some("apache"));
        assert_eq!(registry.detect("free text").as_deref(), Some("custom:anything"));

        let record = registry.parse("free text", None).unwrap();
        assert_eq!(
            record.metadata["parser"],
            serde_json::Value::from("custom:anything")
        );
    }

    #[test]
    fn test_declining_parser_falls_through() {
        let registry = ParserRegistry::with_builtins();
        registry
            .add_custom_parser("bracketed", r"<(?P<level>\w+)> (?P<message>.+)")
            .unwrap();

        // Looks like syslog to can_parse, but neither syslog grammar matches.
        let record = registry.parse("<warn> cache miss", None).unwrap();

        assert_eq!(record.level, LogLevel::Warn);
        assert_eq!(
            record.metadata["parser"],
            serde_json::Value::from("custom:bracketed")
        );
    }

    #[test]
    fn test_invalid_custom_pattern_leaves_registry_untouched() {
        let registry = ParserRegistry::with_builtins();

        assert!(registry.add_custom_parser("nogroups", r"(\d+)").is_err());
        assert!(registry.add_custom_parser("broken", r"(?P<message>[").is_err());

        assert_eq!(registry.list_parsers().len(), 3);
        assert!(!registry.has_parser("custom:nogroups"));
    }

    #[test]
    fn test_get_and_remove_custom_parser() {
        let registry = ParserRegistry::with_builtins();
        registry
            .add_custom_parser("py", PREDEFINED_PATTERNS[3].pattern)
            .unwrap();

        assert!(registry.get_parser("JSON").is_some());
        assert!(registry.get_parser("custom:py").is_some());
        assert!(registry.get_parser("py").is_none());

        let listed = registry.list_parsers();
        assert_eq!(listed[3].name, "custom:py");
        assert_eq!(listed[3].pattern.as_deref(), Some(PREDEFINED_PATTERNS[3].pattern));

        assert!(registry.remove_custom_parser("py"));
        assert!(!registry.remove_custom_parser("py"));
        assert!(!registry.has_parser("custom:py"));
    }

    #[test]
    fn test_named_dispatch() {
        let registry = ParserRegistry::with_builtins();

        let record = registry
            .parse("<13>Nov 11 16:00:00 box cron: tick", Some("syslog"))
            .unwrap();
        assert_eq!(record.application, "cron");
        assert!(!record.metadata.contains_key("parser"));

        assert!(matches!(
            registry.parse("x", Some("nope")),
            Err(ParseError::UnknownParser(_))
        ));
        assert!(matches!(
            registry.parse("free text", None),
            Err(ParseError::NoParserDetected)
        ));
    }
}

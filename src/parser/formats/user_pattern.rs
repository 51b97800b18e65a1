//! Parser driven by a caller-supplied regex with named capture groups.

use super::{LogParser, ParserKind};
use crate::domain::timestamp::parse_flexible;
use crate::domain::{LogLevel, LogRecord, RESERVED_FIELDS};
use crate::parser::error::ParseError;
use crate::parser::regex_error::RegexError;
use chrono::Utc;
use regex::Regex;
use serde::Serialize;

pub const DEFAULT_SOURCE: &str = "custom-log";
pub const DEFAULT_APPLICATION: &str = "unknown";

const RECOMMENDED_GROUPS: [&str; 4] = ["timestamp", "level", "source", "application"];

/// Outcome of validating a user pattern. Warnings never block registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatternValidation {
    pub groups: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct UserPatternParser {
    name: String,
    pattern: String,
    regex: Regex,
}

impl std::fmt::Debug for UserPatternParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserPatternParser")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .finish()
    }
}

impl UserPatternParser {
    /// Compile a pattern. Matching is anchored at the start of the line.
    pub fn new(name: &str, pattern: &str) -> Result<Self, RegexError> {
        let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|source| {
            RegexError::CompilationFailed {
                pattern: pattern.to_string(),
                name: name.to_string(),
                source,
            }
        })?;

        Ok(Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Check the pattern's named groups.
    ///
    /// Having no named group at all is an error; a missing `message` group or
    /// missing recommended groups only produce warnings.
    pub fn validate(&self) -> Result<PatternValidation, RegexError> {
        let groups: Vec<String> = self
            .regex
            .capture_names()
            .flatten()
            .map(str::to_string)
            .collect();

        if groups.is_empty() {
            return Err(RegexError::NoNamedGroups {
                pattern: self.pattern.clone(),
            });
        }

        let mut warnings = Vec::new();
        if !groups.iter().any(|g| g == "message") {
            warnings.push("Pattern should include 'message' named group".to_string());
        }
        let missing: Vec<&str> = RECOMMENDED_GROUPS
            .iter()
            .copied()
            .filter(|g| !groups.iter().any(|name| name == g))
            .collect();
        if !missing.is_empty() {
            warnings.push(format!("Consider adding these groups: {}", missing.join(", ")));
        }

        Ok(PatternValidation { groups, warnings })
    }
}

impl LogParser for UserPatternParser {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ParserKind {
        ParserKind::UserPattern
    }

    fn parse(&self, raw: &str) -> Result<LogRecord, ParseError> {
        let line = raw.trim();
        let captures = self
            .regex
            .captures(line)
            .ok_or_else(|| ParseError::no_match(&self.name))?;
        let group = |name: &str| captures.name(name).map(|m| m.as_str());

        let timestamp = group("timestamp")
            .and_then(parse_flexible)
            .unwrap_or_else(Utc::now);
        let level = group("level").map(LogLevel::normalize).unwrap_or_default();
        let message = group("message")
            .filter(|m| !m.is_empty())
            .unwrap_or(line);

        let mut record = LogRecord::new(
            timestamp,
            level,
            group("source").unwrap_or(DEFAULT_SOURCE),
            group("application").unwrap_or(DEFAULT_APPLICATION),
            message,
        );

        for name in self.regex.capture_names().flatten() {
            if RESERVED_FIELDS.contains(&name) {
                continue;
            }
            if let Some(value) = captures.name(name) {
                record.insert_metadata(name, value.as_str());
            }
        }

        Ok(record)
    }

    fn detection_priority(&self) -> u8 {
        10
    }

    fn can_parse(&self, raw: &str) -> bool {
        self.regex.is_match(raw.trim())
    }

    fn pattern(&self) -> Option<&str> {
        Some(&self.pattern)
    }
}

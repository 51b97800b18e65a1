// Lazily compiled static regex patterns
use super::regex_error::RegexError;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Static regex pattern set compiled once on first use
pub struct StaticRegexSet {
    patterns: &'static [(&'static str, &'static str)], // (pattern, name)
    compiled: OnceLock<Result<Vec<Regex>, RegexError>>,
}

impl StaticRegexSet {
    pub const fn new(patterns: &'static [(&'static str, &'static str)]) -> Self {
        Self {
            patterns,
            compiled: OnceLock::new(),
        }
    }

    pub fn get(&self, index: usize) -> Result<&Regex, RegexError> {
        let compiled = self.compiled.get_or_init(|| {
            let mut regexes = Vec::with_capacity(self.patterns.len());

            for (pattern, name) in self.patterns {
                match Regex::new(pattern) {
                    Ok(regex) => regexes.push(regex),
                    Err(e) => {
                        return Err(RegexError::CompilationFailed {
                            pattern: (*pattern).to_string(),
                            name: (*name).to_string(),
                            source: e,
                        });
                    }
                }
            }

            Ok(regexes)
        });

        match compiled {
            Ok(regexes) => regexes.get(index).ok_or(RegexError::IndexOutOfBounds {
                index,
                max: regexes.len(),
            }),
            Err(e) => Err(e.clone()),
        }
    }

    pub fn get_by_name(&self, name: &str) -> Result<&Regex, RegexError> {
        let index = self
            .patterns
            .iter()
            .position(|(_, pattern_name)| *pattern_name == name)
            .ok_or(RegexError::PatternNotFound {
                name: name.to_string(),
            })?;

        self.get(index)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn pattern_names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(|(_, name)| *name).collect()
    }
}

/// Grammars used by the built-in parsers and the shipper.
pub static BUILTIN_PATTERNS: StaticRegexSet = StaticRegexSet::new(&[
    (
        r#"^(?P<host>[\d\.]+)\s+(?P<ident>\S+)\s+(?P<user>\S+)\s+\[(?P<time>[^\]]+)\]\s+"(?P<request>[^"]+)"\s+(?P<status>\d{3})\s+(?P<size>\S+)\s+"(?P<referrer>[^"]*)"\s+"(?P<agent>[^"]*)""#,
        "access_log_combined",
    ),
    (
        r#"^(?P<host>[\d\.]+)\s+(?P<ident>\S+)\s+(?P<user>\S+)\s+\[(?P<time>[^\]]+)\]\s+"(?P<request>[^"]+)"\s+(?P<status>\d{3})\s+(?P<size>\S+)"#,
        "access_log_common",
    ),
    (
        r"^<(?P<pri>\d+)>(?P<version>\d+)\s+(?P<timestamp>\S+)\s+(?P<hostname>\S+)\s+(?P<appname>\S+)\s+(?P<procid>\S+)\s+(?P<msgid>\S+)\s+(?P<structured>(?:\[.*?\]|-)+)\s*(?P<message>.*)$",
        "syslog_rfc5424",
    ),
    (
        r"^<(?P<pri>\d+)>(?P<timestamp>\w+\s+\d+\s+\d+:\d+:\d+)\s+(?P<hostname>\S+)\s+(?P<tag>[^\[:]+)(?:\[(?P<procid>\d+)\])?:\s*(?P<message>.*)$",
        "syslog_rfc3164",
    ),
    (
        r"^(?P<timestamp>\S+)\s+\[(?P<level>\w+)\]\s+(?P<source>[\w-]+):(?P<application>[\w-]+)\s+-\s+(?P<message>.+)$",
        "shipper_line",
    ),
]);

pub mod pattern_index {
    pub const ACCESS_LOG_COMBINED: usize = 0;
    pub const ACCESS_LOG_COMMON: usize = 1;
    pub const SYSLOG_RFC5424: usize = 2;
    pub const SYSLOG_RFC3164: usize = 3;
    pub const SHIPPER_LINE: usize = 4;
}

/// Ready-made user patterns for common application log layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PredefinedPattern {
    pub name: &'static str,
    pub pattern: &'static str,
    pub description: &'static str,
}

pub const PREDEFINED_PATTERNS: &[PredefinedPattern] = &[
    PredefinedPattern {
        name: "simple",
        pattern: r"(?P<timestamp>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}) \[(?P<level>\w+)\] (?P<message>.+)",
        description: "Simple format: 2025-11-11T16:00:00 [INFO] message",
    },
    PredefinedPattern {
        name: "with_source",
        pattern: r"(?P<timestamp>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) \[(?P<level>\w+)\] (?P<source>\S+) - (?P<message>.+)",
        description: "With source: 2025-11-11 16:00:00 [INFO] app-name - message",
    },
    PredefinedPattern {
        name: "java_style",
        pattern: r"(?P<timestamp>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2},\d{3}) (?P<level>\w+)\s+\[(?P<application>[^\]]+)\] (?P<message>.+)",
        description: "Java/Log4j style: 2025-11-11 16:00:00,123 INFO [AppName] message",
    },
    PredefinedPattern {
        name: "python_style",
        pattern: r"(?P<level>\w+):(?P<application>[^:]+):(?P<message>.+)",
        description: "Python logging: INFO:app_name:message",
    },
];

pub fn predefined_pattern(name: &str) -> Option<&'static PredefinedPattern> {
    PREDEFINED_PATTERNS.iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_patterns_compile() {
        for i in 0..BUILTIN_PATTERNS.len() {
            assert!(
                BUILTIN_PATTERNS.get(i).is_ok(),
                "Pattern at index {i} should compile"
            );
        }
    }

    #[test]
    fn test_pattern_index_constants_match_names() {
        let names = BUILTIN_PATTERNS.pattern_names();
        assert_eq!(names[pattern_index::ACCESS_LOG_COMBINED], "access_log_combined");
        assert_eq!(names[pattern_index::ACCESS_LOG_COMMON], "access_log_common");
        assert_eq!(names[pattern_index::SYSLOG_RFC5424], "syslog_rfc5424");
        assert_eq!(names[pattern_index::SYSLOG_RFC3164], "syslog_rfc3164");
        assert_eq!(names[pattern_index::SHIPPER_LINE], "shipper_line");
    }

    #[test]
    fn test_static_regex_set_get_by_name() {
        assert!(BUILTIN_PATTERNS.get_by_name("syslog_rfc5424").is_ok());
        assert!(matches!(
            BUILTIN_PATTERNS.get_by_name("nonexistent"),
            Err(RegexError::PatternNotFound { .. })
        ));
        assert!(matches!(
            BUILTIN_PATTERNS.get(99),
            Err(RegexError::IndexOutOfBounds { index: 99, .. })
        ));
    }

    #[test]
    fn test_static_regex_set_thread_safety() {
        use std::thread;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                thread::spawn(|| {
                    let regex = BUILTIN_PATTERNS
                        .get(pattern_index::SHIPPER_LINE)
                        .unwrap();
                    regex.is_match("2025-11-11T18:30:00Z [ERROR] web-01:user-api - boom")
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_invalid_regex_compilation() {
        static INVALID_PATTERNS: StaticRegexSet =
            StaticRegexSet::new(&[(r"[invalid regex pattern", "invalid_pattern")]);

        let result = INVALID_PATTERNS.get(0);

        if let Err(RegexError::CompilationFailed { pattern, name, .. }) = result {
            assert_eq!(pattern, "[invalid regex pattern");
            assert_eq!(name, "invalid_pattern");
        } else {
            panic!("Expected CompilationFailed error");
        }
    }

    #[test]
    fn test_predefined_patterns_compile_with_named_groups() {
        for predefined in PREDEFINED_PATTERNS {
            let regex = regex::Regex::new(predefined.pattern).unwrap();
            assert!(regex.capture_names().flatten().any(|n| n == "message"));
        }
        assert!(predefined_pattern("java_style").is_some());
        assert!(predefined_pattern("cobol_style").is_none());
    }
}

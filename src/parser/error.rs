use super::regex_error::RegexError;
use thiserror::Error;

/// Failures raised while turning a raw line into a `LogRecord`.
///
/// `NoMatch` is routine control flow: it drives auto-detection fallthrough
/// and is only surfaced to callers when every parser declines.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Line does not match the {parser} format")]
    NoMatch { parser: String },

    #[error("Structured line is not a key-value object")]
    NotAnObject,

    #[error("Invalid structured line: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("No parser recognized the line")]
    NoParserDetected,

    #[error("Unknown parser: {0}")]
    UnknownParser(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] RegexError),
}

impl ParseError {
    pub fn no_match(parser: &str) -> Self {
        ParseError::NoMatch {
            parser: parser.to_string(),
        }
    }

    /// True for errors that only mean "this parser does not apply".
    pub fn is_format_mismatch(&self) -> bool {
        matches!(
            self,
            ParseError::NoMatch { .. } | ParseError::NotAnObject | ParseError::InvalidJson(_)
        )
    }
}

pub mod error;
pub mod formats;
pub mod regex_error;
pub mod regex_patterns;
pub mod registry;

pub use error::ParseError;
pub use formats::{
    AccessLogParser, LogParser, ParserKind, PatternValidation, StructuredEventParser,
    StructuredObjectParser, UserPatternParser,
};
pub use regex_error::RegexError;
pub use regex_patterns::{PREDEFINED_PATTERNS, PredefinedPattern};
pub use registry::{CUSTOM_PREFIX, ParserInfo, ParserRegistry};

// Regex error handling for built-in and user-supplied patterns
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RegexError {
    #[error("Regex compilation failed for pattern '{pattern}' (name: {name}): {source}")]
    CompilationFailed {
        pattern: String,
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("Regex index out of bounds: {index} >= {max}")]
    IndexOutOfBounds { index: usize, max: usize },

    #[error("Regex pattern not found: {name}")]
    PatternNotFound { name: String },

    #[error("Pattern must contain at least one named group: {pattern}")]
    NoNamedGroups { pattern: String },
}

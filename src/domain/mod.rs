//! Domain layer for rask-log-pipeline.
//!
//! Contains the canonical types shared across all modules:
//! - `LogRecord`: The pipeline's core data type
//! - `StoredRecord`: A record after the store assigned its identity
//! - `LogLevel`: Five-level severity vocabulary (Debug/Info/Warn/Error/Critical)
//! - `PipelineError`: Top-level error type

pub mod error;
pub mod log_level;
pub mod log_record;
pub mod timestamp;

pub use error::PipelineError;
pub use log_level::{LogLevel, UnknownLevel};
pub use log_record::{LogRecord, Metadata, RESERVED_FIELDS, StoredRecord};

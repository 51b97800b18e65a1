//! Request bodies accepted by the ingestion endpoints.

use super::error::IngestError;
use crate::domain::timestamp::parse_iso;
use crate::domain::{LogLevel, LogRecord, Metadata};
use serde::Deserialize;

const MAX_LABEL_LEN: usize = 100;

/// One record as submitted by a client. Validated before it is queued.
#[derive(Debug, Clone, Deserialize)]
pub struct LogRecordPayload {
    pub timestamp: String,
    pub level: String,
    pub source: String,
    pub application: String,
    pub message: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl LogRecordPayload {
    pub fn into_record(self) -> Result<LogRecord, IngestError> {
        let timestamp = parse_iso(&self.timestamp).ok_or_else(|| {
            IngestError::Validation(format!("timestamp '{}' is not ISO 8601", self.timestamp))
        })?;
        let level: LogLevel = self.level.parse().map_err(|_| {
            IngestError::Validation(format!(
                "level must be one of DEBUG, INFO, WARN, WARNING, ERROR, CRITICAL, FATAL, got '{}'",
                self.level
            ))
        })?;
        check_label("source", &self.source)?;
        check_label("application", &self.application)?;
        if self.message.trim().is_empty() {
            return Err(IngestError::Validation("message must not be empty".to_string()));
        }

        let mut record = LogRecord::new(timestamp, level, self.source, self.application, self.message);
        if let Some(metadata) = self.metadata {
            record.extend_metadata(metadata);
        }
        Ok(record)
    }
}

fn check_label(field: &str, value: &str) -> Result<(), IngestError> {
    if value.trim().is_empty() {
        return Err(IngestError::Validation(format!("{field} must not be empty")));
    }
    if value.chars().count() > MAX_LABEL_LEN {
        return Err(IngestError::Validation(format!(
            "{field} must be at most {MAX_LABEL_LEN} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub raw_log: String,
    /// Parse with this parser instead of auto-detecting.
    #[serde(default)]
    pub parser: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomParserRequest {
    pub name: String,
    pub pattern: String,
}

use super::log_level::LogLevel;
use super::timestamp::iso8601;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open mapping of format-specific extras.
pub type Metadata = serde_json::Map<String, Value>;

/// Field names metadata keys may never shadow.
pub const RESERVED_FIELDS: [&str; 5] = ["timestamp", "level", "source", "application", "message"];

/// Canonical unit flowing through the pipeline.
///
/// Every record produced by a parser has all five base fields populated and
/// carries a (possibly empty) metadata map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub source: String,
    pub application: String,
    pub message: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl LogRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        level: LogLevel,
        source: impl Into<String>,
        application: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            level,
            source: source.into(),
            application: application.into(),
            message: message.into(),
            metadata: Metadata::new(),
        }
    }

    /// Insert a metadata entry. Keys that collide with a base field get a
    /// `meta_` prefix so the five fixed fields stay unambiguous.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let key = if RESERVED_FIELDS.contains(&key.as_str()) {
            format!("meta_{key}")
        } else {
            key
        };
        self.metadata.insert(key, value.into());
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_metadata(key, value);
        self
    }

    /// Re-key any colliding entries of an externally supplied map.
    pub fn extend_metadata(&mut self, extra: Metadata) {
        for (key, value) in extra {
            self.insert_metadata(key, value);
        }
    }
}

/// A record after the store committed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: LogRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> LogRecord {
        LogRecord::new(
            Utc.with_ymd_and_hms(2025, 11, 11, 16, 0, 0).unwrap(),
            LogLevel::Warn,
            "web-01",
            "api",
            "disk low",
        )
    }

    #[test]
    fn test_reserved_metadata_keys_are_prefixed() {
        let record = sample()
            .with_metadata("level", "debug")
            .with_metadata("status_code", 200);

        assert_eq!(record.metadata.get("meta_level"), Some(&Value::from("debug")));
        assert_eq!(record.metadata.get("status_code"), Some(&Value::from(200)));
        assert!(!record.metadata.contains_key("level"));
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["timestamp"], "2025-11-11T16:00:00Z");
        assert_eq!(json["level"], "WARN");
        assert_eq!(json["metadata"], serde_json::json!({}));
    }

    #[test]
    fn test_deserialize_accepts_naive_timestamp_and_missing_metadata() {
        let payload = r#"{"timestamp":"2025-11-11T16:00:00","level":"warning","source":"s","application":"a","message":"m"}"#;
        let record: LogRecord = serde_json::from_str(payload).unwrap();
        assert_eq!(record, LogRecord::new(sample().timestamp, LogLevel::Warn, "s", "a", "m"));
    }

    #[test]
    fn test_stored_record_flattens_base_fields() {
        let stored = StoredRecord {
            id: 7,
            created_at: sample().timestamp,
            record: sample(),
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["message"], "disk low");
    }
}

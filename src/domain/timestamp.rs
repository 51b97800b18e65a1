//! Timestamp grammars shared by parsers, the shipper and the ingestion layer.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

const NAIVE_ISO_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S,%3f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_ISO_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Parse an ISO 8601 timestamp.
///
/// Accepts RFC 3339, a trailing `Z`, numeric offsets with or without a colon,
/// naive date-times (taken as UTC) and bare dates (midnight UTC).
pub fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.len() < 10 {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Some(stripped) = text.strip_suffix('Z').or_else(|| text.strip_suffix('z')) {
        return parse_naive(stripped);
    }

    for format in OFFSET_ISO_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    parse_naive(text).or_else(|| {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    })
}

/// Parse any timestamp grammar a log line may carry.
///
/// Tries ISO 8601 first, then the access-log grammar (`11/Nov/2025:16:00:00`,
/// optionally followed by a zone), then the legacy syslog grammar
/// (`Nov 11 16:00:00`, current year).
pub fn parse_flexible(text: &str) -> Option<DateTime<Utc>> {
    parse_iso(text)
        .or_else(|| parse_access_log(text))
        .or_else(|| parse_legacy_syslog(text))
}

/// `11/Nov/2025:16:00:00 +0000` or `11/Nov/2025:16:00:00`.
pub fn parse_access_log(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_str(text, "%d/%b/%Y:%H:%M:%S %z") {
        return Some(dt.with_timezone(&Utc));
    }
    let first = text.split_whitespace().next()?;
    NaiveDateTime::parse_from_str(first, "%d/%b/%Y:%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// `Nov 11 16:00:00`, placed in the current year.
pub fn parse_legacy_syslog(text: &str) -> Option<DateTime<Utc>> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let with_year = format!("{} {normalized}", Utc::now().year());
    NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_naive(text: &str) -> Option<DateTime<Utc>> {
    NAIVE_ISO_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// Serde adapter: RFC 3339 on the way out, any ISO 8601 form on the way in.
pub mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_iso(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid ISO 8601 timestamp: {raw}")))
    }
}

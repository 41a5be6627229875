use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use thiserror::Error;

const NAIVE_TIMESTAMP_FORMATS: [&str; 4] =
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Clone, Error)]
#[error("Cannot interpret '{0}' as a calendar date or timestamp")]
pub struct MetricDateError(pub String);

/// Parses the date of a metric into its UTC calendar day.
///
/// Accepts a plain date (`2024-01-31`), an RFC 3339 timestamp (`2024-01-31T23:30:00-05:00`), or a naive timestamp
/// (`2024-01-31 23:30:00`), which is taken to be UTC. Timestamps are converted to UTC before being truncated, so the
/// first example above lands on `2024-02-01`.
pub fn parse_metric_date(value: &str) -> Result<NaiveDate, MetricDateError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc).date_naive());
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|ts| ts.date())
        .ok_or_else(|| MetricDateError(value.to_string()))
}

/// Parses an event timestamp into UTC. Naive timestamps are taken to be UTC, and a plain date means midnight UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, MetricDateError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Some(ts) = NAIVE_TIMESTAMP_FORMATS.iter().find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok()) {
        return Ok(Utc.from_utc_datetime(&ts));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)))
        .map_err(|_| MetricDateError(value.to_string()))
}

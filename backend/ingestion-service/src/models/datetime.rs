//! ClickHouse `DateTime` text representation.

use chrono::{DateTime, Utc};
use serde::Serializer;

/// Format accepted by ClickHouse `DateTime` columns in JSONEachRow inserts.
pub const CLICKHOUSE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_clickhouse(ts: &DateTime<Utc>) -> String {
    ts.format(CLICKHOUSE_DATETIME_FORMAT).to_string()
}

/// `serialize_with` adapter writing a UTC timestamp as `YYYY-MM-DD HH:MM:SS`.
pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_clickhouse(ts))
}

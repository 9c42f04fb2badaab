use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// CDC operation types from Debezium
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    /// c = create
    Create,
    /// u = update
    Update,
    /// d = delete
    Delete,
}

impl ChangeOp {
    /// Parse the raw single-character op code. Matching is exact: `"C"` is
    /// not a create.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "c" => Some(Self::Create),
            "u" => Some(Self::Update),
            "d" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn code(&self) -> OpCode {
        match self {
            Self::Create => OpCode::Create,
            Self::Update => OpCode::Update,
            Self::Delete => OpCode::Delete,
        }
    }
}

/// Debezium payload-only envelope for `app.users`.
///
/// `op` is kept raw so unknown codes survive decoding and are rejected by the
/// translator instead of the codec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEnvelope {
    /// Row image before the change (null for create)
    #[serde(default)]
    pub before: Option<RowImage>,

    /// Row image after the change (null for delete)
    #[serde(default)]
    pub after: Option<RowImage>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub source: SourceInfo,

    /// "c", "u" or "d"
    #[serde(default, deserialize_with = "null_as_default")]
    pub op: String,

    /// Event time in microseconds since the Unix epoch
    #[serde(default)]
    pub ts_us: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Postgres log sequence number of the change
    #[serde(default)]
    pub lsn: Option<u64>,

    #[serde(default)]
    pub ts_us: Option<i64>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub schema: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub table: String,
}

/// Snapshot of an `app.users` row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowImage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: u64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
}

/// Kafka message key emitted by the connector for `app.users`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKey {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: u64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Operation code stored in the `_op` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(into = "u8")]
pub enum OpCode {
    Unspecified = 0,
    Create = 1,
    Update = 2,
    Delete = 3,
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as u8
    }
}

/// Row written to `app.users_cur`.
///
/// The sink resolves versions at query time by (`_lsn`, `_op`), so inserting
/// the same row twice is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalRow {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub is_deleted: u8,
    #[serde(rename = "_op")]
    pub op: OpCode,
    #[serde(rename = "_lsn")]
    pub lsn: u64,
    #[serde(rename = "_ts", serialize_with = "crate::models::datetime::serialize")]
    pub ts: DateTime<Utc>,
}

impl CanonicalRow {
    pub fn is_deleted(&self) -> bool {
        self.is_deleted == 1
    }
}

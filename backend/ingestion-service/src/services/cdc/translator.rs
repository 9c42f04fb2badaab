//! Envelope to canonical row translation.
//!
//! Translation never fails with an error: envelopes that cannot become a row
//! are reported as a [`DropReason`] and the caller skips the message.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::models::{CanonicalRow, ChangeEnvelope, ChangeOp, MessageKey};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("missing 'after' image for op={0}")]
    MissingAfterImage(String),

    #[error("unknown op={0:?}")]
    UnknownOp(String),
}

impl DropReason {
    /// Metric label for this reason.
    pub fn label(&self) -> &'static str {
        match self {
            DropReason::MissingAfterImage(_) => "missing_after_image",
            DropReason::UnknownOp(_) => "unknown_op",
        }
    }
}

/// Translate a decoded envelope and its raw message key into a row.
pub fn translate(
    envelope: ChangeEnvelope,
    key: Option<&[u8]>,
) -> Result<CanonicalRow, DropReason> {
    let lsn = envelope.source.lsn.unwrap_or(0);
    let ts = envelope
        .ts_us
        .and_then(DateTime::<Utc>::from_timestamp_micros)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let op = ChangeOp::parse(&envelope.op)
        .ok_or_else(|| DropReason::UnknownOp(envelope.op.clone()))?;

    match op {
        ChangeOp::Create | ChangeOp::Update => {
            let after = envelope
                .after
                .ok_or_else(|| DropReason::MissingAfterImage(envelope.op.clone()))?;
            Ok(CanonicalRow {
                id: after.id,
                name: after.name,
                email: after.email,
                is_deleted: 0,
                op: op.code(),
                lsn,
                ts,
            })
        }
        ChangeOp::Delete => {
            let id = envelope
                .before
                .as_ref()
                .map(|before| before.id)
                .filter(|id| *id != 0)
                .or_else(|| key.and_then(key_id))
                .unwrap_or(0);
            Ok(CanonicalRow {
                id,
                name: String::new(),
                email: String::new(),
                is_deleted: 1,
                op: op.code(),
                lsn,
                ts,
            })
        }
    }
}

fn key_id(key: &[u8]) -> Option<u64> {
    serde_json::from_slice::<MessageKey>(key).ok().map(|k| k.id)
}

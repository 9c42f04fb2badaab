//! Change envelope decoding.

use thiserror::Error;

use super::models::ChangeEnvelope;

#[derive(Debug, Error)]
#[error("malformed change payload: {0}")]
pub struct MalformedPayload(#[source] serde_json::Error);

/// Decode a message value into a [`ChangeEnvelope`].
///
/// Some connector configurations emit the envelope as a JSON string holding
/// the serialized object (`"{\"before\":...}"`). The value is decoded directly
/// first; on failure it is decoded as a string and its contents decoded again.
pub fn decode_envelope(bytes: &[u8]) -> Result<ChangeEnvelope, MalformedPayload> {
    let direct_err = match serde_json::from_slice::<ChangeEnvelope>(bytes) {
        Ok(envelope) => return Ok(envelope),
        Err(e) => e,
    };

    let inner: String = serde_json::from_slice(bytes).map_err(|_| MalformedPayload(direct_err))?;
    serde_json::from_str(&inner).map_err(MalformedPayload)
}

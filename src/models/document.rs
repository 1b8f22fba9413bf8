use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// A source document ready to hand to the model: base64 payload plus MIME type.
///
/// This is also the shape of the per-master "current document" cache, so a
/// continuation session can resume after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    /// Base64 (standard alphabet) encoded document bytes.
    pub payload: String,
    pub mime_type: String,
    /// Display name, usually the uploaded file name.
    pub name: String,
}

impl DocumentPayload {
    /// Wrap bytes that have already been validated and typed.
    pub fn from_bytes_unchecked(name: &str, bytes: &[u8], mime_type: &str) -> Self {
        Self {
            payload: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.to_string(),
            name: name.to_string(),
        }
    }

    /// Approximate decoded size, without decoding.
    pub fn decoded_len(&self) -> usize {
        self.payload.len() / 4 * 3
    }
}

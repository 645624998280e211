//! Transport codec.
//!
//! Documents and metadata cross a process boundary as command-line arguments
//! (or form fields), where quotes, newlines and non-ASCII text are easily
//! mangled. Both travel as standard-alphabet, padded base64 tokens.
//! Metadata is additionally serialised as compact JSON before encoding.
//!
//! Decoding is strict: only leading and trailing whitespace is tolerated.
//! Unpadded tokens, URL-safe characters (`-`, `_`) and embedded line breaks
//! are rejected rather than skipped, so senders must emit padded standard
//! base64 (Godot's `Marshalls.utf8_to_base64` does).
//!
//! Decoding failures are split in two so callers can tell them apart:
//!
//! * [`MemoryError::MalformedToken`] – the token is not valid base64 (or the
//!   decoded document is not UTF-8).
//! * [`MemoryError::MalformedMetadata`] – the token decoded fine but the
//!   payload is not a flat JSON object of scalars.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use lorekeeper_types::{MemoryError, Metadata};

pub fn encode(raw: &[u8]) -> String {
    STANDARD.encode(raw)
}

/// Decode a token produced by [`encode`]. Surrounding whitespace is ignored.
pub fn decode(token: &str) -> Result<Vec<u8>, MemoryError> {
    STANDARD
        .decode(token.trim())
        .map_err(|e| MemoryError::MalformedToken(e.to_string()))
}

pub fn encode_text(text: &str) -> String {
    encode(text.as_bytes())
}

/// Decode a token into UTF-8 text.
pub fn decode_text(token: &str) -> Result<String, MemoryError> {
    let bytes = decode(token)?;
    String::from_utf8(bytes).map_err(|e| MemoryError::MalformedToken(e.to_string()))
}

/// Decode a document token. An empty token means the caller sent no document.
pub fn decode_document(token: &str) -> Result<String, MemoryError> {
    if token.trim().is_empty() {
        return Err(MemoryError::MalformedToken("missing document".to_string()));
    }
    decode_text(token)
}

pub fn encode_metadata(metadata: &Metadata) -> Result<String, MemoryError> {
    let json = serde_json::to_string(metadata)
        .map_err(|e| MemoryError::MalformedMetadata(e.to_string()))?;
    Ok(encode(json.as_bytes()))
}

/// Decode a metadata token. An empty token is an empty mapping.
pub fn decode_metadata(token: &str) -> Result<Metadata, MemoryError> {
    if token.trim().is_empty() {
        return Ok(Metadata::new());
    }
    let bytes = decode(token)?;
    let json = String::from_utf8(bytes)
        .map_err(|e| MemoryError::MalformedMetadata(e.to_string()))?;
    serde_json::from_str(&json).map_err(|e| MemoryError::MalformedMetadata(e.to_string()))
}

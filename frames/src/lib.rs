//! Wire codec for the iTouch realtime socket.
//!
//! Inbound messages come in two shapes:
//!
//! - a plain UTF-8 JSON document, recognised by a leading `{` or `[`;
//! - a hybrid frame: six ASCII bytes holding the decimal length `L` of a JSON
//!   metadata block, then `L` bytes of metadata, then an opaque binary payload
//!   that replaces the metadata's `data` field.
//!
//! Outbound requests are always plain JSON. [`encode_hybrid`] exists so that
//! servers and tests can produce the binary shape.

use serde_json::{Map, Value};

/// Width of the ASCII length prefix on a hybrid frame.
pub const LENGTH_PREFIX_LEN: usize = 6;

/// Largest metadata block a six-digit prefix can describe.
pub const MAX_METADATA_LEN: usize = 999_999;

// Envelope keys.
pub const KEY_REQUEST_ID: &str = "requestId";
pub const KEY_TYPE: &str = "type";
pub const KEY_ERROR: &str = "error";
pub const KEY_EVENT: &str = "event";
pub const KEY_DATA: &str = "data";
pub const KEY_TIMEOUT: &str = "timeout";

/// `type` value that marks a failed call.
pub const TYPE_ERROR: &str = "error";

// =============================================================================
// ERRORS
// =============================================================================

/// Error returned by [`decode`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Hybrid frame shorter than its length prefix.
    #[error("frame too short: {len} bytes, need at least 6")]
    Truncated { len: usize },
    /// The length prefix is not a decimal integer.
    #[error("invalid metadata length prefix: {0:?}")]
    InvalidLength(String),
    /// The declared metadata block runs past the end of the buffer.
    #[error("metadata length {declared} exceeds the {available} bytes after the prefix")]
    LengthOverflow { declared: usize, available: usize },
    /// The JSON document or metadata block failed to parse.
    #[error("failed to parse frame JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Hybrid metadata must be a JSON object so the payload can be attached.
    #[error("hybrid frame metadata is not a JSON object")]
    MetadataNotObject,
}

/// Error returned by [`encode_hybrid`].
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// Serialized metadata does not fit the 6-digit length prefix.
    #[error("metadata is {0} bytes, the length prefix allows at most 999999")]
    MetadataTooLarge(usize),
    /// The metadata map failed to serialize.
    #[error("failed to serialize metadata: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// TYPES
// =============================================================================

/// Body of a reply or pushed event.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// `data` taken from a JSON document (`Null` when the field is absent).
    Json(Value),
    /// Trailing bytes of a hybrid frame.
    Binary(Vec<u8>),
}

impl Payload {
    /// The JSON value, or `None` for a binary payload.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Binary(_) => None,
        }
    }

    /// The raw bytes, or `None` for a JSON payload.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Json(_) => None,
            Self::Binary(bytes) => Some(bytes),
        }
    }

    /// Whether this came from a hybrid frame.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::Json(Value::Null)
    }
}

/// One decoded inbound message.
///
/// The routing fields are lifted out of the document; everything else the
/// server sent stays in `meta` exactly as received.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Envelope {
    /// Echo of the originating request. Absent on pushed events.
    pub request_id: Option<String>,
    /// The `type` field. `"error"` marks a failed call.
    pub kind: Option<String>,
    /// Failure message, present when `kind` is `"error"`.
    pub error: Option<String>,
    /// Name of a pushed notification.
    pub event: Option<String>,
    pub data: Payload,
    pub meta: Map<String, Value>,
}

impl Envelope {
    /// Whether the server reported a failure for this request.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind.as_deref() == Some(TYPE_ERROR)
    }

    /// Build an envelope from an already-parsed JSON document.
    ///
    /// Objects have their routing fields lifted out; any other document is
    /// carried whole as the payload.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut meta) = value else {
            return Self {
                data: Payload::Json(value),
                ..Self::default()
            };
        };

        let data = meta.remove(KEY_DATA).unwrap_or(Value::Null);
        Self {
            request_id: take_str(&mut meta, KEY_REQUEST_ID),
            kind: take_str(&mut meta, KEY_TYPE),
            error: take_str(&mut meta, KEY_ERROR),
            event: take_str(&mut meta, KEY_EVENT),
            data: Payload::Json(data),
            meta,
        }
    }
}

/// Remove `key` only when it holds a string; other types stay in `meta`.
fn take_str(meta: &mut Map<String, Value>, key: &str) -> Option<String> {
    if !meta.get(key).is_some_and(Value::is_string) {
        return None;
    }
    match meta.remove(key) {
        Some(Value::String(value)) => Some(value),
        _ => None,
    }
}

// =============================================================================
// DECODE
// =============================================================================

/// Whether `bytes` is a plain JSON document rather than a hybrid frame.
#[must_use]
pub fn is_json_frame(bytes: &[u8]) -> bool {
    matches!(bytes.first(), Some(b'{' | b'['))
}

/// Decode one inbound message.
///
/// # Errors
///
/// Returns a [`DecodeError`] when a hybrid frame is shorter than its prefix,
/// the prefix is not an integer, the declared length overruns the buffer, or
/// the JSON fails to parse.
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    if is_json_frame(bytes) {
        let value = serde_json::from_slice::<Value>(bytes)?;
        return Ok(Envelope::from_value(value));
    }
    decode_hybrid(bytes)
}

fn decode_hybrid(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    if bytes.len() < LENGTH_PREFIX_LEN {
        return Err(DecodeError::Truncated { len: bytes.len() });
    }

    let (prefix, rest) = bytes.split_at(LENGTH_PREFIX_LEN);
    let declared = parse_length_prefix(prefix)?;
    if declared > rest.len() {
        return Err(DecodeError::LengthOverflow {
            declared,
            available: rest.len(),
        });
    }

    let (metadata, payload) = rest.split_at(declared);
    let Value::Object(meta) = serde_json::from_slice::<Value>(metadata)? else {
        return Err(DecodeError::MetadataNotObject);
    };

    let mut envelope = Envelope::from_value(Value::Object(meta));
    envelope.data = Payload::Binary(payload.to_vec());
    Ok(envelope)
}

fn parse_length_prefix(prefix: &[u8]) -> Result<usize, DecodeError> {
    let text = String::from_utf8_lossy(prefix);
    let trimmed = text.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0');
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidLength(text.into_owned()));
    }
    trimmed
        .parse::<usize>()
        .map_err(|_| DecodeError::InvalidLength(text.into_owned()))
}

// =============================================================================
// ENCODE
// =============================================================================

/// Encode an outbound request as UTF-8 JSON.
///
/// Caller params are written first; `type`, `requestId` and `timeout` always
/// win over same-named params.
#[must_use]
pub fn encode_request(
    kind: &str,
    params: Map<String, Value>,
    request_id: &str,
    timeout_secs: u64,
) -> Vec<u8> {
    let mut body = params;
    body.insert(KEY_TYPE.to_owned(), Value::String(kind.to_owned()));
    body.insert(KEY_REQUEST_ID.to_owned(), Value::String(request_id.to_owned()));
    body.insert(KEY_TIMEOUT.to_owned(), Value::from(timeout_secs));

    // Serializing a `Map<String, Value>` into a Vec cannot fail: every key is
    // a string and every value is already valid JSON.
    serde_json::to_vec(&Value::Object(body)).unwrap_or_default()
}

/// Encode a hybrid frame: length prefix, metadata JSON, then `payload`.
///
/// # Errors
///
/// Returns [`EncodeError::MetadataTooLarge`] when the metadata does not fit
/// the six-digit prefix.
pub fn encode_hybrid(metadata: &Map<String, Value>, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let meta = serde_json::to_vec(metadata)?;
    if meta.len() > MAX_METADATA_LEN {
        return Err(EncodeError::MetadataTooLarge(meta.len()));
    }

    let mut out = Vec::with_capacity(LENGTH_PREFIX_LEN + meta.len() + payload.len());
    out.extend_from_slice(format!("{:>width$}", meta.len(), width = LENGTH_PREFIX_LEN).as_bytes());
    out.extend_from_slice(&meta);
    out.extend_from_slice(payload);
    Ok(out)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;

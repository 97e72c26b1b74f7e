use crate::location::LocationRecord;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

#[cfg(test)]
mod tests;

/// One inbound frame from the streaming connection.
///
/// The tag set is closed: anything else is an invalid frame and must be
/// dropped by the caller without tearing down the connection.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    /// Full snapshot of all current locations, sent once per new connection
    Initial { locations: Vec<LocationRecord> },
    /// Single entity's new location
    Update { location: LocationRecord },
    /// Human-readable server-side error
    Error { message: String },
}

/// Why a raw frame could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Frame is not structurally valid JSON
    NotJson(String),
    /// Frame has no string "type" field
    MissingType,
    /// "type" is outside the closed tag set
    UnknownType(String),
    /// Tag is known but its required payload is missing or malformed
    InvalidPayload { msg_type: String, reason: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotJson(e) => write!(f, "frame is not valid JSON: {}", e),
            DecodeError::MissingType => write!(f, "frame has no \"type\" field"),
            DecodeError::UnknownType(t) => write!(f, "unknown frame type '{}'", t),
            DecodeError::InvalidPayload { msg_type, reason } => {
                write!(f, "invalid payload for '{}' frame: {}", msg_type, reason)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a raw text frame into an [`InboundMessage`].
///
/// Pure function, no side effects. Validation is staged so the error names
/// the failing part: JSON structure, then the tag, then the tag's payload.
pub fn decode(raw: &str) -> Result<InboundMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::NotJson(e.to_string()))?;

    let msg_type = match value.get("type").and_then(|t| t.as_str()) {
        Some(t) => t.to_string(),
        None => return Err(DecodeError::MissingType),
    };

    match msg_type.as_str() {
        "initial" | "update" | "error" => {}
        other => return Err(DecodeError::UnknownType(other.to_string())),
    }

    serde_json::from_value(value).map_err(|e| DecodeError::InvalidPayload {
        msg_type,
        reason: e.to_string(),
    })
}

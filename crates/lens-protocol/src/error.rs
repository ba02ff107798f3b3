//! Error types for the OpenLens protocol.

use thiserror::Error;

/// Errors raised while parsing or building wire envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    MalformedFrame(String),
    #[error("envelope is missing the required `type` field")]
    MissingType,
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding shadow documents.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a document to JSON failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Parsing a received document failed.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The document parsed but is missing a required part — e.g. a
    /// delta without the target property, or metadata without the
    /// input sub-property's timestamp.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

//! # Error Types
//!
//! Errors raised while constructing or encoding message model values.

use thiserror::Error;

/// Errors raised when constructing model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Participant identifier failed validation.
    #[error("Identifier is not valid: {identifier}")]
    InvalidIdentifier { identifier: String },

    /// Participant or scope name is empty.
    #[error("Empty {field}")]
    Empty { field: &'static str },

    /// Fragment position outside its declared total.
    #[error("Invalid fragment: index {index} with total {total}")]
    InvalidFragment { index: u32, total: u32 },
}

/// Errors raised by the wire codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Value could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialize(String),

    /// Bytes could not be deserialized.
    #[error("Deserialization failed: {0}")]
    Deserialize(String),

    /// GZIP compression or decompression failed.
    #[error("Compression failed: {0}")]
    Compression(String),

    /// Decompressed content exceeds the decode limit.
    #[error("Decoded content exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// Text content is not valid Base64.
    #[error("Invalid Base64 content: {0}")]
    Base64(String),

    /// Decoded value violates a model invariant.
    #[error("Decoded value is invalid: {0}")]
    Invalid(#[from] ModelError),
}

//! # Wire Codec
//!
//! `WireUnit` <-> bytes. Binary transports (mail attachments) carry
//! `GZIP(bincode(unit))`; text transports (HTTP bodies) carry
//! `Base64(GZIP(bincode(unit)))`.

use crate::entities::WireUnit;
use crate::errors::CodecError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

/// Upper bound for decompressed content.
pub const MAX_DECODED_SIZE: usize = 64 * 1024 * 1024;

/// Serialize a value with bincode.
///
/// # Errors
///
/// `CodecError::Serialize` if bincode rejects the value.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Deserialize a bincode value.
///
/// # Errors
///
/// `CodecError::Deserialize` on malformed input.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
}

/// GZIP-compress bytes.
///
/// # Errors
///
/// `CodecError::Compression` if the encoder fails.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| CodecError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CodecError::Compression(e.to_string()))
}

/// Decompress GZIP bytes, bounded by [`MAX_DECODED_SIZE`].
///
/// # Errors
///
/// `CodecError::Compression` on corrupt input, `CodecError::TooLarge` past the bound.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    let limit = MAX_DECODED_SIZE as u64 + 1;
    GzDecoder::new(bytes)
        .take(limit)
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Compression(e.to_string()))?;
    if out.len() > MAX_DECODED_SIZE {
        return Err(CodecError::TooLarge {
            limit: MAX_DECODED_SIZE,
        });
    }
    Ok(out)
}

/// Encode a unit as a mail attachment.
///
/// # Errors
///
/// Serialization or compression failure.
pub fn encode_unit_gzip(unit: &WireUnit) -> Result<Vec<u8>, CodecError> {
    compress(&to_bytes(unit)?)
}

/// Decode a mail attachment and validate the result.
///
/// # Errors
///
/// Decompression, deserialization or validation failure.
pub fn decode_unit_gzip(bytes: &[u8]) -> Result<WireUnit, CodecError> {
    let unit: WireUnit = from_bytes(&decompress(bytes)?)?;
    unit.validate()?;
    Ok(unit)
}

/// Encode a unit as Base64 text.
///
/// # Errors
///
/// Serialization or compression failure.
pub fn encode_unit(unit: &WireUnit) -> Result<String, CodecError> {
    Ok(STANDARD.encode(encode_unit_gzip(unit)?))
}

/// Decode Base64 text into a validated unit.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Base64, decompression, deserialization or validation failure.
pub fn decode_unit(text: &str) -> Result<WireUnit, CodecError> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| CodecError::Base64(e.to_string()))?;
    decode_unit_gzip(&bytes)
}

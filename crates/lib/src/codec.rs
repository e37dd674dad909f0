//! Value codec.
//!
//! Encodes, decodes and clones plain value trees and binding snapshots as
//! DAG-CBOR. Map and Array wrappers never reach the codec directly; callers
//! substitute their binding snapshot ([`crate::binding::State`]) first.

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Errors raised by the value codec.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CodecError {
    /// A value could not be encoded (for example a non-finite float).
    #[error("Value encoding failed: {reason}")]
    EncodeFailed { reason: String },

    /// Bytes could not be decoded into the requested shape.
    #[error("Value decoding failed: {reason}")]
    DecodeFailed { reason: String },
}

impl CodecError {
    /// Check if this error happened while encoding
    pub fn is_encode_error(&self) -> bool {
        matches!(self, CodecError::EncodeFailed { .. })
    }

    /// Check if this error happened while decoding
    pub fn is_decode_error(&self) -> bool {
        matches!(self, CodecError::DecodeFailed { .. })
    }
}

impl From<CodecError> for crate::Error {
    fn from(err: CodecError) -> Self {
        crate::Error::Codec(err)
    }
}

/// Encodes a value to bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_ipld_dagcbor::to_vec(value).map_err(|e| CodecError::EncodeFailed {
        reason: e.to_string(),
    })
}

/// Decodes a value from bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_ipld_dagcbor::from_slice(bytes).map_err(|e| CodecError::DecodeFailed {
        reason: e.to_string(),
    })
}

/// Deep-clones a value through its encoded form.
pub fn clone<T: Serialize + DeserializeOwned>(value: &T) -> Result<T, CodecError> {
    decode(&encode(value)?)
}

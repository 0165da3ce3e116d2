//! Opaque state codec

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while encoding or decoding persisted state blobs
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("value does not match the expected schema: {0}")]
    Schema(#[from] serde_json::Error),
}

/// Encodes structured values to bytes and back.
///
/// Values cross the codec as `serde_json::Value` so that a single codec can be
/// shared by every registered service module; typed conversion happens in
/// [`encode_value`] and [`decode_value`].
pub trait Codec: Send + Sync {
    /// Encode a value into its persisted form
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    /// Decode a persisted blob
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// JSON codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))
    }
}

/// Encode a typed value with the given codec
pub fn encode_value<T: Serialize + ?Sized>(
    codec: &dyn Codec,
    value: &T,
) -> Result<Vec<u8>, CodecError> {
    let value = serde_json::to_value(value)?;
    codec.encode(&value)
}

/// Decode a blob into the schema `T`
pub fn decode_value<T: DeserializeOwned>(codec: &dyn Codec, bytes: &[u8]) -> Result<T, CodecError> {
    let value = codec.decode(bytes)?;
    Ok(serde_json::from_value(value)?)
}

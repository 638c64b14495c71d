//! Value encoding.
//!
//! A [`Codec`] turns records into the byte payloads stored under their keys
//! and back. [`JsonCodec`] is the default and stores records as JSON text.

use std::{error::Error as StdError, marker::PhantomData, sync::Arc};

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use typedkv_storage::BoxError;

/// Encoding or decoding failure.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// A record could not be turned into a payload.
    #[error("encode failed: {message}")]
    Encode {
        /// Description of the failure.
        message: String,
        /// Underlying error, when one exists.
        #[source]
        source: Option<BoxError>,
    },

    /// A payload could not be turned back into a record.
    #[error("decode failed: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
        /// Underlying error, when one exists.
        #[source]
        source: Option<BoxError>,
    },
}

impl CodecError {
    /// Creates an [`CodecError::Encode`] without a source.
    #[must_use]
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode { message: message.into(), source: None }
    }

    /// Creates a [`CodecError::Decode`] without a source.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode { message: message.into(), source: None }
    }

    fn encode_with_source(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Encode { message: source.to_string(), source: Some(Arc::new(source)) }
    }

    fn decode_with_source(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Decode { message: source.to_string(), source: Some(Arc::new(source)) }
    }
}

/// Converts records of type `T` to and from stored payloads.
pub trait Codec<T>: Send + Sync {
    /// Encodes `value` into a payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the value cannot be represented.
    fn encode(&self, value: &T) -> Result<Bytes, CodecError>;

    /// Decodes a payload into a record.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the payload is not a valid `T`.
    fn decode(&self, payload: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec backed by `serde_json`.
///
/// # Example
///
/// ```
/// use typedkv_provider::{Codec, JsonCodec};
///
/// let payload = Codec::<Vec<u32>>::encode(&JsonCodec, &vec![1, 2]).unwrap();
/// assert_eq!(payload.as_ref(), b"[1,2]");
///
/// let decoded: Vec<u32> = JsonCodec.decode(&payload).unwrap();
/// assert_eq!(decoded, vec![1, 2]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Bytes, CodecError> {
        serde_json::to_vec(value).map(Bytes::from).map_err(CodecError::encode_with_source)
    }

    fn decode(&self, payload: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(payload).map_err(CodecError::decode_with_source)
    }
}

/// Adapts a pair of functions into a [`Codec`].
///
/// Useful for payload formats that are not serde-based.
pub struct FnCodec<T, E, D> {
    encode: E,
    decode: D,
    _marker: PhantomData<fn() -> T>,
}

impl<T, E, D> FnCodec<T, E, D>
where
    E: Fn(&T) -> Result<Bytes, CodecError> + Send + Sync,
    D: Fn(&[u8]) -> Result<T, CodecError> + Send + Sync,
{
    /// Creates a codec from an encode and a decode function.
    pub fn new(encode: E, decode: D) -> Self {
        Self { encode, decode, _marker: PhantomData }
    }
}

impl<T, E, D> Codec<T> for FnCodec<T, E, D>
where
    E: Fn(&T) -> Result<Bytes, CodecError> + Send + Sync,
    D: Fn(&[u8]) -> Result<T, CodecError> + Send + Sync,
{
    fn encode(&self, value: &T) -> Result<Bytes, CodecError> {
        (self.encode)(value)
    }

    fn decode(&self, payload: &[u8]) -> Result<T, CodecError> {
        (self.decode)(payload)
    }
}

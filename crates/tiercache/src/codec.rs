//! Value serialization for cache storage.
//!
//! Values are encoded once by the manager and the resulting bytes are copied
//! into each tier. MessagePack (named fields) is the default for compact
//! storage; JSON is available when entries should be human-readable in Redis.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Wire format used to turn values into cache bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    #[serde(alias = "msgpack")]
    MessagePack,
    Json,
}

impl Codec {
    /// Encode a value into bytes.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CacheResult<Vec<u8>> {
        match self {
            Codec::MessagePack => rmp_serde::to_vec_named(value)
                .map_err(|e| CacheError::Serialization(e.to_string())),
            Codec::Json => {
                serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))
            }
        }
    }

    /// Decode bytes produced by [`Codec::encode`].
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CacheResult<T> {
        match self {
            Codec::MessagePack => {
                rmp_serde::from_slice(bytes).map_err(|e| CacheError::Deserialization(e.to_string()))
            }
            Codec::Json => serde_json::from_slice(bytes)
                .map_err(|e| CacheError::Deserialization(e.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::MessagePack => "messagepack",
            Codec::Json => "json",
        }
    }
}

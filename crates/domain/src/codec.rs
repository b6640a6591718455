//! Payload codecs for replication events.
//!
//! Both ends of a subject must agree on the codec. [`BincodeCodec`] is the
//! wire default; [`JsonCodec`] exists for debugging a stream by eye.
//!
//! | Codec   | Payload for created/updated | Payload for deleted |
//! |---------|-----------------------------|---------------------|
//! | bincode | `Post` fields in order      | id string           |
//! | json    | `Post` object               | id string           |

use std::sync::Arc;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::events::{EventKind, PostEvent};

/// Largest payload either codec will decode.
pub const MAX_PAYLOAD_BYTES: u64 = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bincode serialization/deserialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Payload of {size} bytes exceeds the 1 MiB limit")]
    TooLarge { size: usize },
}

pub trait PayloadCodec: Send + Sync + 'static {
    fn encode(&self, event: &PostEvent) -> Result<Vec<u8>, CodecError>;

    /// Decode a payload received on the subject of `kind`.
    fn decode(&self, kind: EventKind, data: &[u8]) -> Result<PostEvent, CodecError>;

    fn codec_id(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecType {
    #[default]
    Bincode,
    Json,
}

impl CodecType {
    pub fn create_codec(&self) -> Arc<dyn PayloadCodec> {
        match self {
            Self::Bincode => Arc::new(BincodeCodec),
            Self::Json => Arc::new(JsonCodec),
        }
    }
}

impl std::str::FromStr for CodecType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bincode" | "binary" => Ok(Self::Bincode),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown codec type: {}", s)),
        }
    }
}

impl std::fmt::Display for CodecType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bincode => write!(f, "bincode"),
            Self::Json => write!(f, "json"),
        }
    }
}

fn check_size(data: &[u8]) -> Result<(), CodecError> {
    if data.len() as u64 > MAX_PAYLOAD_BYTES {
        return Err(CodecError::TooLarge { size: data.len() });
    }
    Ok(())
}

/// Compact binary codec.
///
/// Fixed-width integers, a size limit, and trailing bytes after the record
/// are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    fn options() -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_limit(MAX_PAYLOAD_BYTES)
            .reject_trailing_bytes()
    }

    fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(Self::options().serialize(value)?)
    }

    fn from_bytes<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
        check_size(data)?;
        Ok(Self::options().deserialize(data)?)
    }
}

impl PayloadCodec for BincodeCodec {
    fn encode(&self, event: &PostEvent) -> Result<Vec<u8>, CodecError> {
        match event {
            PostEvent::Created(post) | PostEvent::Updated(post) => Self::to_bytes(post),
            PostEvent::Deleted(id) => Self::to_bytes(id),
        }
    }

    fn decode(&self, kind: EventKind, data: &[u8]) -> Result<PostEvent, CodecError> {
        Ok(match kind {
            EventKind::Created => PostEvent::Created(Self::from_bytes(data)?),
            EventKind::Updated => PostEvent::Updated(Self::from_bytes(data)?),
            EventKind::Deleted => PostEvent::Deleted(Self::from_bytes(data)?),
        })
    }

    fn codec_id(&self) -> &'static str {
        "bincode"
    }
}

/// Human-readable codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode(&self, event: &PostEvent) -> Result<Vec<u8>, CodecError> {
        Ok(match event {
            PostEvent::Created(post) | PostEvent::Updated(post) => serde_json::to_vec(post)?,
            PostEvent::Deleted(id) => serde_json::to_vec(id)?,
        })
    }

    fn decode(&self, kind: EventKind, data: &[u8]) -> Result<PostEvent, CodecError> {
        check_size(data)?;
        Ok(match kind {
            EventKind::Created => PostEvent::Created(serde_json::from_slice(data)?),
            EventKind::Updated => PostEvent::Updated(serde_json::from_slice(data)?),
            EventKind::Deleted => PostEvent::Deleted(serde_json::from_slice(data)?),
        })
    }

    fn codec_id(&self) -> &'static str {
        "json"
    }
}

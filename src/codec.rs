//! Versioned encoding of index entries.
//!
//! Every stored value is an envelope `{ "v": <schema version>, "body": <entry> }`.
//! Values written before versioning existed are bare entries and read back as
//! version 0. A value from a newer schema is refused instead of being misread.
//!
//! The encoding is detected on read, so a store written with one [`Codec`]
//! stays readable after switching to the other.

use crate::error::{Result, SubscriptionError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Current schema version of stored index entries.
pub const SCHEMA_VERSION: u16 = 1;

/// Wire encoding used for new writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// MessagePack with named fields.
    #[default]
    MessagePack,
    Json,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    v: u16,
    body: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    v: u16,
}

#[derive(Deserialize)]
struct Envelope<T> {
    body: T,
}

impl Codec {
    /// Encode `value` inside a current-version envelope.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let envelope = EnvelopeRef {
            v: SCHEMA_VERSION,
            body: value,
        };
        match self {
            Codec::MessagePack => Ok(rmp_serde::to_vec_named(&envelope)?),
            Codec::Json => Ok(serde_json::to_vec(&envelope)?),
        }
    }

    /// Decode a stored value written by either codec, with or without an envelope.
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(Self::decode_versioned(bytes)?.1)
    }

    /// Decode and report the schema version the value was written with.
    pub fn decode_versioned<T: DeserializeOwned>(bytes: &[u8]) -> Result<(u16, T)> {
        let codec = Self::detect(bytes)?;

        if let Ok(header) = codec.read::<EnvelopeHeader>(bytes) {
            if header.v > SCHEMA_VERSION {
                return Err(SubscriptionError::UnsupportedVersion {
                    found: header.v,
                    supported: SCHEMA_VERSION,
                });
            }
            if let Ok(envelope) = codec.read::<Envelope<T>>(bytes) {
                return Ok((header.v, envelope.body));
            }
        }

        // Pre-versioning value.
        Ok((0, codec.read::<T>(bytes)?))
    }

    /// A JSON object starts with `{`, which MessagePack never uses as the
    /// first byte of a map.
    pub fn detect(bytes: &[u8]) -> Result<Codec> {
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Ok(Codec::Json),
            Some(_) => Ok(Codec::MessagePack),
            None => Err(SubscriptionError::Deserialization(
                "empty stored value".into(),
            )),
        }
    }

    fn read<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Codec::MessagePack => Ok(rmp_serde::from_slice(bytes)?),
            Codec::Json => serde_json::from_slice(bytes)
                .map_err(|e| SubscriptionError::Deserialization(e.to_string())),
        }
    }
}

//! Pure data types shared between the codec and the bridge's runtime
//! components.

use serde::{Deserialize, Serialize};

/// Device identity, populated once per serial session by the startup
/// sequencer from a `SelfInfo` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub public_key: Vec<u8>,
    pub name: String,
}

impl DeviceIdentity {
    #[must_use]
    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

/// One buffered push frame, as persisted to the push-replay file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushEntry {
    #[serde(with = "base64_bytes")]
    pub frame: Vec<u8>,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        base64::engine::general_purpose::STANDARD
            .encode(bytes)
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

//! # Serde Helpers
//!
//! Transaction payloads are opaque bytes. JSON has no byte type, so we
//! write them as `0x`-prefixed hex, the same shape callers already use
//! for calldata. Use with `#[serde(with = "quorum_protocol::encoding::hex_bytes")]`.

/// `Vec<u8>` <-> `"0x..."` hex string.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::to_prefixed_hex(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::from_prefixed_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Encodes bytes as `0x`-prefixed lowercase hex. Empty input gives `"0x"`.
pub fn to_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decodes hex with an optional `0x` prefix.
pub fn from_prefixed_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
}

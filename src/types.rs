//! Core types for the fsmirror synchronization engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// ContentHash: opaque 256-bit content identifier of a remote record
pub type ContentHash = [u8; 32];

/// Identity of an account acting against the remote store (wallet address, key id, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Identity(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Identity::new(s)
    }
}

/// First 8 bytes of a hash, hex encoded. Used in logs and tables.
pub fn short_hash(hash: &ContentHash) -> String {
    hex::encode(&hash[..8])
}

/// Parse a 64-character hex string (optionally `0x`-prefixed) into a ContentHash.
pub fn parse_hash(s: &str) -> Result<ContentHash, String> {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|e| format!("invalid hex hash '{}': {}", s, e))?;
    if bytes.len() != 32 {
        return Err(format!(
            "invalid hash length for '{}': expected 32 bytes, got {}",
            s,
            bytes.len()
        ));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}

/// Serde adapter rendering hashes as hex strings in JSON/TOML.
pub mod hex_hash {
    use super::{parse_hash, ContentHash};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &ContentHash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ContentHash, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_hash(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::super::{parse_hash, ContentHash};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            hash: &Option<ContentHash>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match hash {
                Some(h) => serializer.serialize_some(&hex::encode(h)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<ContentHash>, D::Error> {
            let s = Option::<String>::deserialize(deserializer)?;
            s.map(|s| parse_hash(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }

    pub mod vec {
        use super::super::{parse_hash, ContentHash};
        use serde::ser::SerializeSeq;
        use serde::{Deserialize, Deserializer, Serializer};

        #[allow(clippy::ptr_arg)]
        pub fn serialize<S: Serializer>(
            hashes: &Vec<ContentHash>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(hashes.len()))?;
            for h in hashes {
                seq.serialize_element(&hex::encode(h))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<ContentHash>, D::Error> {
            let raw = Vec::<String>::deserialize(deserializer)?;
            raw.iter()
                .map(|s| parse_hash(s).map_err(serde::de::Error::custom))
                .collect()
        }
    }
}

//! Stable identifier newtypes for recorded entities.
//!
//! [`VersionId`] is a content address (hex-encoded 32-byte digest) and is
//! derived, never allocated. [`InvocationId`] is an opaque UUID v4 token
//! minted once per call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Length of a hex-encoded 32-byte digest.
const DIGEST_HEX_LEN: usize = 64;

/// Content-addressed identity of a program version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    /// Parses a hex digest, rejecting anything that is not 64 lowercase
    /// hex characters.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let valid = s.len() == DIGEST_HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(CoreError::InvalidId {
                kind: "version",
                value: s.to_string(),
            });
        }
        Ok(VersionId(s.to_string()))
    }

    /// Wraps an already-validated hex digest produced by the hashing layer.
    pub fn from_hex_unchecked(hex: String) -> Self {
        VersionId(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VersionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionId::parse(s)
    }
}

/// Opaque identity of one recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(pub Uuid);

impl InvocationId {
    /// Mints a fresh random token.
    pub fn new() -> Self {
        InvocationId(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(s)
            .map(InvocationId)
            .map_err(|_| CoreError::InvalidId {
                kind: "invocation",
                value: s.to_string(),
            })
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InvocationId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvocationId::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_id_accepts_hex_digest() {
        let hex = "ab".repeat(32);
        let id = VersionId::parse(&hex).unwrap();
        assert_eq!(id.as_str(), hex);
        assert_eq!(id.short(), "abababab");
    }

    #[test]
    fn version_id_rejects_bad_input() {
        assert!(VersionId::parse("abc").is_err());
        assert!(VersionId::parse(&"AB".repeat(32)).is_err());
        assert!(VersionId::parse(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn invocation_ids_are_fresh() {
        assert_ne!(InvocationId::new(), InvocationId::new());
    }

    #[test]
    fn invocation_id_display_parses_back() {
        let id = InvocationId::new();
        let parsed: InvocationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ids_serialize_transparently() {
        let hex = "0f".repeat(32);
        let id = VersionId::parse(&hex).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{}\"", hex));
    }
}

//! Common types shared by the fleet crates.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};

/// Unique identifier for a survey vessel.
///
/// Vessel ids are short human-assigned strings ("vessel-001"), so ordering
/// by id is plain lexicographic byte order, which is also the key order of
/// the storage trees.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct VesselId(String);

impl VesselId {
    /// Creates a VesselId, rejecting empty ids and ids containing NUL
    /// (NUL separates the id from the sequence number in waypoint keys).
    pub fn parse(raw: impl Into<String>) -> Result<Self, EnvError> {
        let raw = raw.into();
        if raw.is_empty() || raw.contains('\0') {
            return Err(EnvError::InvalidId(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the id as storage key bytes.
    pub fn as_key(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for VesselId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VesselId {
    type Error = EnvError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl From<VesselId> for String {
    fn from(id: VesselId) -> Self {
        id.0
    }
}

impl std::str::FromStr for VesselId {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

//! Tree names and key encoding for the persisted schema.
//!
//! | tree           | key                              | value         |
//! |----------------|----------------------------------|---------------|
//! | `vessel`       | vessel id                        | `Vessel`      |
//! | `vessel_state` | vessel id                        | `VesselState` |
//! | `route`        | vessel id                        | `Route`       |
//! | `waypoint`     | vessel id, 0x00, sequence (BE)   | `Waypoint`    |
//! | `baseline`     | vessel id                        | `Baseline`    |
//! | `meta`         | `schema_version`                 | u32 (BE)      |
//!
//! Values are JSON. The waypoint key makes `(vessel_id, sequence)` unique
//! and makes a prefix scan return waypoints in sequence order.

use super::StoreError;
use fleet_env::VesselId;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const SCHEMA_VERSION: u32 = 1;

pub(crate) const VESSEL_TREE: &str = "vessel";
pub(crate) const STATE_TREE: &str = "vessel_state";
pub(crate) const ROUTE_TREE: &str = "route";
pub(crate) const WAYPOINT_TREE: &str = "waypoint";
pub(crate) const BASELINE_TREE: &str = "baseline";
pub(crate) const META_TREE: &str = "meta";

pub(crate) const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

/// Prefix shared by every waypoint key of one vessel.
pub(crate) fn waypoint_prefix(vessel_id: &VesselId) -> Vec<u8> {
    let mut key = Vec::with_capacity(vessel_id.as_key().len() + 1);
    key.extend_from_slice(vessel_id.as_key());
    key.push(0);
    key
}

pub(crate) fn waypoint_key(vessel_id: &VesselId, sequence: u32) -> Vec<u8> {
    let mut key = waypoint_prefix(vessel_id);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub(crate) fn decode_version(bytes: &[u8]) -> Result<u32, StoreError> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| StoreError::Integrity(format!("schema_version has {} bytes", bytes.len())))?;
    Ok(u32::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waypoint_keys_sort_by_sequence() {
        let id = VesselId::parse("vessel-001").unwrap();
        let keys: Vec<Vec<u8>> = [0u32, 1, 255, 256, 70_000].iter().map(|s| waypoint_key(&id, *s)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_prefix_does_not_leak_into_longer_ids() {
        // "vessel-1" must not prefix-match "vessel-10"
        let short = VesselId::parse("vessel-1").unwrap();
        let long = VesselId::parse("vessel-10").unwrap();
        assert!(!waypoint_key(&long, 0).starts_with(&waypoint_prefix(&short)));
    }
}

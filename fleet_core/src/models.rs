//! Persisted rows: vessels, their runtime state, routes and waypoints.
//!
//! Field names match the persisted schema contract verbatim, since external
//! tooling asserts against the stored JSON rows.

use crate::status;
use fleet_env::VesselId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operational status of a vessel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VesselStatus {
    /// Surveying at cruising speed, draining energy with travel
    Active,

    /// Station keeping at zero speed while energy recovers
    Charging,

    /// Administratively stationary (dockside)
    Maintenance,
}

impl VesselStatus {
    /// Returns the status name as stored.
    pub fn name(&self) -> &'static str {
        match self {
            VesselStatus::Active => "Active",
            VesselStatus::Charging => "Charging",
            VesselStatus::Maintenance => "Maintenance",
        }
    }
}

impl std::fmt::Display for VesselStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for VesselStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(VesselStatus::Active),
            "charging" => Ok(VesselStatus::Charging),
            "maintenance" => Ok(VesselStatus::Maintenance),
            _ => Err(format!("Unknown vessel status: {}", s)),
        }
    }
}

/// A storage-boundary range check that failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field} = {value} violates {rule}")]
pub struct ConstraintViolation {
    pub field: &'static str,
    pub value: String,
    pub rule: &'static str,
}

impl ConstraintViolation {
    fn new(field: &'static str, value: impl ToString, rule: &'static str) -> Self {
        Self {
            field,
            value: value.to_string(),
            rule,
        }
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64, rule: &'static str) -> Result<(), ConstraintViolation> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConstraintViolation::new(field, value, rule))
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConstraintViolation> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConstraintViolation::new(field, value, ">= 0"))
    }
}

fn check_position(latitude: f64, longitude: f64) -> Result<(), ConstraintViolation> {
    check_range("latitude", latitude, -90.0, 90.0, "[-90, 90]")?;
    check_range("longitude", longitude, -180.0, 180.0, "[-180, 180]")
}

/// Immutable identity and metadata of a survey vessel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vessel {
    pub id: VesselId,
    pub name: String,
    pub crew_count: u32,
    pub equipment: String,
    pub project: String,
    pub survey_type: String,
}

impl Vessel {
    pub fn validate(&self) -> Result<(), ConstraintViolation> {
        if self.crew_count == 0 {
            return Err(ConstraintViolation::new("crew_count", self.crew_count, "> 0"));
        }
        Ok(())
    }
}

/// Mutable runtime record, one per vessel.
///
/// Written only by scheduler ticks and by the bulk reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselState {
    pub vessel_id: VesselId,
    pub latitude: f64,
    pub longitude: f64,
    /// Degrees in [0, 360)
    pub heading: f64,
    pub speed_knots: f64,
    /// Cruising speed restored when the vessel returns to Active
    pub original_speed_knots: f64,
    /// Percent in [0, 100]
    pub energy_level: f64,
    pub status: VesselStatus,
    /// Human-readable speed, e.g. "12.0 knots"
    pub speed: String,
    /// Human-readable operating conditions
    pub conditions: String,
    /// Cumulative distance covered, nautical miles
    pub area_covered: f64,
    /// Distance travelled since the last waypoint arrival, nautical miles
    pub distance_since_waypoint: f64,
    pub current_waypoint_index: u32,
    /// Unix milliseconds of the last committed write
    pub last_updated: i64,
    /// Row version, bumped by the store on every committed write
    #[serde(default)]
    pub revision: u64,
}

impl VesselState {
    /// Checks every range the store enforces before a write.
    pub fn validate(&self) -> Result<(), ConstraintViolation> {
        check_position(self.latitude, self.longitude)?;
        if !(self.heading.is_finite() && self.heading >= 0.0 && self.heading < 360.0) {
            return Err(ConstraintViolation::new("heading", self.heading, "[0, 360)"));
        }
        check_non_negative("speed_knots", self.speed_knots)?;
        check_non_negative("original_speed_knots", self.original_speed_knots)?;
        check_range("energy_level", self.energy_level, 0.0, 100.0, "[0, 100]")?;
        check_non_negative("area_covered", self.area_covered)?;
        check_non_negative("distance_since_waypoint", self.distance_since_waypoint)?;
        Ok(())
    }

    /// Recomputes the human-readable `speed` and `conditions` strings.
    pub fn refresh_readout(&mut self) {
        let readout = status::describe(self.status, self.speed_knots);
        self.speed = readout.speed;
        self.conditions = readout.conditions;
    }
}

/// Display name of a vessel's patrol route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub vessel_id: VesselId,
    pub name: String,
}

/// One ordered point of a patrol route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: u64,
    pub vessel_id: VesselId,
    pub latitude: f64,
    pub longitude: f64,
    /// 0-based, contiguous, unique per vessel
    pub sequence: u32,
}

impl Waypoint {
    pub fn validate(&self) -> Result<(), ConstraintViolation> {
        check_position(self.latitude, self.longitude)
    }
}

/// Fixed initial state a vessel is restored to on reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub speed_knots: f64,
    pub original_speed_knots: f64,
    pub energy_level: f64,
    pub status: VesselStatus,
}

impl Baseline {
    /// Materializes the baseline as a state row at the first waypoint.
    pub fn to_state(&self, vessel_id: VesselId, now_ms: i64, revision: u64) -> VesselState {
        let mut state = VesselState {
            vessel_id,
            latitude: self.latitude,
            longitude: self.longitude,
            heading: self.heading,
            speed_knots: self.speed_knots,
            original_speed_knots: self.original_speed_knots,
            energy_level: self.energy_level,
            status: self.status,
            speed: String::new(),
            conditions: String::new(),
            area_covered: 0.0,
            distance_since_waypoint: 0.0,
            current_waypoint_index: 0,
            last_updated: now_ms,
            revision,
        };
        state.refresh_readout();
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> Baseline {
        Baseline {
            latitude: 56.0,
            longitude: 3.0,
            heading: 45.0,
            speed_knots: 12.0,
            original_speed_knots: 12.0,
            energy_level: 95.0,
            status: VesselStatus::Active,
        }
    }

    fn state() -> VesselState {
        baseline().to_state(VesselId::parse("vessel-001").unwrap(), 1_700_000_000_000, 0)
    }

    #[test]
    fn test_baseline_state_starts_at_first_waypoint() {
        let s = state();
        assert_eq!(s.current_waypoint_index, 0);
        assert_eq!(s.distance_since_waypoint, 0.0);
        assert_eq!(s.area_covered, 0.0);
        assert_eq!(s.speed, "12.0 knots");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_state_rejects_out_of_range_values() {
        let mut s = state();
        s.latitude = 90.5;
        assert_eq!(s.validate().unwrap_err().field, "latitude");

        let mut s = state();
        s.heading = 360.0;
        assert_eq!(s.validate().unwrap_err().field, "heading");

        let mut s = state();
        s.energy_level = -0.1;
        assert_eq!(s.validate().unwrap_err().field, "energy_level");

        let mut s = state();
        s.speed_knots = f64::NAN;
        assert_eq!(s.validate().unwrap_err().field, "speed_knots");
    }

    #[test]
    fn test_vessel_requires_crew() {
        let vessel = Vessel {
            id: VesselId::parse("vessel-009").unwrap(),
            name: "Ghost".to_string(),
            crew_count: 0,
            equipment: String::new(),
            project: String::new(),
            survey_type: String::new(),
        };
        let err = vessel.validate().unwrap_err();
        assert_eq!(err.to_string(), "crew_count = 0 violates > 0");
    }

    #[test]
    fn test_status_round_trips_through_name() {
        for status in [VesselStatus::Active, VesselStatus::Charging, VesselStatus::Maintenance] {
            assert_eq!(status.name().parse::<VesselStatus>().unwrap(), status);
        }
        assert!("drifting".parse::<VesselStatus>().is_err());
    }
}

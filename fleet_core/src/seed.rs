//! Fleet seed data and its validation.
//!
//! Seed data is checked before anything is written. Out-of-range values
//! are fatal at startup; nothing here is clamped into range.

use crate::models::{Baseline, ConstraintViolation, Vessel, VesselStatus, Waypoint};
use fleet_env::VesselId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Seed validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeedError {
    #[error("Vessel {vessel}: {violation}")]
    Constraint {
        vessel: VesselId,
        violation: ConstraintViolation,
    },

    #[error("Vessel {0} has an empty route")]
    EmptyRoute(VesselId),

    #[error("Vessel {0} appears more than once")]
    DuplicateVessel(VesselId),

    #[error("Failed to read seed file: {0}")]
    Io(String),

    #[error("Failed to parse seed file: {0}")]
    Parse(String),
}

/// One vessel with its route and baseline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselSeed {
    pub vessel: Vessel,
    pub route_name: String,
    /// `(latitude, longitude)` in sequence order
    pub waypoints: Vec<(f64, f64)>,
    pub baseline: Baseline,
}

impl VesselSeed {
    fn validate(&self) -> Result<(), SeedError> {
        let id = &self.vessel.id;
        let wrap = |violation| SeedError::Constraint {
            vessel: id.clone(),
            violation,
        };

        self.vessel.validate().map_err(wrap)?;
        if self.waypoints.is_empty() {
            return Err(SeedError::EmptyRoute(id.clone()));
        }
        for (sequence, (latitude, longitude)) in self.waypoints.iter().enumerate() {
            Waypoint {
                id: 0,
                vessel_id: id.clone(),
                latitude: *latitude,
                longitude: *longitude,
                sequence: sequence as u32,
            }
            .validate()
            .map_err(wrap)?;
        }
        self.baseline.to_state(id.clone(), 0, 0).validate().map_err(wrap)?;
        Ok(())
    }
}

/// The whole fleet as written on first start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSeed {
    pub vessels: Vec<VesselSeed>,
}

impl FleetSeed {
    /// Checks every vessel, route and baseline.
    pub fn validate(&self) -> Result<(), SeedError> {
        let mut seen = HashSet::new();
        for entry in &self.vessels {
            if !seen.insert(&entry.vessel.id) {
                return Err(SeedError::DuplicateVessel(entry.vessel.id.clone()));
            }
            entry.validate()?;
        }
        Ok(())
    }

    /// Looks up one vessel's seed.
    pub fn vessel(&self, id: &VesselId) -> Option<&VesselSeed> {
        self.vessels.iter().find(|v| &v.vessel.id == id)
    }

    /// Loads and validates a seed from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path).map_err(|e| SeedError::Io(e.to_string()))?;
        let seed: FleetSeed = serde_json::from_str(&raw).map_err(|e| SeedError::Parse(e.to_string()))?;
        seed.validate()?;
        Ok(seed)
    }

    /// The four-vessel North Sea survey fleet.
    ///
    /// Two vessels survey lawnmower boxes, one holds station while charging
    /// and one is docked in Aberdeen on a single-waypoint route.
    pub fn default_fleet() -> Self {
        Self {
            vessels: vec![
                survey_vessel(
                    "vessel-001",
                    "Ocean Surveyor",
                    12,
                    "Multibeam echosounder, side-scan sonar",
                    "Dogger Bank Wind Farm",
                    "Bathymetric",
                    "Dogger Bank Block A",
                    vec![(54.80, 2.00), (54.85, 2.00), (54.85, 2.10), (54.80, 2.10)],
                    Baseline {
                        latitude: 54.80,
                        longitude: 2.00,
                        heading: 0.0,
                        speed_knots: 12.0,
                        original_speed_knots: 12.0,
                        energy_level: 95.0,
                        status: VesselStatus::Active,
                    },
                ),
                survey_vessel(
                    "vessel-002",
                    "Sea Explorer",
                    8,
                    "Magnetometer, sub-bottom profiler",
                    "Forties Cable Route",
                    "Geophysical",
                    "Forties Corridor",
                    vec![(57.70, 1.00), (57.70, 1.15), (57.75, 1.15), (57.75, 1.00)],
                    Baseline {
                        latitude: 57.70,
                        longitude: 1.00,
                        heading: 90.0,
                        speed_knots: 10.0,
                        original_speed_knots: 10.0,
                        energy_level: 85.0,
                        status: VesselStatus::Active,
                    },
                ),
                survey_vessel(
                    "vessel-003",
                    "Coastal Mapper",
                    6,
                    "LiDAR, single-beam echosounder",
                    "Holderness Erosion Study",
                    "Hydrographic",
                    "Holderness Coast",
                    vec![(53.75, 0.15), (53.80, 0.10), (53.85, 0.05)],
                    Baseline {
                        latitude: 53.75,
                        longitude: 0.15,
                        heading: 0.0,
                        speed_knots: 0.0,
                        original_speed_knots: 8.0,
                        energy_level: 25.0,
                        status: VesselStatus::Charging,
                    },
                ),
                survey_vessel(
                    "vessel-004",
                    "Deep Scanner",
                    15,
                    "Work-class ROV, CTD rosette",
                    "Pipeline Integrity Inspection",
                    "Environmental",
                    "Aberdeen Harbour Berth",
                    vec![(57.14, -2.08)],
                    Baseline {
                        latitude: 57.14,
                        longitude: -2.08,
                        heading: 270.0,
                        speed_knots: 0.0,
                        original_speed_knots: 11.0,
                        energy_level: 60.0,
                        status: VesselStatus::Maintenance,
                    },
                ),
            ],
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn survey_vessel(
    id: &str,
    name: &str,
    crew_count: u32,
    equipment: &str,
    project: &str,
    survey_type: &str,
    route_name: &str,
    waypoints: Vec<(f64, f64)>,
    baseline: Baseline,
) -> VesselSeed {
    VesselSeed {
        vessel: Vessel {
            id: VesselId::parse(id).expect("literal vessel ids are valid"),
            name: name.to_string(),
            crew_count,
            equipment: equipment.to_string(),
            project: project.to_string(),
            survey_type: survey_type.to_string(),
        },
        route_name: route_name.to_string(),
        waypoints,
        baseline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fleet_is_valid() {
        let seed = FleetSeed::default_fleet();
        assert_eq!(seed.vessels.len(), 4);
        seed.validate().unwrap();
    }

    #[test]
    fn test_out_of_range_waypoint_is_fatal() {
        let mut seed = FleetSeed::default_fleet();
        seed.vessels[1].waypoints[2] = (91.0, 1.0);
        match seed.validate() {
            Err(SeedError::Constraint { vessel, violation }) => {
                assert_eq!(vessel.as_str(), "vessel-002");
                assert_eq!(violation.field, "latitude");
            }
            other => panic!("expected constraint error, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_baseline_is_not_clamped() {
        let mut seed = FleetSeed::default_fleet();
        seed.vessels[0].baseline.energy_level = 101.0;
        assert!(matches!(seed.validate(), Err(SeedError::Constraint { .. })));
    }

    #[test]
    fn test_empty_route_is_fatal() {
        let mut seed = FleetSeed::default_fleet();
        seed.vessels[2].waypoints.clear();
        assert_eq!(
            seed.validate(),
            Err(SeedError::EmptyRoute(VesselId::parse("vessel-003").unwrap()))
        );
    }

    #[test]
    fn test_duplicate_vessel_is_fatal() {
        let mut seed = FleetSeed::default_fleet();
        let copy = seed.vessels[0].clone();
        seed.vessels.push(copy);
        assert!(matches!(seed.validate(), Err(SeedError::DuplicateVessel(_))));
    }

    #[test]
    fn test_seed_file_with_invalid_id_is_fatal() {
        // "vessel-001\0b" would share vessel-001's waypoint key prefix
        for (n, bad_id) in ["", "vessel-001\u{0}b"].into_iter().enumerate() {
            let mut json = serde_json::to_value(FleetSeed::default_fleet()).unwrap();
            json["vessels"][1]["vessel"]["id"] = serde_json::Value::from(bad_id);

            let path = std::env::temp_dir().join(format!("fleet-seed-bad-{}-{}.json", std::process::id(), n));
            std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();
            let err = FleetSeed::from_json_file(&path).unwrap_err();
            assert!(matches!(err, SeedError::Parse(_)), "id {:?} gave {:?}", bad_id, err);
            let _ = std::fs::remove_file(&path);
        }
    }

    #[test]
    fn test_seed_file_round_trip() {
        let path = std::env::temp_dir().join(format!("fleet-seed-{}.json", std::process::id()));
        let seed = FleetSeed::default_fleet();
        std::fs::write(&path, serde_json::to_string_pretty(&seed).unwrap()).unwrap();

        let loaded = FleetSeed::from_json_file(&path).unwrap();
        assert_eq!(loaded, seed);
        let _ = std::fs::remove_file(&path);
    }
}

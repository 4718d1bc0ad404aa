//! The status machine: Active / Charging / Maintenance.
//!
//! Transitions are a pure function `(old_status, new_energy) -> new_status`
//! evaluated once per tick after navigation has settled the new energy
//! level. Energy is first classified into a band, then the band and the old
//! status are looked up in [`TRANSITION_TABLE`].
//!
//! ```text
//!   energy:  0 ─────── 25 ═══════════════ 75 ─────── 100
//!            Depleted  │    Hysteresis    │  Charged
//!
//!   Active ──(Depleted)──► Charging ──(Charged)──► Active
//! ```
//!
//! The gap between `charge_below` and `resume_at` keeps a vessel hovering
//! near one boundary from flapping between Active and Charging.

use crate::models::VesselStatus;
use serde::{Deserialize, Serialize};

/// Energy classification used by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnergyBand {
    /// At or below `charge_below`
    Depleted,
    /// Strictly between the two thresholds
    Hysteresis,
    /// At or above `resume_at`
    Charged,
}

/// How a status moves the vessel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedBehavior {
    /// Navigate at the original cruising speed, draining energy
    Cruise,
    /// Zero speed, no navigation, energy recovers
    StationKeeping,
    /// Zero speed, no navigation, energy untouched
    Docked,
}

impl VesselStatus {
    /// Returns the speed behavior associated with this status.
    pub fn behavior(&self) -> SpeedBehavior {
        match self {
            VesselStatus::Active => SpeedBehavior::Cruise,
            VesselStatus::Charging => SpeedBehavior::StationKeeping,
            VesselStatus::Maintenance => SpeedBehavior::Docked,
        }
    }
}

/// Every (status, band) pair and the status it leads to.
pub const TRANSITION_TABLE: [(VesselStatus, EnergyBand, VesselStatus); 9] = [
    (VesselStatus::Active, EnergyBand::Depleted, VesselStatus::Charging),
    (VesselStatus::Active, EnergyBand::Hysteresis, VesselStatus::Active),
    (VesselStatus::Active, EnergyBand::Charged, VesselStatus::Active),
    (VesselStatus::Charging, EnergyBand::Depleted, VesselStatus::Charging),
    (VesselStatus::Charging, EnergyBand::Hysteresis, VesselStatus::Charging),
    (VesselStatus::Charging, EnergyBand::Charged, VesselStatus::Active),
    (VesselStatus::Maintenance, EnergyBand::Depleted, VesselStatus::Maintenance),
    (VesselStatus::Maintenance, EnergyBand::Hysteresis, VesselStatus::Maintenance),
    (VesselStatus::Maintenance, EnergyBand::Charged, VesselStatus::Maintenance),
];

/// Energy thresholds for the Active/Charging hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusPolicy {
    /// An Active vessel at or below this level starts charging (percent)
    pub charge_below: f64,

    /// A Charging vessel at or above this level resumes surveying (percent)
    pub resume_at: f64,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            charge_below: 25.0,
            resume_at: 75.0,
        }
    }
}

impl StatusPolicy {
    /// Classifies an energy level.
    pub fn band(&self, energy: f64) -> EnergyBand {
        if energy <= self.charge_below {
            EnergyBand::Depleted
        } else if energy >= self.resume_at {
            EnergyBand::Charged
        } else {
            EnergyBand::Hysteresis
        }
    }

    /// Evaluates the transition for this tick.
    pub fn next(&self, old: VesselStatus, energy: f64) -> VesselStatus {
        let band = self.band(energy);
        TRANSITION_TABLE
            .iter()
            .find(|(from, b, _)| *from == old && *b == band)
            .map(|(_, _, to)| *to)
            .unwrap_or(old)
    }

    /// Checks the thresholds describe a real hysteresis band.
    pub fn is_consistent(&self) -> bool {
        (0.0..=100.0).contains(&self.charge_below)
            && (0.0..=100.0).contains(&self.resume_at)
            && self.charge_below < self.resume_at
    }
}

/// Human-readable speed and conditions strings for a vessel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readout {
    pub speed: String,
    pub conditions: String,
}

/// Builds the display strings for a status at a given speed.
pub fn describe(status: VesselStatus, speed_knots: f64) -> Readout {
    match status.behavior() {
        SpeedBehavior::Cruise => Readout {
            speed: format!("{:.1} knots", speed_knots),
            conditions: "Surveying on route".to_string(),
        },
        SpeedBehavior::StationKeeping => Readout {
            speed: "0.0 knots (station keeping)".to_string(),
            conditions: "Charging - holding position".to_string(),
        },
        SpeedBehavior::Docked => Readout {
            speed: "0.0 knots (docked)".to_string(),
            conditions: "Dockside maintenance".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUSES: [VesselStatus; 3] = [
        VesselStatus::Active,
        VesselStatus::Charging,
        VesselStatus::Maintenance,
    ];
    const BANDS: [EnergyBand; 3] = [EnergyBand::Depleted, EnergyBand::Hysteresis, EnergyBand::Charged];

    #[test]
    fn test_transition_table_is_total() {
        for status in STATUSES {
            for band in BANDS {
                let hits = TRANSITION_TABLE
                    .iter()
                    .filter(|(from, b, _)| *from == status && *b == band)
                    .count();
                assert_eq!(hits, 1, "{:?}/{:?} must appear exactly once", status, band);
            }
        }
    }

    #[test]
    fn test_band_boundaries_are_inclusive() {
        let policy = StatusPolicy::default();
        assert_eq!(policy.band(25.0), EnergyBand::Depleted);
        assert_eq!(policy.band(25.01), EnergyBand::Hysteresis);
        assert_eq!(policy.band(74.99), EnergyBand::Hysteresis);
        assert_eq!(policy.band(75.0), EnergyBand::Charged);
    }

    #[test]
    fn test_active_drops_to_charging_when_depleted() {
        let policy = StatusPolicy::default();
        assert_eq!(policy.next(VesselStatus::Active, 40.0), VesselStatus::Active);
        assert_eq!(policy.next(VesselStatus::Active, 25.0), VesselStatus::Charging);
        assert_eq!(policy.next(VesselStatus::Active, 0.0), VesselStatus::Charging);
    }

    #[test]
    fn test_hysteresis_prevents_flapping() {
        let policy = StatusPolicy::default();
        // Charging vessel recovering through the band stays put until 75%
        let mut status = VesselStatus::Charging;
        for energy in [26.0, 40.0, 60.0, 74.9] {
            status = policy.next(status, energy);
            assert_eq!(status, VesselStatus::Charging);
        }
        status = policy.next(status, 75.0);
        assert_eq!(status, VesselStatus::Active);

        // And an Active vessel draining back through the band keeps surveying
        for energy in [74.0, 50.0, 25.1] {
            status = policy.next(status, energy);
            assert_eq!(status, VesselStatus::Active);
        }
    }

    #[test]
    fn test_maintenance_ignores_energy() {
        let policy = StatusPolicy::default();
        for energy in [0.0, 50.0, 100.0] {
            assert_eq!(policy.next(VesselStatus::Maintenance, energy), VesselStatus::Maintenance);
        }
    }

    #[test]
    fn test_policy_consistency() {
        assert!(StatusPolicy::default().is_consistent());
        let inverted = StatusPolicy {
            charge_below: 80.0,
            resume_at: 70.0,
        };
        assert!(!inverted.is_consistent());
    }

    #[test]
    fn test_describe_by_behavior() {
        assert_eq!(describe(VesselStatus::Active, 11.0).speed, "11.0 knots");
        assert!(describe(VesselStatus::Charging, 0.0).speed.contains("station keeping"));
        assert_eq!(describe(VesselStatus::Maintenance, 0.0).conditions, "Dockside maintenance");
    }
}

//! The Navigation Engine - great-circle waypoint following
//!
//! Pure computation: given a vessel's state, its route and the elapsed
//! simulated time, produce the next state.
//!
//! # Arrival detection
//!
//! At high time compression a vessel's per-tick displacement can exceed any
//! fixed arrival radius, so it would overshoot, turn around, overshoot again
//! and never arrive. The arrival threshold therefore grows with the distance
//! travelled since the last waypoint:
//!
//! ```text
//! threshold = 0.15 nm + 1.5 × distance_since_waypoint
//! ```
//!
//! After an overshoot the accumulated distance already exceeds the remaining
//! gap, so the threshold outgrows the per-tick step and the vessel arrives.

use crate::models::{VesselState, Waypoint};
use fleet_env::VesselId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean earth radius in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Arrival radius with no distance travelled since the last waypoint.
pub const BASE_ARRIVAL_THRESHOLD_NM: f64 = 0.15;

/// Growth of the arrival radius per nautical mile travelled.
pub const THRESHOLD_TRAVEL_FACTOR: f64 = 1.5;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Navigation failures. All of them are configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NavigationError {
    #[error("Vessel {0} has no waypoints")]
    EmptyRoute(VesselId),

    #[error("Elapsed simulated time must be finite and non-negative, got {0}")]
    InvalidElapsed(f64),
}

/// What happened to the vessel this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavOutcome {
    /// Reached the target; now heading for `next_index`
    Arrived { next_index: u32 },

    /// Moved `step_nm` toward the target
    Moved { step_nm: f64 },

    /// Single-waypoint route; the vessel holds position
    Stationary,
}

/// Result of one navigation step.
#[derive(Debug, Clone, PartialEq)]
pub struct NavStep {
    pub state: VesselState,
    pub outcome: NavOutcome,
}

// ============================================================================
// GEODESY
// ============================================================================

/// Great-circle distance between two points in nautical miles.
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points
    let a = a.clamp(0.0, 1.0);
    2.0 * EARTH_RADIUS_NM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Initial bearing (forward azimuth) from point 1 to point 2, in [0, 360).
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    normalize_heading(y.atan2(x).to_degrees())
}

/// Wraps any angle in degrees into [0, 360).
pub fn normalize_heading(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid of a tiny negative value rounds up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Point reached after travelling `distance_nm` along `bearing` degrees.
///
/// Returns `(latitude, longitude)` with longitude wrapped into [-180, 180).
pub fn destination_point(lat: f64, lon: f64, bearing: f64, distance_nm: f64) -> (f64, f64) {
    let delta = distance_nm / EARTH_RADIUS_NM;
    let theta = bearing.to_radians();
    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();

    let sin_phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).clamp(-1.0, 1.0);
    let phi2 = sin_phi2.asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * sin_phi2);

    let lat2 = phi2.to_degrees().clamp(-90.0, 90.0);
    let lon2 = (lambda2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    (lat2, lon2)
}

/// Arrival radius for a vessel that has travelled `distance_since_waypoint`.
pub fn arrival_threshold(distance_since_waypoint: f64) -> f64 {
    BASE_ARRIVAL_THRESHOLD_NM + distance_since_waypoint * THRESHOLD_TRAVEL_FACTOR
}

/// True when a vessel `distance_to_target` away counts as arrived.
pub fn has_arrived(distance_to_target: f64, distance_since_waypoint: f64) -> bool {
    distance_to_target <= arrival_threshold(distance_since_waypoint)
}

/// Fails on an empty route, which is a fatal configuration error.
pub fn ensure_route(vessel_id: &VesselId, waypoints: &[Waypoint]) -> Result<(), NavigationError> {
    if waypoints.is_empty() {
        return Err(NavigationError::EmptyRoute(vessel_id.clone()));
    }
    Ok(())
}

// ============================================================================
// ENERGY
// ============================================================================

/// Energy drain and recharge rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyModel {
    /// Drain per nautical mile at the slowest multiplier (percent)
    pub min_drain_per_nm: f64,

    /// Drain per nautical mile at the fastest multiplier (percent)
    pub max_drain_per_nm: f64,

    /// Recovery while Charging, percent per simulated hour
    pub recharge_per_hour: f64,
}

impl Default for EnergyModel {
    fn default() -> Self {
        Self {
            min_drain_per_nm: 0.1,
            max_drain_per_nm: 0.5,
            recharge_per_hour: 30.0,
        }
    }
}

impl EnergyModel {
    /// Drain rate for a speed multiplier, linear over [0.1, 10.0].
    pub fn drain_per_nm(&self, multiplier: f64) -> f64 {
        use crate::scheduler::{MAX_MULTIPLIER, MIN_MULTIPLIER};

        let t = ((multiplier - MIN_MULTIPLIER) / (MAX_MULTIPLIER - MIN_MULTIPLIER)).clamp(0.0, 1.0);
        self.min_drain_per_nm + t * (self.max_drain_per_nm - self.min_drain_per_nm)
    }

    /// Energy after charging for `elapsed_simulated_secs`.
    pub fn recharge(&self, energy: f64, elapsed_simulated_secs: f64) -> f64 {
        clamp_energy(energy + self.recharge_per_hour * elapsed_simulated_secs / SECONDS_PER_HOUR)
    }

    pub fn is_consistent(&self) -> bool {
        self.min_drain_per_nm >= 0.0
            && self.max_drain_per_nm >= self.min_drain_per_nm
            && self.recharge_per_hour >= 0.0
    }
}

/// Clamps an energy level into [0, 100].
pub fn clamp_energy(energy: f64) -> f64 {
    if energy.is_nan() {
        0.0
    } else {
        energy.clamp(0.0, 100.0)
    }
}

// ============================================================================
// ADVANCE
// ============================================================================

/// Advances a vessel one tick along its route.
///
/// # Arguments
/// * `state` - Current state; `speed_knots` is the speed to travel at
/// * `waypoints` - The vessel's route in sequence order (length >= 1)
/// * `elapsed_simulated_secs` - Real elapsed time × speed multiplier
/// * `drain_per_nm` - Energy cost per nautical mile travelled (percent)
pub fn advance(
    state: &VesselState,
    waypoints: &[Waypoint],
    elapsed_simulated_secs: f64,
    drain_per_nm: f64,
) -> Result<NavStep, NavigationError> {
    ensure_route(&state.vessel_id, waypoints)?;
    if !elapsed_simulated_secs.is_finite() || elapsed_simulated_secs < 0.0 {
        return Err(NavigationError::InvalidElapsed(elapsed_simulated_secs));
    }

    let mut next = state.clone();

    // Docked vessels have nowhere to go, and bearing to yourself is undefined
    if waypoints.len() == 1 {
        next.current_waypoint_index = 0;
        next.distance_since_waypoint = 0.0;
        return Ok(NavStep {
            state: next,
            outcome: NavOutcome::Stationary,
        });
    }

    let route_len = waypoints.len() as u32;
    let index = state.current_waypoint_index % route_len;
    let target = &waypoints[index as usize];

    let distance = haversine_nm(state.latitude, state.longitude, target.latitude, target.longitude);
    if distance > 0.0 {
        next.heading = initial_bearing(state.latitude, state.longitude, target.latitude, target.longitude);
    }

    if has_arrived(distance, state.distance_since_waypoint) {
        let next_index = (index + 1) % route_len;
        next.current_waypoint_index = next_index;
        next.distance_since_waypoint = 0.0;
        return Ok(NavStep {
            state: next,
            outcome: NavOutcome::Arrived { next_index },
        });
    }

    let step_nm = state.speed_knots * (elapsed_simulated_secs / SECONDS_PER_HOUR);
    let (lat, lon) = destination_point(state.latitude, state.longitude, next.heading, step_nm);

    next.latitude = lat;
    next.longitude = lon;
    next.current_waypoint_index = index;
    next.distance_since_waypoint = state.distance_since_waypoint + step_nm;
    next.area_covered = state.area_covered + step_nm;
    next.energy_level = clamp_energy(state.energy_level - step_nm * drain_per_nm);

    Ok(NavStep {
        state: next,
        outcome: NavOutcome::Moved { step_nm },
    })
}

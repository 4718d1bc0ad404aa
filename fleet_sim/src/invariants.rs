//! Fleet-wide checks applied after every simulated tick.

use fleet_core::{SpeedBehavior, StateStore, StatusPolicy, StoreError, VesselState, VesselStatus};
use fleet_env::VesselId;
use std::collections::HashMap;

/// Route length per vessel, loaded once; routes are static.
pub async fn route_lengths<S: StateStore>(store: &S) -> Result<HashMap<VesselId, usize>, StoreError> {
    let mut lengths = HashMap::new();
    for (vessel, _) in store.get_all_with_states().await? {
        let waypoints = store.get_waypoints(&vessel.id).await?;
        lengths.insert(vessel.id, waypoints.len());
    }
    Ok(lengths)
}

/// Returns the first broken invariant, if any.
pub fn check_state(
    state: &VesselState,
    route_lengths: &HashMap<VesselId, usize>,
    policy: &StatusPolicy,
) -> Result<(), String> {
    let id = &state.vessel_id;
    state.validate().map_err(|v| format!("{}: {}", id, v))?;

    let len = route_lengths
        .get(id)
        .copied()
        .ok_or_else(|| format!("{}: no route", id))?;
    if state.current_waypoint_index as usize >= len {
        return Err(format!(
            "{}: waypoint index {} outside route of {}",
            id, state.current_waypoint_index, len
        ));
    }

    match state.status.behavior() {
        SpeedBehavior::Cruise if state.speed_knots != state.original_speed_knots => {
            return Err(format!(
                "{}: Active at {} kn, expected {} kn",
                id, state.speed_knots, state.original_speed_knots
            ));
        }
        SpeedBehavior::StationKeeping | SpeedBehavior::Docked if state.speed_knots != 0.0 => {
            return Err(format!("{}: {} but moving at {} kn", id, state.status, state.speed_knots));
        }
        _ => {}
    }

    if state.status == VesselStatus::Active && state.energy_level <= policy.charge_below {
        return Err(format!(
            "{}: still Active at {:.1}% energy",
            id, state.energy_level
        ));
    }
    Ok(())
}

pub fn check_fleet(
    states: &[VesselState],
    route_lengths: &HashMap<VesselId, usize>,
    policy: &StatusPolicy,
) -> Result<(), String> {
    if states.len() != route_lengths.len() {
        return Err(format!("{} state rows for {} routes", states.len(), route_lengths.len()));
    }
    states
        .iter()
        .try_for_each(|state| check_state(state, route_lengths, policy))
}

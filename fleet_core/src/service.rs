//! Boundary operations exposed to dashboards and other pollers.
//!
//! Readers never block ticks and never see a half-applied update: each
//! vessel row they read is the latest committed one. Polling is the only
//! delivery mechanism.

use crate::models::{Vessel, VesselState, VesselStatus};
use crate::reset::ResetCoordinator;
use crate::scheduler::{SimulationScheduler, SpeedControl, SpeedMultiplier};
use crate::store::{StateStore, StoreError};
use fleet_env::{FleetContext, VesselId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Speed multiplier {0} outside [0.1, 10.0]")]
    InvalidMultiplier(f64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One vessel as seen by a poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselStatusDto {
    pub id: VesselId,
    pub name: String,
    pub crew_count: u32,
    pub equipment: String,
    pub project: String,
    pub survey_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub speed_knots: f64,
    pub speed: String,
    pub energy_level: f64,
    pub status: VesselStatus,
    pub conditions: String,
    pub area_covered: f64,
    pub current_waypoint_index: u32,
    pub last_updated: i64,
}

impl VesselStatusDto {
    fn from_row(vessel: Vessel, state: VesselState) -> Self {
        Self {
            id: vessel.id,
            name: vessel.name,
            crew_count: vessel.crew_count,
            equipment: vessel.equipment,
            project: vessel.project,
            survey_type: vessel.survey_type,
            latitude: state.latitude,
            longitude: state.longitude,
            heading: state.heading,
            speed_knots: state.speed_knots,
            speed: state.speed,
            energy_level: state.energy_level,
            status: state.status,
            conditions: state.conditions,
            area_covered: state.area_covered,
            current_waypoint_index: state.current_waypoint_index,
            last_updated: state.last_updated,
        }
    }
}

/// Result of a reset request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
}

/// Polling reads, speed control and reset for the outside world.
pub struct FleetService<Ctx, S>
where
    Ctx: FleetContext,
    S: StateStore,
{
    store: Arc<S>,
    speed: Arc<SpeedControl>,
    reset: ResetCoordinator<Ctx, S>,
}

impl<Ctx, S> FleetService<Ctx, S>
where
    Ctx: FleetContext,
    S: StateStore,
{
    pub fn new(store: Arc<S>, speed: Arc<SpeedControl>, reset: ResetCoordinator<Ctx, S>) -> Self {
        Self { store, speed, reset }
    }

    /// Wires a service to a running scheduler's speed control and tick gate.
    pub fn for_scheduler(context: Arc<Ctx>, store: Arc<S>, scheduler: &SimulationScheduler<Ctx, S>) -> Self {
        let reset = ResetCoordinator::new(context, Arc::clone(&store), scheduler.tick_gate());
        Self::new(store, scheduler.speed_control(), reset)
    }

    /// Sets the active multiplier and returns the latest snapshot.
    ///
    /// The new multiplier applies from the next tick onward.
    pub async fn get_current_states(&self, speed_multiplier: f64) -> Result<Vec<VesselStatusDto>, ServiceError> {
        let multiplier =
            SpeedMultiplier::new(speed_multiplier).ok_or(ServiceError::InvalidMultiplier(speed_multiplier))?;
        if self.speed.get() != multiplier.get() {
            debug!(from = self.speed.get(), to = multiplier.get(), "speed multiplier changed");
        }
        self.speed.set(multiplier);

        let rows = self.store.get_all_with_states().await?;
        Ok(rows
            .into_iter()
            .map(|(vessel, state)| VesselStatusDto::from_row(vessel, state))
            .collect())
    }

    pub async fn get_vessel(&self, id: &VesselId) -> Result<Option<VesselStatusDto>, ServiceError> {
        Ok(self
            .store
            .get_by_id(id)
            .await?
            .map(|(vessel, state)| VesselStatusDto::from_row(vessel, state)))
    }

    /// Restores every vessel to its baseline; all or nothing.
    pub async fn reset_to_initial(&self) -> ResetResponse {
        match self.reset.reset_all().await {
            Ok(count) => ResetResponse {
                success: true,
                message: format!("Reset {} vessels to initial state", count),
                count,
            },
            Err(e) => ResetResponse {
                success: false,
                message: format!("Reset failed: {}", e),
                count: 0,
            },
        }
    }
}

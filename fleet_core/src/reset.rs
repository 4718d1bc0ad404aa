//! Bulk reset of the fleet to its seeded baseline.

use crate::store::{StateStore, StoreError};
use fleet_env::FleetContext;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Restores every vessel's state in one all-or-nothing step.
///
/// The coordinator shares the scheduler's tick gate and takes it
/// exclusively for the duration of the reset, so no tick can read a
/// pre-reset snapshot and write it back afterwards. Any tick write that
/// still slips through is discarded by the store's revision check.
pub struct ResetCoordinator<Ctx, S>
where
    Ctx: FleetContext,
    S: StateStore,
{
    context: Arc<Ctx>,
    store: Arc<S>,
    gate: Arc<RwLock<()>>,
}

impl<Ctx, S> ResetCoordinator<Ctx, S>
where
    Ctx: FleetContext,
    S: StateStore,
{
    pub fn new(context: Arc<Ctx>, store: Arc<S>, gate: Arc<RwLock<()>>) -> Self {
        Self { context, store, gate }
    }

    /// Returns the number of vessels restored.
    ///
    /// On error nothing was written; the fleet is exactly as it was.
    pub async fn reset_all(&self) -> Result<usize, StoreError> {
        let _exclusive = self.gate.write().await;
        let started = self.context.now();

        match self.store.reset_all(self.context.unix_millis()).await {
            Ok(count) => {
                info!(
                    vessels = count,
                    elapsed_ms = (self.context.now() - started).as_millis() as u64,
                    "fleet reset to baseline"
                );
                Ok(count)
            }
            Err(e) => {
                error!(error = %e, "fleet reset rolled back");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Route, Vessel, VesselState, VesselStatus, Waypoint};
    use crate::seed::FleetSeed;
    use crate::store::{PoolConfig, SeedOutcome, SledStateStore, UpdateOutcome};
    use async_trait::async_trait;
    use fleet_env::{TokioContext, VesselId};
    use std::time::Duration;

    /// Sled store whose bulk reset aborts part-way through.
    pub(crate) struct FailingReset {
        pub(crate) inner: SledStateStore,
        pub(crate) after_rows: usize,
    }

    #[async_trait]
    impl StateStore for FailingReset {
        async fn get_all_with_states(&self) -> Result<Vec<(Vessel, VesselState)>, StoreError> {
            self.inner.get_all_with_states().await
        }
        async fn get_by_id(&self, id: &VesselId) -> Result<Option<(Vessel, VesselState)>, StoreError> {
            self.inner.get_by_id(id).await
        }
        async fn update_state(&self, state: &VesselState) -> Result<UpdateOutcome, StoreError> {
            self.inner.update_state(state).await
        }
        async fn get_waypoints(&self, id: &VesselId) -> Result<Vec<Waypoint>, StoreError> {
            self.inner.get_waypoints(id).await
        }
        async fn get_route(&self, id: &VesselId) -> Result<Option<Route>, StoreError> {
            self.inner.get_route(id).await
        }
        async fn reset_all(&self, now_ms: i64) -> Result<usize, StoreError> {
            self.inner.reset_all_failing_after(now_ms, self.after_rows).await
        }
        async fn update_vessel_metadata(&self, vessel: &Vessel) -> Result<bool, StoreError> {
            self.inner.update_vessel_metadata(vessel).await
        }
        async fn remove_vessel(&self, id: &VesselId) -> Result<bool, StoreError> {
            self.inner.remove_vessel(id).await
        }
        async fn seed(&self, seed: &FleetSeed, now_ms: i64) -> Result<SeedOutcome, StoreError> {
            self.inner.seed(seed, now_ms).await
        }
        async fn vessel_count(&self) -> Result<usize, StoreError> {
            self.inner.vessel_count().await
        }
    }

    pub(crate) async fn seeded_store() -> SledStateStore {
        let store = SledStateStore::open_temporary(PoolConfig::default()).unwrap();
        store.seed(&FleetSeed::default_fleet(), 0).await.unwrap();
        store
    }

    async fn drift(store: &impl StateStore) {
        for (_, mut state) in store.get_all_with_states().await.unwrap() {
            state.energy_level = 10.0;
            state.area_covered = 42.0;
            state.current_waypoint_index = 0;
            state.status = if state.status == VesselStatus::Maintenance {
                VesselStatus::Maintenance
            } else {
                VesselStatus::Charging
            };
            state.refresh_readout();
            store.update_state(&state).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_reset_restores_every_vessel() {
        let store = Arc::new(seeded_store().await);
        drift(store.as_ref()).await;

        let coordinator = ResetCoordinator::new(TokioContext::shared(), Arc::clone(&store), Arc::new(RwLock::new(())));
        assert_eq!(coordinator.reset_all().await.unwrap(), 4);

        let seed = FleetSeed::default_fleet();
        for (vessel, state) in store.get_all_with_states().await.unwrap() {
            let baseline = &seed.vessel(&vessel.id).unwrap().baseline;
            assert_eq!(state.energy_level, baseline.energy_level);
            assert_eq!(state.status, baseline.status);
            assert_eq!(state.area_covered, 0.0);
            assert_eq!(state.current_waypoint_index, 0);
        }
    }

    #[tokio::test]
    async fn test_failed_reset_leaves_fleet_untouched() {
        let inner = seeded_store().await;
        drift(&inner).await;
        let before = inner.get_all_with_states().await.unwrap();

        let store = Arc::new(FailingReset { inner, after_rows: 2 });
        let coordinator = ResetCoordinator::new(TokioContext::shared(), Arc::clone(&store), Arc::new(RwLock::new(())));
        assert!(coordinator.reset_all().await.is_err());

        let after = store.get_all_with_states().await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_reset_waits_for_in_flight_tick() {
        let store = Arc::new(seeded_store().await);
        let gate = Arc::new(RwLock::new(()));
        let coordinator = Arc::new(ResetCoordinator::new(
            TokioContext::shared(),
            Arc::clone(&store),
            Arc::clone(&gate),
        ));

        // A tick is holding the gate
        let tick_guard = gate.clone().read_owned().await;
        let pending = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.reset_all().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        drop(tick_guard);
        let count = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .expect("reset never acquired the gate")
            .unwrap()
            .unwrap();
        assert_eq!(count, 4);
    }
}

//! Simulation Scheduler - drives periodic ticks across the fleet.
//!
//! This module is the integration layer between the pure engines
//! (navigation, status) and the environment (context clock, state store).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   SimulationScheduler                       │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │              Context: FleetContext                    │   │
//! │  │  • now() → real elapsed time between ticks           │   │
//! │  │  • sleep() → tick interval                           │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │        │ get_all_with_states                                │
//! │  ┌─────▼─────┐ ┌───────────┐ ┌───────────┐                  │
//! │  │ vessel #1 │ │ vessel #2 │ │ vessel #N │  (one task each) │
//! │  │ NAV + POL │ │ NAV + POL │ │ NAV + POL │                  │
//! │  └─────┬─────┘ └─────┬─────┘ └─────┬─────┘                  │
//! │        └──── update_state (per row, independent) ───┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The scheduler keeps no vessel state between ticks. Each tick works from
//! the committed rows it reads, so a restart simply resumes from the store.

use crate::models::{VesselState, Waypoint};
use crate::navigation::{self, EnergyModel, NavOutcome, NavigationError};
use crate::status::{SpeedBehavior, StatusPolicy};
use crate::store::{StateStore, StoreError, UpdateOutcome};
use fleet_env::{FleetContext, VesselId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Slowest allowed speed multiplier.
pub const MIN_MULTIPLIER: f64 = 0.1;

/// Fastest allowed speed multiplier.
pub const MAX_MULTIPLIER: f64 = 10.0;

/// A speed multiplier known to lie in [0.1, 10.0].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SpeedMultiplier(f64);

impl SpeedMultiplier {
    /// Returns `None` for NaN or values outside [0.1, 10.0].
    pub fn new(value: f64) -> Option<Self> {
        (MIN_MULTIPLIER..=MAX_MULTIPLIER)
            .contains(&value)
            .then_some(Self(value))
    }

    pub fn get(&self) -> f64 {
        self.0
    }
}

impl Default for SpeedMultiplier {
    fn default() -> Self {
        Self(1.0)
    }
}

/// The active multiplier, shared between the boundary layer and the ticks.
#[derive(Debug)]
pub struct SpeedControl {
    bits: AtomicU64,
}

impl SpeedControl {
    pub fn new(initial: SpeedMultiplier) -> Self {
        Self {
            bits: AtomicU64::new(initial.get().to_bits()),
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn set(&self, multiplier: SpeedMultiplier) {
        self.bits.store(multiplier.get().to_bits(), Ordering::Release);
    }
}

impl Default for SpeedControl {
    fn default() -> Self {
        Self::new(SpeedMultiplier::default())
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Real time between ticks (milliseconds)
    pub tick_interval_ms: u64,

    /// Multiplier in effect until the boundary layer sets another
    pub initial_multiplier: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            initial_multiplier: 1.0,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Inputs shared by every vessel in one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickPlan {
    pub elapsed_simulated_secs: f64,
    pub multiplier: f64,
    pub now_ms: i64,
    pub energy: EnergyModel,
    pub policy: StatusPolicy,
}

/// Why one vessel's update failed this tick.
#[derive(Debug, Error)]
pub enum VesselUpdateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

/// Per-tick tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub applied: usize,
    pub arrivals: usize,
    pub stale: usize,
    pub missing: usize,
    pub failed: usize,
}

/// Computes a vessel's next state. Pure; no I/O.
///
/// Runs navigation for Active vessels, recharging for Charging vessels,
/// nothing for docked ones, then evaluates the status transition on the
/// resulting energy level.
pub fn plan_vessel_update(
    state: &VesselState,
    waypoints: &[Waypoint],
    plan: &TickPlan,
) -> Result<(VesselState, Option<NavOutcome>), NavigationError> {
    navigation::ensure_route(&state.vessel_id, waypoints)?;

    let (mut next, outcome) = match state.status.behavior() {
        SpeedBehavior::Cruise => {
            let mut cruising = state.clone();
            cruising.speed_knots = state.original_speed_knots;
            let step = navigation::advance(
                &cruising,
                waypoints,
                plan.elapsed_simulated_secs,
                plan.energy.drain_per_nm(plan.multiplier),
            )?;
            (step.state, Some(step.outcome))
        }
        SpeedBehavior::StationKeeping => {
            let mut holding = state.clone();
            holding.speed_knots = 0.0;
            holding.energy_level = plan.energy.recharge(state.energy_level, plan.elapsed_simulated_secs);
            (holding, None)
        }
        SpeedBehavior::Docked => {
            let mut docked = state.clone();
            docked.speed_knots = 0.0;
            (docked, None)
        }
    };

    let status = plan.policy.next(state.status, next.energy_level);
    if status != state.status {
        debug!(
            vessel = %state.vessel_id,
            from = %state.status,
            to = %status,
            energy = next.energy_level,
            "status transition"
        );
    }
    next.status = status;
    next.speed_knots = match status.behavior() {
        SpeedBehavior::Cruise => next.original_speed_knots,
        SpeedBehavior::StationKeeping | SpeedBehavior::Docked => 0.0,
    };
    next.refresh_readout();
    next.last_updated = plan.now_ms;

    Ok((next, outcome))
}

async fn update_vessel<S: StateStore>(
    store: &S,
    state: VesselState,
    plan: TickPlan,
) -> Result<(UpdateOutcome, Option<NavOutcome>), VesselUpdateError> {
    let waypoints = store.get_waypoints(&state.vessel_id).await?;
    let (next, nav) = plan_vessel_update(&state, &waypoints, &plan)?;
    let outcome = store.update_state(&next).await?;
    Ok((outcome, nav))
}

const NO_TICK_YET: u64 = u64::MAX;

/// Periodic driver fanning out one update per vessel per tick.
///
/// Generic over the context and store implementations, allowing the same
/// scheduler to run on the wall clock or on a virtual clock.
pub struct SimulationScheduler<Ctx, S>
where
    Ctx: FleetContext,
    S: StateStore,
{
    context: Arc<Ctx>,
    store: Arc<S>,
    config: SchedulerConfig,
    energy: EnergyModel,
    policy: StatusPolicy,
    speed: Arc<SpeedControl>,
    /// Held shared by ticks, exclusively by the bulk reset
    gate: Arc<RwLock<()>>,
    /// Context time of the previous tick in nanoseconds
    last_tick_ns: AtomicU64,
    tick_count: AtomicU64,
}

impl<Ctx, S> SimulationScheduler<Ctx, S>
where
    Ctx: FleetContext,
    S: StateStore,
{
    pub fn new(
        context: Arc<Ctx>,
        store: Arc<S>,
        config: SchedulerConfig,
        energy: EnergyModel,
        policy: StatusPolicy,
    ) -> Self {
        let initial = SpeedMultiplier::new(config.initial_multiplier).unwrap_or_default();
        Self {
            context,
            store,
            config,
            energy,
            policy,
            speed: Arc::new(SpeedControl::new(initial)),
            gate: Arc::new(RwLock::new(())),
            last_tick_ns: AtomicU64::new(NO_TICK_YET),
            tick_count: AtomicU64::new(0),
        }
    }

    /// Handle for changing the active multiplier.
    pub fn speed_control(&self) -> Arc<SpeedControl> {
        Arc::clone(&self.speed)
    }

    /// The lock ticks hold shared; the reset coordinator takes it exclusively.
    pub fn tick_gate(&self) -> Arc<RwLock<()>> {
        Arc::clone(&self.gate)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Relaxed)
    }

    fn elapsed_since_last_tick(&self) -> Duration {
        let now_ns = self.context.now().as_nanos() as u64;
        let previous = self.last_tick_ns.swap(now_ns, Ordering::AcqRel);
        if previous == NO_TICK_YET {
            self.config.tick_interval()
        } else {
            Duration::from_nanos(now_ns.saturating_sub(previous))
        }
    }

    /// Advances every vessel by one tick.
    ///
    /// Per-vessel failures are logged and counted; they never fail the tick.
    /// The tick itself fails only if the fleet cannot be read.
    pub async fn tick(&self) -> Result<TickReport, StoreError> {
        let _shared = self.gate.read().await;

        let multiplier = self.speed.get();
        let elapsed = self.elapsed_since_last_tick();
        let plan = TickPlan {
            elapsed_simulated_secs: elapsed.as_secs_f64() * multiplier,
            multiplier,
            now_ms: self.context.unix_millis(),
            energy: self.energy,
            policy: self.policy,
        };

        let fleet = self.store.get_all_with_states().await?;
        let tick = self.tick_count.fetch_add(1, Ordering::Relaxed) + 1;

        let mut tasks = JoinSet::new();
        for (vessel, state) in fleet {
            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                let result = update_vessel(store.as_ref(), state, plan).await;
                (vessel.id, result)
            });
        }

        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok((outcome, nav)))) => {
                    if let Some(NavOutcome::Arrived { next_index }) = nav {
                        debug!(vessel = %id, next_index, "waypoint reached");
                        report.arrivals += 1;
                    }
                    record_outcome(&mut report, &id, outcome);
                }
                Ok((id, Err(e))) => {
                    error!(vessel = %id, error = %e, "vessel update failed; skipping this tick");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "vessel update task aborted");
                    report.failed += 1;
                }
            }
        }

        debug!(
            tick,
            multiplier,
            elapsed_sim_s = plan.elapsed_simulated_secs,
            applied = report.applied,
            stale = report.stale,
            failed = report.failed,
            "tick complete"
        );
        Ok(report)
    }

    /// Ticks every interval until `shutdown` flips to true.
    ///
    /// Shutdown stops new ticks; a tick already running finishes first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.config.tick_interval_ms,
            multiplier = self.speed.get(),
            "scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.context.sleep(self.config.tick_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
            if let Err(e) = self.tick().await {
                error!(error = %e, "tick failed; retrying next interval");
            }
        }

        info!(ticks = self.tick_count(), "scheduler stopped");
    }
}

fn record_outcome(report: &mut TickReport, id: &VesselId, outcome: UpdateOutcome) {
    match outcome {
        UpdateOutcome::Applied { .. } => report.applied += 1,
        UpdateOutcome::Stale { stored_revision } => {
            warn!(vessel = %id, stored_revision, "discarded tick write from a stale snapshot");
            report.stale += 1;
        }
        UpdateOutcome::Missing => report.missing += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Baseline, VesselStatus};
    use crate::seed::FleetSeed;
    use crate::store::{PoolConfig, SledStateStore};
    use approx::assert_abs_diff_eq;
    use fleet_env::TokioContext;

    fn plan(elapsed: f64, multiplier: f64) -> TickPlan {
        TickPlan {
            elapsed_simulated_secs: elapsed,
            multiplier,
            now_ms: 42,
            energy: EnergyModel::default(),
            policy: StatusPolicy::default(),
        }
    }

    fn state(status: VesselStatus, energy: f64) -> VesselState {
        Baseline {
            latitude: 55.0,
            longitude: 2.0,
            heading: 0.0,
            speed_knots: 0.0,
            original_speed_knots: 12.0,
            energy_level: energy,
            status,
        }
        .to_state(VesselId::parse("vessel-001").unwrap(), 0, 3)
    }

    fn route() -> Vec<Waypoint> {
        [(56.0, 2.0), (56.0, 2.5)]
            .iter()
            .enumerate()
            .map(|(i, (lat, lon))| Waypoint {
                id: i as u64,
                vessel_id: VesselId::parse("vessel-001").unwrap(),
                latitude: *lat,
                longitude: *lon,
                sequence: i as u32,
            })
            .collect()
    }

    #[test]
    fn test_speed_multiplier_domain() {
        assert!(SpeedMultiplier::new(0.1).is_some());
        assert!(SpeedMultiplier::new(10.0).is_some());
        assert!(SpeedMultiplier::new(0.09).is_none());
        assert!(SpeedMultiplier::new(10.5).is_none());
        assert!(SpeedMultiplier::new(f64::NAN).is_none());
    }

    #[test]
    fn test_speed_control_round_trip() {
        let control = SpeedControl::default();
        assert_eq!(control.get(), 1.0);
        control.set(SpeedMultiplier::new(7.5).unwrap());
        assert_eq!(control.get(), 7.5);
    }

    #[test]
    fn test_active_vessel_cruises_at_original_speed() {
        let (next, nav) = plan_vessel_update(&state(VesselStatus::Active, 90.0), &route(), &plan(3600.0, 1.0)).unwrap();
        assert!(matches!(nav, Some(NavOutcome::Moved { .. })));
        assert_eq!(next.speed_knots, 12.0);
        assert_abs_diff_eq!(next.area_covered, 12.0, epsilon = 1e-9);
        assert!(next.energy_level < 90.0);
        assert_eq!(next.last_updated, 42);
        // Revision is the snapshot's; the store bumps it on commit
        assert_eq!(next.revision, 3);
    }

    #[test]
    fn test_active_vessel_switches_to_charging_when_drained() {
        // 12 nm at 0.5 %/nm takes 26% down to 20%
        let (next, _) = plan_vessel_update(&state(VesselStatus::Active, 26.0), &route(), &plan(3600.0, 10.0)).unwrap();
        assert_eq!(next.status, VesselStatus::Charging);
        assert_eq!(next.speed_knots, 0.0);
        assert!(next.speed.contains("station keeping"));
    }

    #[test]
    fn test_charging_vessel_recovers_without_moving() {
        let start = state(VesselStatus::Charging, 25.0);
        let (next, nav) = plan_vessel_update(&start, &route(), &plan(3600.0, 1.0)).unwrap();
        assert!(nav.is_none());
        assert_eq!(next.latitude, start.latitude);
        assert_abs_diff_eq!(next.energy_level, 55.0, epsilon = 1e-9);
        assert_eq!(next.status, VesselStatus::Charging);

        let (next, _) = plan_vessel_update(&next, &route(), &plan(3600.0, 1.0)).unwrap();
        assert_eq!(next.status, VesselStatus::Active);
        assert_eq!(next.speed_knots, 12.0);
    }

    #[test]
    fn test_docked_vessel_does_not_drain() {
        let start = state(VesselStatus::Maintenance, 60.0);
        let (next, nav) = plan_vessel_update(&start, &route(), &plan(36_000.0, 10.0)).unwrap();
        assert!(nav.is_none());
        assert_eq!(next.energy_level, 60.0);
        assert_eq!(next.status, VesselStatus::Maintenance);
        assert_eq!(next.speed_knots, 0.0);
    }

    #[test]
    fn test_empty_route_fails_for_every_status() {
        for status in [VesselStatus::Active, VesselStatus::Charging, VesselStatus::Maintenance] {
            let err = plan_vessel_update(&state(status, 50.0), &[], &plan(1.0, 1.0)).unwrap_err();
            assert!(matches!(err, NavigationError::EmptyRoute(_)));
        }
    }

    async fn scheduler() -> SimulationScheduler<TokioContext, SledStateStore> {
        let store = SledStateStore::open_temporary(PoolConfig::default()).unwrap();
        store.seed(&FleetSeed::default_fleet(), 0).await.unwrap();
        SimulationScheduler::new(
            TokioContext::shared(),
            Arc::new(store),
            SchedulerConfig::default(),
            EnergyModel::default(),
            StatusPolicy::default(),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tick_updates_every_vessel() {
        let scheduler = scheduler().await;
        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.applied, 4);
        assert_eq!(report.failed, 0);

        let fleet = scheduler.store.get_all_with_states().await.unwrap();
        assert!(fleet.iter().all(|(_, s)| s.revision == 1));

        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.applied, 4);
        let fleet = scheduler.store.get_all_with_states().await.unwrap();
        assert!(fleet.iter().all(|(_, s)| s.revision == 2));
    }

    /// Delegates to sled but refuses one vessel's route.
    struct BrokenRoute {
        inner: SledStateStore,
        broken: VesselId,
    }

    #[async_trait::async_trait]
    impl StateStore for BrokenRoute {
        async fn get_all_with_states(&self) -> Result<Vec<(crate::models::Vessel, VesselState)>, StoreError> {
            self.inner.get_all_with_states().await
        }
        async fn get_by_id(&self, id: &VesselId) -> Result<Option<(crate::models::Vessel, VesselState)>, StoreError> {
            self.inner.get_by_id(id).await
        }
        async fn update_state(&self, state: &VesselState) -> Result<UpdateOutcome, StoreError> {
            self.inner.update_state(state).await
        }
        async fn get_waypoints(&self, id: &VesselId) -> Result<Vec<Waypoint>, StoreError> {
            if id == &self.broken {
                return Err(StoreError::Integrity(format!("route for {} is unreadable", id)));
            }
            self.inner.get_waypoints(id).await
        }
        async fn get_route(&self, id: &VesselId) -> Result<Option<crate::models::Route>, StoreError> {
            self.inner.get_route(id).await
        }
        async fn reset_all(&self, now_ms: i64) -> Result<usize, StoreError> {
            self.inner.reset_all(now_ms).await
        }
        async fn update_vessel_metadata(&self, vessel: &crate::models::Vessel) -> Result<bool, StoreError> {
            self.inner.update_vessel_metadata(vessel).await
        }
        async fn remove_vessel(&self, id: &VesselId) -> Result<bool, StoreError> {
            self.inner.remove_vessel(id).await
        }
        async fn seed(&self, seed: &FleetSeed, now_ms: i64) -> Result<crate::store::SeedOutcome, StoreError> {
            self.inner.seed(seed, now_ms).await
        }
        async fn vessel_count(&self) -> Result<usize, StoreError> {
            self.inner.vessel_count().await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_broken_vessel_does_not_stop_the_tick() {
        let inner = SledStateStore::open_temporary(PoolConfig::default()).unwrap();
        inner.seed(&FleetSeed::default_fleet(), 0).await.unwrap();
        let broken = VesselId::parse("vessel-002").unwrap();
        let store = Arc::new(BrokenRoute {
            inner,
            broken: broken.clone(),
        });
        let scheduler = SimulationScheduler::new(
            TokioContext::shared(),
            Arc::clone(&store),
            SchedulerConfig::default(),
            EnergyModel::default(),
            StatusPolicy::default(),
        );

        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.applied, 3);
        assert_eq!(report.failed, 1);

        // The broken vessel keeps its last committed row
        let (_, state) = store.get_by_id(&broken).await.unwrap().unwrap();
        assert_eq!(state.revision, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_removed_vessel_is_skipped() {
        let scheduler = scheduler().await;
        scheduler
            .store
            .remove_vessel(&VesselId::parse("vessel-003").unwrap())
            .await
            .unwrap();

        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.applied, 3);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let scheduler = Arc::new(scheduler().await);
        let (tx, rx) = watch::channel(false);

        let runner = Arc::clone(&scheduler);
        let handle = tokio::spawn(async move { runner.run(rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}

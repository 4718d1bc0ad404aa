//! Scenario runner - drives the real scheduler, store and service on a
//! virtual clock and checks fleet invariants as it goes.

use crate::context::SimContext;
use crate::error::SimError;
use crate::exporter::{FrameRecorder, SimExport};
use crate::invariants::{check_fleet, route_lengths};
use crate::scenarios::ScenarioId;

use fleet_core::{
    FleetConfig, FleetSeed, FleetService, SchedulerConfig, SimulationScheduler, SledStateStore, StateStore,
    StoreError, TickReport, VesselState, VesselStatus, MAX_MULTIPLIER,
};
use fleet_env::{FleetContext, VesselId};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Ticks of the time-warp scenario, whatever the configured duration.
const MIN_TIME_WARP_TICKS: u64 = 20;

/// Upper bound on ticks for a vessel to drain, charge and resume.
const DEPLETION_TICK_BUDGET: u64 = 240;

/// Ticks run between resets in the race scenario.
const RACE_WARMUP_TICKS: u64 = 3;
const MIN_RACE_ROUNDS: u64 = 4;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final virtual time in seconds
    pub final_time_secs: f64,

    /// Number of vessels at the end
    pub final_vessel_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

impl ScenarioResult {
    fn errored(scenario: ScenarioId, seed: u64, err: SimError) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            final_vessel_count: 0,
            failure_reason: Some(format!("scenario error: {}", err)),
            metrics: ScenarioMetrics::default(),
        }
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioMetrics {
    /// State rows committed by ticks
    pub updates_applied: u64,

    /// Waypoint arrivals across the fleet
    pub arrivals: u64,

    /// Tick writes discarded by the revision check
    pub stale_writes: u64,

    /// Ticks that found a vessel row gone
    pub missing_rows: u64,

    /// Per-vessel update failures
    pub failed_updates: u64,

    /// Observed status changes
    pub status_transitions: u64,

    /// Successful bulk resets
    pub resets: u64,
}

impl ScenarioMetrics {
    fn absorb(&mut self, report: &TickReport) {
        self.updates_applied += report.applied as u64;
        self.arrivals += report.arrivals as u64;
        self.stale_writes += report.stale as u64;
        self.missing_rows += report.missing as u64;
        self.failed_updates += report.failed as u64;
    }

    /// Both slices are ordered by vessel id, as the store returns them.
    fn count_transitions(&mut self, before: &[VesselState], after: &[VesselState]) {
        self.status_transitions += before
            .iter()
            .zip(after)
            .filter(|(b, a)| b.vessel_id == a.vessel_id && b.status != a.status)
            .count() as u64;
    }
}

/// The production components wired to one virtual clock.
struct SimFleet {
    context: Arc<SimContext>,
    store: Arc<SledStateStore>,
    scheduler: SimulationScheduler<SimContext, SledStateStore>,
    service: FleetService<SimContext, SledStateStore>,
    routes: HashMap<VesselId, usize>,
    interval: Duration,
}

impl SimFleet {
    /// Advances the clock one interval and runs a tick.
    async fn step(&self) -> Result<TickReport, StoreError> {
        self.context.advance_time(self.interval);
        self.scheduler.tick().await
    }

    async fn states(&self) -> Result<Vec<VesselState>, StoreError> {
        Ok(self
            .store
            .get_all_with_states()
            .await?
            .into_iter()
            .map(|(_, state)| state)
            .collect())
    }

    /// Sets the multiplier through the same boundary call a poller uses.
    async fn set_multiplier(&self, multiplier: f64) -> Result<(), SimError> {
        self.service.get_current_states(multiplier).await?;
        Ok(())
    }

    fn multiplier(&self) -> f64 {
        self.scheduler.speed_control().get()
    }

    fn time_secs(&self) -> f64 {
        self.context.now().as_secs_f64()
    }
}

/// Runs fleet scenarios.
pub struct ScenarioRunner {
    seed: u64,

    /// Virtual time between ticks
    tick_interval: Duration,

    /// Virtual duration in seconds
    max_duration_secs: f64,

    /// Multiplier for the steady-state scenarios
    multiplier: f64,

    config: FleetConfig,
    fleet: FleetSeed,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_interval: Duration::from_secs(60),
            max_duration_secs: 3600.0,
            multiplier: 1.0,
            config: FleetConfig::default(),
            fleet: FleetSeed::default_fleet(),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the virtual duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_config(mut self, config: FleetConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_fleet(mut self, fleet: FleetSeed) -> Self {
        self.fleet = fleet;
        self
    }

    fn target_ticks(&self) -> u64 {
        ((self.max_duration_secs / self.tick_interval.as_secs_f64()).round() as u64).max(1)
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_recorded(scenario, &mut FrameRecorder::disabled()).await
    }

    /// Runs a scenario, keeping a frame every `every` ticks.
    pub async fn run_with_export(&self, scenario: ScenarioId, every: u64) -> (ScenarioResult, SimExport) {
        let mut recorder = FrameRecorder::every(every);
        let result = self.run_recorded(scenario, &mut recorder).await;

        let mut export = SimExport::new(scenario.name(), self.seed);
        for frame in recorder.into_frames() {
            export.add_frame(frame);
        }
        export.finalize(result.passed, result.failure_reason.clone());
        (result, export)
    }

    async fn run_recorded(&self, scenario: ScenarioId, recorder: &mut FrameRecorder) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let outcome = match scenario {
            ScenarioId::Patrol => self.run_patrol(recorder).await,
            ScenarioId::TimeWarp => self.run_time_warp(recorder).await,
            ScenarioId::Depletion => self.run_depletion(recorder).await,
            ScenarioId::ResetRace => self.run_reset_race(recorder).await,
            ScenarioId::Restart => self.run_restart(recorder).await,
        };

        outcome.unwrap_or_else(|e| {
            error!("Scenario {} aborted: {}", scenario.name(), e);
            ScenarioResult::errored(scenario, self.seed, e)
        })
    }

    async fn build_fleet(&self, context: Arc<SimContext>, store: SledStateStore) -> Result<SimFleet, SimError> {
        self.config.validate()?;
        let store = Arc::new(store);
        store.seed(&self.fleet, context.unix_millis()).await?;

        let scheduler = SimulationScheduler::new(
            Arc::clone(&context),
            Arc::clone(&store),
            SchedulerConfig {
                tick_interval_ms: self.tick_interval.as_millis() as u64,
                initial_multiplier: self.multiplier,
            },
            self.config.energy,
            self.config.status,
        );
        let service = FleetService::for_scheduler(Arc::clone(&context), Arc::clone(&store), &scheduler);
        let routes = route_lengths(store.as_ref()).await?;

        Ok(SimFleet {
            context,
            store,
            scheduler,
            service,
            routes,
            interval: self.tick_interval,
        })
    }

    async fn temporary_fleet(&self) -> Result<SimFleet, SimError> {
        let store = SledStateStore::open_temporary(self.config.pool.clone())?;
        self.build_fleet(SimContext::shared(self.seed), store).await
    }

    fn finish(
        &self,
        scenario: ScenarioId,
        fleet: &SimFleet,
        total_ticks: u64,
        failure: Option<String>,
        metrics: ScenarioMetrics,
    ) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure.is_none(),
            total_ticks,
            final_time_secs: fleet.time_secs(),
            final_vessel_count: fleet.routes.len(),
            failure_reason: failure,
            metrics,
        }
    }

    /// FLT-001: Patrol - steady state at a fixed multiplier.
    async fn run_patrol(&self, recorder: &mut FrameRecorder) -> Result<ScenarioResult, SimError> {
        info!("FLT-001: Patrol - {}x steady state", self.multiplier);

        let fleet = self.temporary_fleet().await?;
        fleet.set_multiplier(self.multiplier).await?;

        let target_ticks = self.target_ticks();
        let mut metrics = ScenarioMetrics::default();
        let mut failure = None;
        let mut previous = fleet.states().await?;
        let mut ticks = 0;

        for _ in 0..target_ticks {
            let report = fleet.step().await?;
            ticks += 1;
            metrics.absorb(&report);

            let states = fleet.states().await?;
            metrics.count_transitions(&previous, &states);
            recorder.record(report.tick, fleet.time_secs(), fleet.multiplier(), &states);

            if let Err(reason) = check_fleet(&states, &fleet.routes, &self.config.status) {
                failure = Some(format!("tick {}: {}", report.tick, reason));
                break;
            }
            if report.tick % 10 == 0 {
                debug!("  t={:.0}s | arrivals={}", fleet.time_secs(), metrics.arrivals);
            }
            previous = states;
        }

        let expected = ticks * fleet.routes.len() as u64;
        if failure.is_none() && (metrics.failed_updates > 0 || metrics.updates_applied != expected) {
            failure = Some(format!(
                "{} of {} updates applied, {} failed",
                metrics.updates_applied, expected, metrics.failed_updates
            ));
        }

        info!(
            "✓ Patrol complete: {} updates, {} arrivals",
            metrics.updates_applied, metrics.arrivals
        );
        Ok(self.finish(ScenarioId::Patrol, &fleet, ticks, failure, metrics))
    }

    /// FLT-002: TimeWarp - maximum and random multipliers.
    ///
    /// Every waypoint change must be to the successor waypoint; a vessel
    /// bouncing between two indices shows up as a backwards step.
    async fn run_time_warp(&self, recorder: &mut FrameRecorder) -> Result<ScenarioResult, SimError> {
        info!("FLT-002: TimeWarp - {}x then random multipliers", MAX_MULTIPLIER);

        let fleet = self.temporary_fleet().await?;
        fleet.set_multiplier(MAX_MULTIPLIER).await?;

        let target_ticks = self.target_ticks().max(MIN_TIME_WARP_TICKS);
        let random_from = target_ticks / 2;

        let initial = fleet.states().await?;
        let initially_active: HashSet<VesselId> = initial
            .iter()
            .filter(|s| s.status == VesselStatus::Active)
            .map(|s| s.vessel_id.clone())
            .collect();
        let mut last_index: HashMap<VesselId, u32> = initial
            .iter()
            .map(|s| (s.vessel_id.clone(), s.current_waypoint_index))
            .collect();
        let mut advances: HashMap<VesselId, u64> = HashMap::new();

        let mut metrics = ScenarioMetrics::default();
        let mut failure = None;
        let mut previous = initial;
        let mut ticks = 0;

        'ticks: for tick in 0..target_ticks {
            if tick >= random_from {
                fleet.set_multiplier(fleet.context.random_multiplier()).await?;
            }
            let report = fleet.step().await?;
            ticks += 1;
            metrics.absorb(&report);

            let states = fleet.states().await?;
            metrics.count_transitions(&previous, &states);
            recorder.record(report.tick, fleet.time_secs(), fleet.multiplier(), &states);

            for state in &states {
                let len = fleet.routes.get(&state.vessel_id).copied().unwrap_or(1) as u32;
                let now = state.current_waypoint_index;
                if let Some(before) = last_index.insert(state.vessel_id.clone(), now) {
                    if before == now {
                        continue;
                    }
                    if now != (before + 1) % len {
                        failure = Some(format!(
                            "tick {}: {} jumped from waypoint {} to {}",
                            report.tick, state.vessel_id, before, now
                        ));
                        break 'ticks;
                    }
                    *advances.entry(state.vessel_id.clone()).or_default() += 1;
                }
            }

            if let Err(reason) = check_fleet(&states, &fleet.routes, &self.config.status) {
                failure = Some(format!("tick {}: {}", report.tick, reason));
                break;
            }
            previous = states;
        }

        if failure.is_none() {
            let mut stalled: Vec<&VesselId> = initially_active
                .iter()
                .filter(|id| advances.get(*id).copied().unwrap_or(0) < 2)
                .collect();
            stalled.sort();
            if !stalled.is_empty() {
                failure = Some(format!("vessels never left their first leg: {:?}", stalled));
            }
        }
        if failure.is_none() && metrics.failed_updates > 0 {
            failure = Some(format!("{} vessel updates failed", metrics.failed_updates));
        }

        info!(
            "✓ TimeWarp complete: {} arrivals over {:.1} virtual hours",
            metrics.arrivals,
            fleet.time_secs() / 3600.0
        );
        Ok(self.finish(ScenarioId::TimeWarp, &fleet, ticks, failure, metrics))
    }

    /// FLT-003: Depletion - drain, station-keep, resume.
    async fn run_depletion(&self, recorder: &mut FrameRecorder) -> Result<ScenarioResult, SimError> {
        info!("FLT-003: Depletion - charge cycle under 10x");

        #[derive(Debug, Clone, Copy, PartialEq)]
        enum Phase {
            Draining,
            Charging { latitude: f64, longitude: f64 },
            Resumed,
        }

        let fleet = self.temporary_fleet().await?;
        let policy = self.config.status;

        let mut target = fleet
            .states()
            .await?
            .into_iter()
            .find(|s| s.status == VesselStatus::Active)
            .ok_or_else(|| SimError::Setup("fleet has no Active vessel".into()))?;
        target.energy_level = (policy.charge_below + 5.0).min(policy.resume_at - 1.0);
        target.refresh_readout();
        fleet.store.update_state(&target).await?;
        let target_id = target.vessel_id.clone();
        recorder.event(format!("{} forced to {:.0}% energy", target_id, target.energy_level));

        fleet.set_multiplier(MAX_MULTIPLIER).await?;

        let mut metrics = ScenarioMetrics::default();
        let mut failure = None;
        let mut phase = Phase::Draining;
        let mut previous = fleet.states().await?;
        let mut ticks = 0;

        while ticks < DEPLETION_TICK_BUDGET && phase != Phase::Resumed {
            let report = fleet.step().await?;
            ticks += 1;
            metrics.absorb(&report);

            let states = fleet.states().await?;
            metrics.count_transitions(&previous, &states);
            let state = states
                .iter()
                .find(|s| s.vessel_id == target_id)
                .ok_or_else(|| SimError::Setup(format!("{} disappeared", target_id)))?;

            phase = match (phase, state.status) {
                (Phase::Draining, VesselStatus::Charging) => {
                    debug!("  {} charging at {:.1}%", target_id, state.energy_level);
                    recorder.event(format!("{} started charging", target_id));
                    Phase::Charging {
                        latitude: state.latitude,
                        longitude: state.longitude,
                    }
                }
                (Phase::Charging { latitude, longitude }, VesselStatus::Charging) => {
                    if state.latitude != latitude || state.longitude != longitude {
                        failure = Some(format!("{} moved while charging", target_id));
                        break;
                    }
                    phase
                }
                (Phase::Charging { .. }, VesselStatus::Active) => {
                    recorder.event(format!("{} resumed survey", target_id));
                    Phase::Resumed
                }
                (_, status) if status == VesselStatus::Maintenance => {
                    failure = Some(format!("{} entered Maintenance", target_id));
                    break;
                }
                (phase, _) => phase,
            };
            recorder.record(report.tick, fleet.time_secs(), fleet.multiplier(), &states);

            if let Err(reason) = check_fleet(&states, &fleet.routes, &policy) {
                failure = Some(format!("tick {}: {}", report.tick, reason));
                break;
            }
            previous = states;
        }

        if failure.is_none() && phase != Phase::Resumed {
            failure = Some(format!(
                "{} did not complete a charge cycle within {} ticks ({:?})",
                target_id, DEPLETION_TICK_BUDGET, phase
            ));
        }

        info!(
            "✓ Depletion complete: {} transitions in {} ticks",
            metrics.status_transitions, ticks
        );
        Ok(self.finish(ScenarioId::Depletion, &fleet, ticks, failure, metrics))
    }

    /// FLT-004: ResetRace - bulk reset interleaved with ticks.
    ///
    /// Rounds alternate which of the two is polled first, so both orderings
    /// of tick and reset are exercised. Either way no progress made before
    /// the reset may survive it.
    async fn run_reset_race(&self, recorder: &mut FrameRecorder) -> Result<ScenarioResult, SimError> {
        info!("FLT-004: ResetRace - reset against in-flight ticks");

        let fleet = self.temporary_fleet().await?;
        fleet.set_multiplier(MAX_MULTIPLIER).await?;

        let fastest = self
            .fleet
            .vessels
            .iter()
            .map(|v| v.baseline.original_speed_knots)
            .fold(0.0, f64::max);
        let max_step_nm = fastest * self.tick_interval.as_secs_f64() * MAX_MULTIPLIER / 3600.0 + 1e-6;

        let rounds = (self.target_ticks() / (RACE_WARMUP_TICKS + 1)).max(MIN_RACE_ROUNDS);
        let mut metrics = ScenarioMetrics::default();
        let mut failure = None;
        let mut ticks = 0;

        'rounds: for round in 0..rounds {
            for _ in 0..RACE_WARMUP_TICKS {
                metrics.absorb(&fleet.step().await?);
                ticks += 1;
            }

            fleet.context.advance_time(fleet.interval);
            let (report, response) = if round % 2 == 0 {
                tokio::join!(fleet.scheduler.tick(), fleet.service.reset_to_initial())
            } else {
                let (response, report) = tokio::join!(fleet.service.reset_to_initial(), fleet.scheduler.tick());
                (report, response)
            };
            let report = report?;
            ticks += 1;
            metrics.absorb(&report);

            if !response.success {
                failure = Some(format!("round {}: {}", round, response.message));
                break;
            }
            metrics.resets += 1;
            recorder.event(format!("reset {} vessels", response.count));

            let states = fleet.states().await?;
            recorder.record(report.tick, fleet.time_secs(), fleet.multiplier(), &states);
            for state in &states {
                if state.area_covered > max_step_nm {
                    failure = Some(format!(
                        "round {}: {} kept {:.2} nm of pre-reset progress",
                        round, state.vessel_id, state.area_covered
                    ));
                    break 'rounds;
                }
            }
            if let Err(reason) = check_fleet(&states, &fleet.routes, &self.config.status) {
                failure = Some(format!("round {}: {}", round, reason));
                break;
            }
        }

        if failure.is_none() {
            failure = self.verify_baseline(&fleet).await?;
        }
        if metrics.stale_writes > 0 {
            warn!("{} stale tick writes discarded", metrics.stale_writes);
        }

        info!(
            "✓ ResetRace complete: {} resets, {} stale writes discarded",
            metrics.resets, metrics.stale_writes
        );
        Ok(self.finish(ScenarioId::ResetRace, &fleet, ticks, failure, metrics))
    }

    /// A final reset must land every vessel exactly on its baseline.
    async fn verify_baseline(&self, fleet: &SimFleet) -> Result<Option<String>, SimError> {
        let response = fleet.service.reset_to_initial().await;
        if !response.success {
            return Ok(Some(response.message));
        }
        for state in fleet.states().await? {
            let Some(seed) = self.fleet.vessel(&state.vessel_id) else {
                return Ok(Some(format!("{} is not in the seed", state.vessel_id)));
            };
            let expected = seed
                .baseline
                .to_state(state.vessel_id.clone(), state.last_updated, state.revision);
            if expected != state {
                return Ok(Some(format!("{} differs from its baseline after reset", state.vessel_id)));
            }
        }
        Ok(None)
    }

    /// FLT-005: Restart - reopen a persistent store mid-run.
    async fn run_restart(&self, recorder: &mut FrameRecorder) -> Result<ScenarioResult, SimError> {
        info!("FLT-005: Restart - persisted state survives reopen");

        let path = std::env::temp_dir().join(format!("fleet-sim-restart-{}-{}", self.seed, std::process::id()));
        let _ = std::fs::remove_dir_all(&path);
        let result = self.restart_at(&path, recorder).await;
        let _ = std::fs::remove_dir_all(&path);
        result
    }

    async fn restart_at(&self, path: &Path, recorder: &mut FrameRecorder) -> Result<ScenarioResult, SimError> {
        let context = SimContext::shared(self.seed);
        let target_ticks = self.target_ticks().max(2);
        let before_restart = target_ticks / 2;

        let mut metrics = ScenarioMetrics::default();
        let mut ticks = 0;

        let snapshot = {
            let fleet = self
                .build_fleet(Arc::clone(&context), SledStateStore::open(path, self.config.pool.clone())?)
                .await?;
            fleet.set_multiplier(self.multiplier).await?;
            for _ in 0..before_restart {
                let report = fleet.step().await?;
                ticks += 1;
                metrics.absorb(&report);
                recorder.record(report.tick, fleet.time_secs(), fleet.multiplier(), &fleet.states().await?);
            }
            fleet.store.flush().await?;
            fleet.states().await?
        };
        recorder.event("store reopened");

        let fleet = self
            .build_fleet(Arc::clone(&context), SledStateStore::open(path, self.config.pool.clone())?)
            .await?;
        fleet.set_multiplier(self.multiplier).await?;

        let reopened = fleet.states().await?;
        let mut failure = (reopened != snapshot).then(|| "state changed across restart".to_string());

        if failure.is_none() {
            let report = fleet.step().await?;
            ticks += 1;
            metrics.absorb(&report);
            let resumed = fleet.states().await?;
            for (old, new) in snapshot.iter().zip(&resumed) {
                if new.revision != old.revision + 1 {
                    failure = Some(format!(
                        "{} resumed at revision {}, expected {}",
                        new.vessel_id,
                        new.revision,
                        old.revision + 1
                    ));
                    break;
                }
            }
        }

        while failure.is_none() && ticks < target_ticks {
            let report = fleet.step().await?;
            ticks += 1;
            metrics.absorb(&report);
            let states = fleet.states().await?;
            recorder.record(report.tick, fleet.time_secs(), fleet.multiplier(), &states);
            if let Err(reason) = check_fleet(&states, &fleet.routes, &self.config.status) {
                failure = Some(format!("tick {}: {}", ticks, reason));
            }
        }

        info!("✓ Restart complete: resumed after {} of {} ticks", before_restart, target_ticks);
        Ok(self.finish(ScenarioId::Restart, &fleet, ticks, failure, metrics))
    }
}

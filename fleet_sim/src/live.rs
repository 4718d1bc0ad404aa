//! Real-time mode: the scheduler on the wall clock against a persistent
//! store, with a polling reader printing snapshots.

use crate::error::SimError;
use fleet_core::{FleetConfig, FleetSeed, FleetService, SeedOutcome, SimulationScheduler, SledStateStore, StateStore};
use fleet_env::{FleetContext, TokioContext};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Settings for a live run.
#[derive(Debug, Clone)]
pub struct LiveOptions {
    pub db_path: PathBuf,

    /// Wall-clock run time; the run also stops on Ctrl-C
    pub duration: Duration,

    pub multiplier: f64,
}

/// What happened during a live run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSummary {
    pub ticks: u64,
    pub polls: u64,
    pub vessels: usize,
}

/// Runs the fleet in real time until `duration` elapses or Ctrl-C.
pub async fn run_live(options: LiveOptions, config: FleetConfig, fleet: FleetSeed) -> Result<LiveSummary, SimError> {
    config.validate()?;
    let context = TokioContext::shared();
    let store = Arc::new(SledStateStore::open(&options.db_path, config.pool.clone())?);

    let outcome = drive(context, Arc::clone(&store), &options, &config, &fleet).await;
    store.flush().await?;
    outcome
}

/// Seeds, ticks and polls until the run ends. The scheduler is always
/// stopped before this returns.
async fn drive<S: StateStore>(
    context: Arc<TokioContext>,
    store: Arc<S>,
    options: &LiveOptions,
    config: &FleetConfig,
    fleet: &FleetSeed,
) -> Result<LiveSummary, SimError> {
    match store.seed(fleet, context.unix_millis()).await? {
        SeedOutcome::Seeded { vessels } => info!("Seeded {} vessels into {}", vessels, options.db_path.display()),
        SeedOutcome::AlreadySeeded { vessels } => {
            info!("Resuming {} vessels from {}", vessels, options.db_path.display())
        }
    }

    let scheduler = Arc::new(SimulationScheduler::new(
        Arc::clone(&context),
        Arc::clone(&store),
        config.scheduler.clone(),
        config.energy,
        config.status,
    ));
    let service = FleetService::for_scheduler(Arc::clone(&context), Arc::clone(&store), &scheduler);

    // Validates the multiplier before anything starts ticking
    let initial = service.get_current_states(options.multiplier).await?;
    let mut summary = LiveSummary {
        vessels: initial.len(),
        ..LiveSummary::default()
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = {
        let scheduler = Arc::clone(&scheduler);
        context.spawn("scheduler", async move { scheduler.run(shutdown_rx).await })
    };

    let deadline = tokio::time::sleep(options.duration);
    tokio::pin!(deadline);
    let mut poll = tokio::time::interval(config.scheduler.tick_interval());

    let mut failure = None;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping scheduler");
                break;
            }
            _ = poll.tick() => {
                let states = match service.get_current_states(options.multiplier).await {
                    Ok(states) => states,
                    Err(e) => {
                        error!("Poll failed, stopping scheduler: {}", e);
                        failure = Some(e);
                        break;
                    }
                };
                summary.polls += 1;
                for v in &states {
                    info!(
                        "{} {:<16} {:>9.4},{:>9.4} {:>5.1}% {:<11} {}",
                        v.id, v.name, v.latitude, v.longitude, v.energy_level, v.status.to_string(), v.speed
                    );
                }
                debug!("poll {} at tick {}", summary.polls, scheduler.tick_count());
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = handle.await {
        warn!("Scheduler task ended abnormally: {}", e);
    }
    summary.ticks = scheduler.tick_count();
    if let Some(e) = failure {
        return Err(e.into());
    }

    info!("Live run finished: {} ticks, {} polls", summary.ticks, summary.polls);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fleet_core::{Route, StoreError, UpdateOutcome, Vessel, VesselState, Waypoint};
    use fleet_env::VesselId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every fleet read after the first `healthy_reads`.
    struct FlakyReads {
        inner: SledStateStore,
        healthy_reads: usize,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl StateStore for FlakyReads {
        async fn get_all_with_states(&self) -> Result<Vec<(Vessel, VesselState)>, StoreError> {
            if self.reads.fetch_add(1, Ordering::SeqCst) >= self.healthy_reads {
                return Err(StoreError::Integrity("store went away".into()));
            }
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
            self.inner.reset_all(now_ms).await
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

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_poll_stops_scheduler() {
        let store = Arc::new(FlakyReads {
            inner: SledStateStore::open_temporary(Default::default()).unwrap(),
            healthy_reads: 3,
            reads: AtomicUsize::new(0),
        });
        let mut config = FleetConfig::default();
        config.scheduler.tick_interval_ms = 20;
        let options = LiveOptions {
            db_path: PathBuf::from("unused"),
            duration: Duration::from_secs(30),
            multiplier: 1.0,
        };

        let err = drive(TokioContext::shared(), Arc::clone(&store), &options, &config, &FleetSeed::default_fleet())
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::Service(_)), "got {:?}", err);

        // Nothing keeps reading once the driver has returned
        let reads = store.reads.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.reads.load(Ordering::SeqCst), reads);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_live_run_ticks_and_persists() {
        let dir = std::env::temp_dir().join(format!("fleet-live-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let mut config = FleetConfig::default();
        config.scheduler.tick_interval_ms = 20;
        let options = LiveOptions {
            db_path: dir.clone(),
            duration: Duration::from_millis(300),
            multiplier: 10.0,
        };

        let summary = run_live(options, config, FleetSeed::default_fleet()).await.unwrap();
        assert_eq!(summary.vessels, 4);
        assert!(summary.ticks > 0);
        assert!(summary.polls > 0);

        let store = SledStateStore::open(&dir, Default::default()).unwrap();
        let rows = store.get_all_with_states().await.unwrap();
        assert!(rows.iter().all(|(_, s)| s.revision > 0));
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_invalid_multiplier_is_refused_before_ticking() {
        let dir = std::env::temp_dir().join(format!("fleet-live-bad-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let options = LiveOptions {
            db_path: dir.clone(),
            duration: Duration::from_millis(50),
            multiplier: 50.0,
        };

        let err = run_live(options, FleetConfig::default(), FleetSeed::default_fleet())
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::Service(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! Sled-backed implementation of [`StateStore`].
//!
//! Uses an embedded key-value database for durability, one tree per table.
//! Single-row writes run in a single-tree transaction; the bulk reset and
//! the cascading removal run in one transaction each, so they either land
//! completely or not at all.

use super::pool::{PoolConfig, PoolStats, StorePool};
use super::schema::{
    self, decode, decode_version, encode, waypoint_key, waypoint_prefix, BASELINE_TREE, META_TREE,
    ROUTE_TREE, SCHEMA_VERSION, SCHEMA_VERSION_KEY, STATE_TREE, VESSEL_TREE, WAYPOINT_TREE,
};
use super::{SeedOutcome, StateStore, StoreError, UpdateOutcome};
use crate::models::{Baseline, Route, Vessel, VesselState, Waypoint};
use crate::seed::FleetSeed;
use async_trait::async_trait;
use fleet_env::VesselId;
use sled::transaction::{ConflictableTransactionError, TransactionResult};
use sled::{Transactional, Tree};
use std::path::Path;
use tracing::{debug, info, warn};

fn abort(err: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err)
}

/// Handles to every tree of the schema. Cheap to clone.
#[derive(Clone)]
struct Trees {
    db: sled::Db,
    vessels: Tree,
    states: Tree,
    routes: Tree,
    waypoints: Tree,
    baselines: Tree,
}

impl Trees {
    fn open(db: sled::Db) -> Result<Self, StoreError> {
        let meta = db.open_tree(META_TREE)?;
        match meta.get(SCHEMA_VERSION_KEY)? {
            Some(raw) => {
                let found = decode_version(&raw)?;
                if found != SCHEMA_VERSION {
                    return Err(StoreError::SchemaMismatch {
                        found,
                        expected: SCHEMA_VERSION,
                    });
                }
            }
            None => {
                meta.insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION.to_be_bytes().to_vec())?;
            }
        }

        Ok(Self {
            vessels: db.open_tree(VESSEL_TREE)?,
            states: db.open_tree(STATE_TREE)?,
            routes: db.open_tree(ROUTE_TREE)?,
            waypoints: db.open_tree(WAYPOINT_TREE)?,
            baselines: db.open_tree(BASELINE_TREE)?,
            db,
        })
    }

    fn load_state(&self, vessel: &Vessel) -> Result<VesselState, StoreError> {
        let raw = self.states.get(vessel.id.as_key())?.ok_or_else(|| {
            StoreError::Integrity(format!("vessel {} has no state row", vessel.id))
        })?;
        decode(&raw)
    }

    fn all_with_states(&self) -> Result<Vec<(Vessel, VesselState)>, StoreError> {
        let mut fleet = Vec::with_capacity(self.vessels.len());
        for entry in self.vessels.iter() {
            let (_, raw) = entry?;
            let vessel: Vessel = decode(&raw)?;
            let state = self.load_state(&vessel)?;
            fleet.push((vessel, state));
        }
        Ok(fleet)
    }

    fn by_id(&self, id: &VesselId) -> Result<Option<(Vessel, VesselState)>, StoreError> {
        let Some(raw) = self.vessels.get(id.as_key())? else {
            return Ok(None);
        };
        let vessel: Vessel = decode(&raw)?;
        let state = self.load_state(&vessel)?;
        Ok(Some((vessel, state)))
    }

    fn waypoints_of(&self, id: &VesselId) -> Result<Vec<Waypoint>, StoreError> {
        let mut waypoints = Vec::new();
        for entry in self.waypoints.scan_prefix(waypoint_prefix(id)) {
            let (_, raw) = entry?;
            let waypoint: Waypoint = decode(&raw)?;
            if waypoint.sequence as usize != waypoints.len() {
                return Err(StoreError::Integrity(format!(
                    "vessel {} waypoint sequence gap at {}",
                    id,
                    waypoints.len()
                )));
            }
            waypoints.push(waypoint);
        }
        Ok(waypoints)
    }

    fn update(&self, state: &VesselState) -> Result<UpdateOutcome, StoreError> {
        state.validate()?;
        let key = state.vessel_id.as_key();

        let result: TransactionResult<UpdateOutcome, StoreError> = self.states.transaction(|tx| {
            let Some(raw) = tx.get(key)? else {
                return Ok(UpdateOutcome::Missing);
            };
            let current: VesselState = decode(&raw).map_err(abort)?;
            if current.revision != state.revision {
                return Ok(UpdateOutcome::Stale {
                    stored_revision: current.revision,
                });
            }

            let mut next = state.clone();
            next.revision = current.revision + 1;
            tx.insert(key, encode(&next).map_err(abort)?)?;
            Ok(UpdateOutcome::Applied {
                revision: next.revision,
            })
        });
        Ok(result?)
    }

    fn baselines(&self) -> Result<Vec<(VesselId, Baseline)>, StoreError> {
        let mut baselines = Vec::with_capacity(self.baselines.len());
        for entry in self.baselines.iter() {
            let (key, raw) = entry?;
            let id = std::str::from_utf8(&key)
                .ok()
                .and_then(|s| VesselId::parse(s).ok())
                .ok_or_else(|| StoreError::Integrity("baseline key is not a vessel id".to_string()))?;
            baselines.push((id, decode(&raw)?));
        }
        Ok(baselines)
    }

    /// Restores every state row to its baseline in one transaction.
    ///
    /// `fail_after` aborts the transaction once that many rows have been
    /// written, which is how the rollback path is exercised.
    fn reset(&self, now_ms: i64, fail_after: Option<usize>) -> Result<usize, StoreError> {
        // Baselines are static after seeding, so reading them outside the
        // transaction cannot race with anything
        let baselines = self.baselines()?;
        if baselines.len() != self.vessels.len() {
            return Err(StoreError::Integrity(format!(
                "{} baselines for {} vessels",
                baselines.len(),
                self.vessels.len()
            )));
        }

        let result: TransactionResult<usize, StoreError> = self.states.transaction(|tx| {
            for (written, (id, baseline)) in baselines.iter().enumerate() {
                if fail_after == Some(written) {
                    return Err(abort(StoreError::Integrity(format!(
                        "reset aborted after {} rows",
                        written
                    ))));
                }
                let raw = tx.get(id.as_key())?.ok_or_else(|| {
                    abort(StoreError::Integrity(format!("vessel {} has no state row", id)))
                })?;
                let current: VesselState = decode(&raw).map_err(abort)?;
                let restored = baseline.to_state(id.clone(), now_ms, current.revision + 1);
                tx.insert(id.as_key(), encode(&restored).map_err(abort)?)?;
            }
            Ok(baselines.len())
        });

        let count = result?;
        self.db.flush()?;
        Ok(count)
    }

    fn seed(&self, seed: &FleetSeed, now_ms: i64) -> Result<SeedOutcome, StoreError> {
        seed.validate()?;
        if !self.vessels.is_empty() {
            return Ok(SeedOutcome::AlreadySeeded {
                vessels: self.vessels.len(),
            });
        }

        // Row ids are allocated up front; generate_id is not transactional
        let mut rows = Vec::with_capacity(seed.vessels.len());
        for entry in &seed.vessels {
            let mut waypoints = Vec::with_capacity(entry.waypoints.len());
            for (sequence, (latitude, longitude)) in entry.waypoints.iter().enumerate() {
                waypoints.push(Waypoint {
                    id: self.db.generate_id()?,
                    vessel_id: entry.vessel.id.clone(),
                    latitude: *latitude,
                    longitude: *longitude,
                    sequence: sequence as u32,
                });
            }
            let route = Route {
                vessel_id: entry.vessel.id.clone(),
                name: entry.route_name.clone(),
            };
            let state = entry.baseline.to_state(entry.vessel.id.clone(), now_ms, 0);
            rows.push((entry, route, waypoints, state));
        }

        let result: TransactionResult<(), StoreError> = (
            &self.vessels,
            &self.states,
            &self.routes,
            &self.waypoints,
            &self.baselines,
        )
            .transaction(|(vessels, states, routes, waypoints, baselines)| {
                for (entry, route, points, state) in &rows {
                    let key = entry.vessel.id.as_key();
                    vessels.insert(key, encode(&entry.vessel).map_err(abort)?)?;
                    states.insert(key, encode(state).map_err(abort)?)?;
                    routes.insert(key, encode(route).map_err(abort)?)?;
                    baselines.insert(key, encode(&entry.baseline).map_err(abort)?)?;
                    for point in points {
                        waypoints.insert(
                            waypoint_key(&point.vessel_id, point.sequence),
                            encode(point).map_err(abort)?,
                        )?;
                    }
                }
                Ok(())
            });
        result?;
        self.db.flush()?;

        Ok(SeedOutcome::Seeded {
            vessels: rows.len(),
        })
    }

    fn update_metadata(&self, vessel: &Vessel) -> Result<bool, StoreError> {
        vessel.validate()?;
        let key = vessel.id.as_key();
        let result: TransactionResult<bool, StoreError> = self.vessels.transaction(|tx| {
            if tx.get(key)?.is_none() {
                return Ok(false);
            }
            tx.insert(key, encode(vessel).map_err(abort)?)?;
            Ok(true)
        });
        Ok(result?)
    }

    fn remove(&self, id: &VesselId) -> Result<bool, StoreError> {
        // Waypoints are static, so their keys can be listed up front
        let mut waypoint_keys = Vec::new();
        for entry in self.waypoints.scan_prefix(waypoint_prefix(id)) {
            let (key, _) = entry?;
            waypoint_keys.push(key);
        }

        let key = id.as_key();
        let result: TransactionResult<bool, StoreError> = (
            &self.vessels,
            &self.states,
            &self.routes,
            &self.waypoints,
            &self.baselines,
        )
            .transaction(|(vessels, states, routes, waypoints, baselines)| {
                if vessels.remove(key)?.is_none() {
                    return Ok(false);
                }
                states.remove(key)?;
                routes.remove(key)?;
                baselines.remove(key)?;
                for wp_key in &waypoint_keys {
                    waypoints.remove(wp_key.clone())?;
                }
                Ok(true)
            });

        let removed = result?;
        if removed {
            self.db.flush()?;
        }
        Ok(removed)
    }
}

/// Persistent vessel store on an embedded sled database.
#[derive(Clone)]
pub struct SledStateStore {
    trees: Trees,
    pool: StorePool,
}

impl SledStateStore {
    /// Open a persistent store at the given path.
    pub fn open<P: AsRef<Path>>(path: P, pool: PoolConfig) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db, pool)
    }

    /// Create a temporary store, deleted on drop (tests and dry runs).
    pub fn open_temporary(pool: PoolConfig) -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, pool)
    }

    /// Wrap an already opened database.
    pub fn from_db(db: sled::Db, pool: PoolConfig) -> Result<Self, StoreError> {
        let trees = Trees::open(db)?;
        debug!(vessels = trees.vessels.len(), "state store opened");
        Ok(Self {
            trees,
            pool: StorePool::new(pool),
        })
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Flushes dirty pages to disk.
    pub async fn flush(&self) -> Result<usize, StoreError> {
        Ok(self.trees.db.flush_async().await?)
    }

    /// Like [`StateStore::reset_all`] but aborts after `rows` writes.
    #[cfg(test)]
    pub(crate) async fn reset_all_failing_after(&self, now_ms: i64, rows: usize) -> Result<usize, StoreError> {
        let trees = self.trees.clone();
        self.pool.run("reset_all", move || trees.reset(now_ms, Some(rows))).await
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn get_all_with_states(&self) -> Result<Vec<(Vessel, VesselState)>, StoreError> {
        let trees = self.trees.clone();
        self.pool.run("get_all_with_states", move || trees.all_with_states()).await
    }

    async fn get_by_id(&self, id: &VesselId) -> Result<Option<(Vessel, VesselState)>, StoreError> {
        let trees = self.trees.clone();
        let id = id.clone();
        self.pool.run("get_by_id", move || trees.by_id(&id)).await
    }

    async fn update_state(&self, state: &VesselState) -> Result<UpdateOutcome, StoreError> {
        let trees = self.trees.clone();
        let state = state.clone();
        let vessel_id = state.vessel_id.clone();
        let outcome = self.pool.run("update_state", move || trees.update(&state)).await?;
        if outcome == UpdateOutcome::Missing {
            warn!(vessel = %vessel_id, "state update affected zero rows; vessel removed?");
        }
        Ok(outcome)
    }

    async fn get_waypoints(&self, id: &VesselId) -> Result<Vec<Waypoint>, StoreError> {
        let trees = self.trees.clone();
        let id = id.clone();
        self.pool.run("get_waypoints", move || trees.waypoints_of(&id)).await
    }

    async fn get_route(&self, id: &VesselId) -> Result<Option<Route>, StoreError> {
        let trees = self.trees.clone();
        let id = id.clone();
        self.pool
            .run("get_route", move || match trees.routes.get(id.as_key())? {
                Some(raw) => Ok(Some(schema::decode(&raw)?)),
                None => Ok(None),
            })
            .await
    }

    async fn reset_all(&self, now_ms: i64) -> Result<usize, StoreError> {
        let trees = self.trees.clone();
        self.pool.run("reset_all", move || trees.reset(now_ms, None)).await
    }

    async fn update_vessel_metadata(&self, vessel: &Vessel) -> Result<bool, StoreError> {
        let trees = self.trees.clone();
        let vessel = vessel.clone();
        self.pool.run("update_vessel_metadata", move || trees.update_metadata(&vessel)).await
    }

    async fn remove_vessel(&self, id: &VesselId) -> Result<bool, StoreError> {
        let trees = self.trees.clone();
        let id = id.clone();
        let removed = self.pool.run("remove_vessel", {
            let id = id.clone();
            move || trees.remove(&id)
        })
        .await?;
        if removed {
            info!(vessel = %id, "vessel removed with its route, waypoints and state");
        }
        Ok(removed)
    }

    async fn seed(&self, seed: &FleetSeed, now_ms: i64) -> Result<SeedOutcome, StoreError> {
        let trees = self.trees.clone();
        let seed = seed.clone();
        let outcome = self.pool.run("seed", move || trees.seed(&seed, now_ms)).await?;
        match outcome {
            SeedOutcome::Seeded { vessels } => info!(vessels, "fleet seeded"),
            SeedOutcome::AlreadySeeded { vessels } => debug!(vessels, "store already seeded"),
        }
        Ok(outcome)
    }

    async fn vessel_count(&self) -> Result<usize, StoreError> {
        let trees = self.trees.clone();
        self.pool.run("vessel_count", move || Ok(trees.vessels.len())).await
    }
}

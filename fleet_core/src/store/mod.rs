//! The State Store - persisted vessel rows behind an async repository trait
//!
//! The scheduler and the polling readers only ever touch vessel state
//! through [`StateStore`]. Writes are single-row and independent across
//! vessels; the only multi-row write is the all-or-nothing [`reset_all`].
//!
//! Readers see the latest committed row. No reader performs a
//! read-modify-write against vessel state, so nothing stronger than
//! read-committed is needed for them.
//!
//! [`reset_all`]: StateStore::reset_all

mod pool;
mod schema;
mod sled_store;

pub use pool::{PoolConfig, PoolStats, StorePool};
pub use schema::SCHEMA_VERSION;
pub use sled_store::SledStateStore;

use crate::models::{ConstraintViolation, Route, Vessel, VesselState, Waypoint};
use crate::seed::{FleetSeed, SeedError};
use async_trait::async_trait;
use fleet_env::VesselId;
use sled::transaction::TransactionError;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Constraint violation: {0}")]
    Constraint(#[from] ConstraintViolation),

    #[error("Invalid seed data: {0}")]
    Seed(#[from] SeedError),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Schema version mismatch: store has {found}, expected {expected}")]
    SchemaMismatch { found: u32, expected: u32 },

    #[error("Timed out after {waited_ms}ms waiting for a store permit ({op})")]
    PoolTimeout { op: &'static str, waited_ms: u64 },

    #[error("Store command {op} exceeded {limit_ms}ms")]
    CommandTimeout { op: &'static str, limit_ms: u64 },

    #[error("Store pool closed")]
    PoolClosed,

    #[error("Store task failed: {0}")]
    Task(String),
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(err: TransactionError<StoreError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => StoreError::Storage(e),
        }
    }
}

/// Result of a single-row update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Row written; it now carries `revision`
    Applied { revision: u64 },

    /// The row changed since the caller read it (e.g. a reset landed in
    /// between); the write was discarded
    Stale { stored_revision: u64 },

    /// Zero rows affected; the vessel was removed mid-flight
    Missing,
}

/// Whether `seed` wrote anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded { vessels: usize },
    AlreadySeeded { vessels: usize },
}

/// Repository over vessel, state, route and waypoint rows.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Every vessel paired with its current state, ordered by vessel id.
    ///
    /// Never returns partial results: a vessel without a state row is an
    /// integrity error.
    async fn get_all_with_states(&self) -> Result<Vec<(Vessel, VesselState)>, StoreError>;

    /// One vessel and its state; `None` if the id is unknown.
    async fn get_by_id(&self, id: &VesselId) -> Result<Option<(Vessel, VesselState)>, StoreError>;

    /// Writes one state row keyed by vessel id.
    ///
    /// The write only applies if the stored row still carries
    /// `state.revision`, i.e. the caller's snapshot is current.
    async fn update_state(&self, state: &VesselState) -> Result<UpdateOutcome, StoreError>;

    /// The vessel's waypoints sorted by sequence ascending.
    async fn get_waypoints(&self, id: &VesselId) -> Result<Vec<Waypoint>, StoreError>;

    /// The vessel's route; `None` if the id is unknown.
    async fn get_route(&self, id: &VesselId) -> Result<Option<Route>, StoreError>;

    /// Restores every vessel to its baseline in one transaction.
    ///
    /// Returns the number of rows restored; on error nothing was changed.
    async fn reset_all(&self, now_ms: i64) -> Result<usize, StoreError>;

    /// Replaces a vessel's metadata. Returns false if the id is unknown.
    async fn update_vessel_metadata(&self, vessel: &Vessel) -> Result<bool, StoreError>;

    /// Removes a vessel and every row it owns. Returns false if unknown.
    async fn remove_vessel(&self, id: &VesselId) -> Result<bool, StoreError>;

    /// Writes the fleet if the store is empty.
    async fn seed(&self, seed: &FleetSeed, now_ms: i64) -> Result<SeedOutcome, StoreError>;

    /// Number of vessels stored.
    async fn vessel_count(&self) -> Result<usize, StoreError>;
}

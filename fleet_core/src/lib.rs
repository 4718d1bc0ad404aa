//! Survey Fleet Core - navigation, status policy and persisted vessel state
//!
//! A small fleet of survey vessels follows looping waypoint routes. This
//! crate holds everything with real invariants:
//! 1. **Navigation**: haversine arrival detection with a dynamic threshold
//!    that cannot oscillate at high time compression
//! 2. **Status**: an explicit Active/Charging/Maintenance state machine with
//!    hysteresis bands
//! 3. **Store**: a sled-backed repository with atomic per-vessel updates and
//!    an all-or-nothing bulk reset
//!
//! The scheduler is stateless between ticks. Every tick reads the latest
//! committed rows, computes the next state per vessel and writes it back.
//! Readers poll the same rows and always see the latest committed snapshot;
//! there is no push notification.

pub mod config;
pub mod models;
pub mod navigation;
pub mod reset;
pub mod scheduler;
pub mod seed;
pub mod service;
pub mod status;
pub mod store;

// Re-export key types for convenience
pub use config::{ConfigError, FleetConfig};
pub use models::{Baseline, ConstraintViolation, Route, Vessel, VesselState, VesselStatus, Waypoint};
pub use navigation::{EnergyModel, NavOutcome, NavStep, NavigationError};
pub use reset::ResetCoordinator;
pub use scheduler::{
    SchedulerConfig, SimulationScheduler, SpeedControl, SpeedMultiplier, TickReport, MAX_MULTIPLIER,
    MIN_MULTIPLIER,
};
pub use seed::{FleetSeed, SeedError, VesselSeed};
pub use service::{FleetService, ResetResponse, ServiceError, VesselStatusDto};
pub use status::{EnergyBand, SpeedBehavior, StatusPolicy};
pub use store::{PoolConfig, PoolStats, SeedOutcome, SledStateStore, StateStore, StoreError, UpdateOutcome};

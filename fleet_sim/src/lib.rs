//! Survey Fleet Deterministic Simulation Harness
//!
//! Runs the production scheduler, store and boundary service against a
//! virtual clock so that whole-fleet behaviour can be checked tick by tick.
//!
//! # Core Principle
//!
//! All sources of non-determinism are controlled:
//! - **Time**: a virtual clock that scenarios advance one interval per tick
//! - **Randomness**: multiplier schedules come from a single 64-bit seed
//! - **Storage**: each scenario gets its own sled database
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                          │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (virtual clock + ChaCha8 RNG)             │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼──────────────┐   ┌─────▼──────────┐                 │
//! │  │ SimulationScheduler│   │ FleetService   │  (poll/reset)  │
//! │  └────┬──────────────┘   └─────┬──────────┘                 │
//! │       └──────────┬─────────────┘                            │
//! │            ┌─────▼─────┐                                    │
//! │            │ sled store │ ──► invariant checks per tick     │
//! │            └───────────┘                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use fleet_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let runner = ScenarioRunner::new(42).with_duration(3600.0);
//! let result = runner.run(ScenarioId::ResetRace).await;
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod invariants;
pub mod live;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{FrameRecorder, SimEvent, SimExport, SimFrame, VesselFrame};
pub use invariants::{check_fleet, check_state, route_lengths};
pub use live::{run_live, LiveOptions, LiveSummary};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};

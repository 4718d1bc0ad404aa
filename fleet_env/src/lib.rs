//! Survey Fleet Environment Abstraction Layer
//!
//! This crate provides the abstraction allowing the fleet scheduler to run
//! in both **Production** (tokio wall clock) and **Simulation** (virtual
//! clock) environments.
//!
//! # Core Concept
//!
//! The scheduler never reads the OS clock or spawns tasks directly. It goes
//! through a [`FleetContext`]:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Task spawning (`spawn()`)
//!
//! With a virtual clock the whole tick loop becomes reproducible, which is
//! how the simulation harness drives hours of simulated patrol in
//! milliseconds.
//!
//! # Example
//!
//! ```ignore
//! use fleet_env::FleetContext;
//!
//! async fn tick_loop<Ctx: FleetContext>(ctx: &Ctx) {
//!     loop {
//!         ctx.sleep(Duration::from_secs(1)).await;
//!         tick();
//!     }
//! }
//! ```

mod context;
mod error;
mod task;
mod tokio_impl;
mod types;

pub use context::FleetContext;
pub use error::EnvError;
pub use task::{run_blocking, with_timeout};
pub use tokio_impl::TokioContext;
pub use types::VesselId;

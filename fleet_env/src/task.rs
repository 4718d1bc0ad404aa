//! Helpers for bounding and offloading work.

use crate::error::EnvError;
use std::future::Future;
use std::time::Duration;

/// Awaits `future`, failing with [`EnvError::Timeout`] once `limit` elapses.
pub async fn with_timeout<F, T>(limit: Duration, future: F) -> Result<T, EnvError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| EnvError::timeout(limit))
}

/// Runs blocking work on the tokio blocking pool.
///
/// Blocking storage calls must not stall the worker threads that drive the
/// per-vessel tick tasks.
pub async fn run_blocking<F, T>(f: F) -> Result<T, EnvError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EnvError::TaskFailed(e.to_string()))
}

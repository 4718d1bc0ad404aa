//! Bounded access to the embedded store.
//!
//! sled has no connections to pool, but the blocking threads running store
//! commands are still a finite resource. Every command takes one permit
//! from a semaphore sized like a connection pool, so a burst of ticks at the
//! maximum multiplier queues for a bounded time and then fails fast instead
//! of piling up.

use super::StoreError;
use fleet_env::{run_blocking, with_timeout};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::warn;

/// Limits for store access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent store commands
    pub max_connections: usize,

    /// How long a command may wait for a permit
    pub acquire_timeout_ms: u64,

    /// How long a command may run once it has a permit
    pub command_timeout_ms: u64,

    /// Commands slower than this are logged as slow queries
    pub slow_query_threshold_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            acquire_timeout_ms: 30_000,
            command_timeout_ms: 60_000,
            slow_query_threshold_ms: 100,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }

    pub fn is_consistent(&self) -> bool {
        self.max_connections > 0 && self.acquire_timeout_ms > 0 && self.command_timeout_ms > 0
    }
}

/// Snapshot of pool usage, the tuning signal for pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub max_connections: usize,
    pub available: usize,
    pub slow_queries: u64,
}

/// Semaphore-bounded executor for blocking store commands.
#[derive(Clone)]
pub struct StorePool {
    config: PoolConfig,
    permits: Arc<Semaphore>,
    slow_queries: Arc<AtomicU64>,
}

impl StorePool {
    pub fn new(config: PoolConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_connections.max(1)));
        Self {
            config,
            permits,
            slow_queries: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max_connections: self.config.max_connections,
            available: self.permits.available_permits(),
            slow_queries: self.slow_queries.load(Ordering::Relaxed),
        }
    }

    /// Runs `work` on the blocking pool under a permit.
    ///
    /// # Errors
    /// * `PoolTimeout` - no permit within `acquire_timeout`
    /// * `CommandTimeout` - `work` did not finish within `command_timeout`;
    ///   the blocking call itself is not interrupted and keeps its permit
    ///   until it returns
    pub async fn run<F, T>(&self, op: &'static str, work: F) -> Result<T, StoreError>
    where
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let started = Instant::now();

        let permit = with_timeout(self.config.acquire_timeout(), Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| StoreError::PoolTimeout {
                op,
                waited_ms: started.elapsed().as_millis() as u64,
            })?
            .map_err(|_| StoreError::PoolClosed)?;

        let held = move || {
            let _permit = permit;
            work()
        };
        let result = with_timeout(self.config.command_timeout(), run_blocking(held))
            .await
            .map_err(|_| StoreError::CommandTimeout {
                op,
                limit_ms: self.config.command_timeout_ms,
            })?
            .map_err(|e| StoreError::Task(e.to_string()))?;

        let elapsed = started.elapsed();
        if elapsed > self.config.slow_query_threshold() {
            self.slow_queries.fetch_add(1, Ordering::Relaxed);
            warn!(
                op,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.config.slow_query_threshold_ms,
                "slow store query"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny(max: usize, acquire_ms: u64, command_ms: u64) -> StorePool {
        StorePool::new(PoolConfig {
            max_connections: max,
            acquire_timeout_ms: acquire_ms,
            command_timeout_ms: command_ms,
            slow_query_threshold_ms: 20,
        })
    }

    #[tokio::test]
    async fn test_run_returns_work_result() {
        let pool = tiny(2, 1_000, 1_000);
        let value = pool.run("probe", || Ok(41 + 1)).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.stats().available, 2);
    }

    #[tokio::test]
    async fn test_exhausted_pool_fails_fast() {
        let pool = tiny(1, 50, 5_000);
        let busy = pool.clone();
        let hog = tokio::spawn(async move {
            busy.run("hog", || {
                std::thread::sleep(Duration::from_millis(400));
                Ok(())
            })
            .await
        });

        // Let the hog take the only permit
        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = pool.run("starved", || Ok(())).await.unwrap_err();
        assert!(matches!(err, StoreError::PoolTimeout { op: "starved", .. }));

        hog.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let pool = tiny(1, 1_000, 30);
        let err = pool
            .run("stuck", || {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CommandTimeout { op: "stuck", limit_ms: 30 }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timed_out_commands_stay_bounded() {
        let pool = tiny(1, 2_000, 20);
        let running = Arc::new(AtomicU64::new(0));
        let peak = Arc::new(AtomicU64::new(0));

        let mut calls = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            calls.push(tokio::spawn(async move {
                pool.run("slow", move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(100));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }

        for call in calls {
            let err = call.await.unwrap().unwrap_err();
            assert!(matches!(err, StoreError::CommandTimeout { op: "slow", .. }));
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);

        // The last blocking command still holds the permit until it returns
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(pool.stats().available, 1);
    }

    #[tokio::test]
    async fn test_slow_query_is_counted_not_failed() {
        let pool = tiny(1, 1_000, 5_000);
        pool.run("slow", || {
            std::thread::sleep(Duration::from_millis(60));
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(pool.stats().slow_queries, 1);
    }
}

// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{anyhow, Result};
use rayon::ThreadPool;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::Semaphore, time::sleep};
use tracing::warn;

/// Default worker count for a node's CPU-bound work.
pub const DEFAULT_WORKERS: usize = 8;

/// A bounded executor for CPU-bound crypto work backed by a Rayon pool.
///
/// Request handlers hand their heavy tensor operations here so the async
/// transport never blocks a runtime worker; the semaphore caps how many
/// requests can be queued into the pool at once.
#[derive(Clone)]
pub struct TaskPool {
    semaphore: Arc<Semaphore>,
    thread_pool: Arc<ThreadPool>,
    slow_after: Duration,
}

impl TaskPool {
    /// Pool with `threads` workers admitting at most `max_tasks` concurrent
    /// tasks.
    pub fn new(threads: usize, max_tasks: usize) -> Result<TaskPool> {
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()?;
        Ok(TaskPool {
            thread_pool: Arc::new(thread_pool),
            semaphore: Arc::new(Semaphore::new(max_tasks.max(1))),
            slow_after: Duration::from_secs(10),
        })
    }

    pub fn with_defaults() -> Result<TaskPool> {
        Self::new(DEFAULT_WORKERS, DEFAULT_WORKERS * 4)
    }

    /// Runs `op` on the pool and resolves with its result. Long-running
    /// jobs are logged once past the slow threshold.
    pub async fn spawn<OP, T>(&self, task_name: &str, op: OP) -> Result<T>
    where
        T: Debug + Send + 'static,
        OP: FnOnce() -> T + Send + 'static,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| anyhow!("task pool closed while '{task_name}' waited"))?;

        let name = task_name.to_owned();
        let slow_after = self.slow_after;
        let watchdog = tokio::spawn(async move {
            sleep(slow_after).await;
            warn!(task = %name, "job still running after {slow_after:?}");
        });

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.thread_pool.spawn(move || {
            // a dropped receiver just discards the result
            let _ = tx.send(op());
        });

        let output = rx
            .await
            .map_err(|_| anyhow!("worker for '{task_name}' dropped its result"))?;
        watchdog.abort();
        Ok(output)
    }
}

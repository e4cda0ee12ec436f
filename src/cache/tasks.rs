//! Tracked background refresh tasks.
//!
//! Stale-while-revalidate refreshes outlive the request that triggered them.
//! They are spawned into a shared [`JoinSet`] instead of being detached so
//! the process can wait for in-flight refreshes during shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Handle to the set of running background tasks. Cheap to clone.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    set: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task into the tracked set.
    ///
    /// Finished tasks are reaped first so the set only grows with tasks
    /// that are still running.
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.set.lock().await;
        while let Some(finished) = set.try_join_next() {
            log_join_result(finished);
        }
        set.spawn(task);
        debug!(pending = set.len(), "Spawned background task");
    }

    /// Number of tasks spawned and not yet reaped.
    pub async fn len(&self) -> usize {
        self.set.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.set.lock().await.is_empty()
    }

    /// Wait for every task spawned so far. Returns how many were awaited.
    ///
    /// The set is swapped out before waiting, so tasks spawned while draining
    /// land in a fresh set and are not waited on by this call.
    pub async fn drain(&self) -> usize {
        let mut set = std::mem::take(&mut *self.set.lock().await);
        let mut drained = 0;
        while let Some(finished) = set.join_next().await {
            log_join_result(finished);
            drained += 1;
        }
        drained
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Background task panicked");
        }
    }
}

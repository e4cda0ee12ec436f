//! Fill-state machine for a cached key.
//!
//! Every cached key (the directory listing and each feature set) owns a
//! [`FillGate`]. The gate decides, per request, whether to serve cached data,
//! block on a synchronous fill, or serve stale data while a background
//! refresh runs:
//!
//! ```text
//!            CAS, fill ok                     stale + CAS
//!   Empty ─────────────────► FillingSync ──► Full ─────────► FillingAsync
//!     ▲      (losers wait)        │           ▲                   │
//!     └───── retries exhausted ───┘           └─── always (CAS) ──┘
//! ```
//!
//! Every transition is a compare-and-swap from an expected prior state, which
//! keeps at most one fill in flight per key without holding a lock across the
//! upstream call.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::retry;
use crate::cache::tasks::BackgroundTasks;
use crate::metrics::CacheMetrics;
use crate::upstream::PopulateError;

/// Lifecycle stage of a cached key's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FillState {
    /// Never successfully filled.
    Empty = 0,
    /// First fill in progress; readers wait for it.
    FillingSync = 1,
    /// Background refresh in progress; readers get the cached data.
    FillingAsync = 2,
    /// Filled.
    Full = 3,
}

impl FillState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => FillState::Empty,
            1 => FillState::FillingSync,
            2 => FillState::FillingAsync,
            _ => FillState::Full,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FillState::Empty => "empty",
            FillState::FillingSync => "filling_sync",
            FillState::FillingAsync => "filling_async",
            FillState::Full => "full",
        }
    }
}

impl fmt::Display for FillState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staleness window and attempt budgets for one kind of fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillPolicy {
    /// Age after which a Full key is refreshed in the background.
    pub ttl: Duration,
    /// Attempts for the blocking first fill.
    pub sync_attempts: u32,
    /// Attempts for a background refresh.
    pub async_attempts: u32,
}

/// How [`FillGate::ensure`] satisfied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// Cached data within its staleness window.
    Fresh,
    /// This caller ran the first fill.
    Filled,
    /// This caller waited for another caller's first fill.
    Waited,
    /// Data was stale; this caller started the background refresh.
    Refreshing,
    /// Data was stale and a refresh was already running.
    Stale,
}

impl FillOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillOutcome::Fresh => "fresh",
            FillOutcome::Filled => "filled",
            FillOutcome::Waited => "waited",
            FillOutcome::Refreshing => "refreshing",
            FillOutcome::Stale => "stale",
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("{scope} {key}: fill failed after {attempts} attempt(s): {source}")]
    FillFailed {
        scope: &'static str,
        key: String,
        attempts: u32,
        #[source]
        source: PopulateError,
    },

    #[error("{scope} {key}: the fill this request waited on failed")]
    FillAbandoned { scope: &'static str, key: String },

    #[error("{scope} {key}: fill state transition {from} -> {to} found {actual}")]
    Contention {
        scope: &'static str,
        key: String,
        from: FillState,
        to: FillState,
        actual: FillState,
    },

    #[error("{scope} {key}: fill task panicked")]
    FillPanicked { scope: &'static str, key: String },
}

/// Shared services a fill needs beyond the gate itself.
#[derive(Clone)]
pub struct FillContext {
    pub tasks: BackgroundTasks,
    pub metrics: Arc<CacheMetrics>,
}

/// CAS-guarded fill state, staleness clock and waiter notification for one key.
pub struct FillGate {
    scope: &'static str,
    key: String,
    state: AtomicU8,
    touched_at: RwLock<Option<Instant>>,
    filled: Notify,
}

impl FillGate {
    /// `scope` names the kind of key ("directory", "set") for logs and metrics.
    pub fn new(scope: &'static str, key: impl Into<String>) -> Self {
        Self {
            scope,
            key: key.into(),
            state: AtomicU8::new(FillState::Empty as u8),
            touched_at: RwLock::new(None),
            filled: Notify::new(),
        }
    }

    pub fn state(&self) -> FillState {
        FillState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Time of the last successful fill.
    pub async fn touched_at(&self) -> Option<Instant> {
        *self.touched_at.read().await
    }

    fn try_transition(&self, from: FillState, to: FillState) -> Result<(), FillState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(FillState::from_u8)
    }

    /// A transition this caller owns by construction. Failure is an invariant
    /// violation and is reported, never retried.
    fn transition(&self, from: FillState, to: FillState) -> Result<(), CacheError> {
        self.try_transition(from, to).map_err(|actual| {
            error!(
                scope = self.scope,
                key = %self.key,
                %from,
                %to,
                %actual,
                "Fill state CAS failed"
            );
            CacheError::Contention {
                scope: self.scope,
                key: self.key.clone(),
                from,
                to,
                actual,
            }
        })
    }

    async fn is_stale(&self, ttl: Duration) -> bool {
        match *self.touched_at.read().await {
            Some(at) => at.elapsed() >= ttl,
            None => true,
        }
    }

    /// Wait until the state leaves FillingSync.
    async fn wait_for_sync_fill(&self) {
        loop {
            let notified = self.filled.notified();
            tokio::pin!(notified);
            // Register before re-checking so a completion between the check
            // and the await is not missed.
            notified.as_mut().enable();
            if self.state() != FillState::FillingSync {
                return;
            }
            notified.await;
        }
    }

    /// Make sure the key holds data, running `fill` when needed.
    ///
    /// - Empty: the CAS winner fills synchronously with `policy.sync_attempts`;
    ///   losers wait for the winner like FillingSync observers.
    /// - FillingSync: wait for the in-flight fill; fail if it failed.
    /// - Full: if older than `policy.ttl`, the CAS winner starts a tracked
    ///   background refresh. Never blocks.
    /// - FillingAsync: return at once, cached data stands.
    ///
    /// `fill` must write the key's data before returning `Ok`; the gate
    /// publishes Full only afterwards.
    pub async fn ensure<F, Fut>(
        self: &Arc<Self>,
        policy: &FillPolicy,
        ctx: &FillContext,
        fill: F,
    ) -> Result<FillOutcome, CacheError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PopulateError>> + Send + 'static,
    {
        loop {
            match self.state() {
                FillState::Empty => {
                    if self
                        .try_transition(FillState::Empty, FillState::FillingSync)
                        .is_ok()
                    {
                        return self.fill_sync(policy.sync_attempts, ctx, fill).await;
                    }
                    debug!(scope = self.scope, key = %self.key, "Lost first-fill race, re-reading state");
                }
                FillState::FillingSync => {
                    self.wait_for_sync_fill().await;
                    return match self.state() {
                        FillState::Empty => Err(CacheError::FillAbandoned {
                            scope: self.scope,
                            key: self.key.clone(),
                        }),
                        _ => Ok(FillOutcome::Waited),
                    };
                }
                FillState::FillingAsync => return Ok(FillOutcome::Stale),
                FillState::Full => {
                    if !self.is_stale(policy.ttl).await {
                        return Ok(FillOutcome::Fresh);
                    }
                    if self
                        .try_transition(FillState::Full, FillState::FillingAsync)
                        .is_err()
                    {
                        return Ok(FillOutcome::Stale);
                    }
                    self.spawn_refresh(policy.async_attempts, ctx, fill).await;
                    return Ok(FillOutcome::Refreshing);
                }
            }
        }
    }

    /// Run `fill` under the retry budget and stamp the staleness clock on success.
    async fn run_fill<F, Fut>(&self, attempts: u32, mode: &'static str, fill: &F) -> Result<(), PopulateError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), PopulateError>>,
    {
        retry::run(
            attempts,
            |attempt, err| {
                warn!(
                    scope = self.scope,
                    key = %self.key,
                    mode,
                    attempt,
                    error = %err,
                    "Fill retrying"
                )
            },
            fill,
        )
        .await?;

        *self.touched_at.write().await = Some(Instant::now());
        Ok(())
    }

    /// First fill. Runs in its own task so a caller that is dropped mid-fill
    /// cannot leave the gate stuck in FillingSync.
    async fn fill_sync<F, Fut>(
        self: &Arc<Self>,
        attempts: u32,
        ctx: &FillContext,
        fill: F,
    ) -> Result<FillOutcome, CacheError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PopulateError>> + Send + 'static,
    {
        let gate = Arc::clone(self);
        let metrics = Arc::clone(&ctx.metrics);

        let handle = tokio::spawn(async move {
            let outcome = match gate.run_fill(attempts, "sync", &fill).await {
                Ok(()) => gate
                    .transition(FillState::FillingSync, FillState::Full)
                    .map(|_| FillOutcome::Filled),
                Err(source) => {
                    error!(
                        scope = gate.scope,
                        key = %gate.key,
                        attempts,
                        error = %source,
                        "Fill failed, retries exhausted"
                    );
                    gate.transition(FillState::FillingSync, FillState::Empty)
                        .and(Err(CacheError::FillFailed {
                            scope: gate.scope,
                            key: gate.key.clone(),
                            attempts,
                            source,
                        }))
                }
            };
            gate.filled.notify_waiters();
            metrics.record_fill(gate.scope, "sync", outcome.is_ok());
            if outcome.is_ok() {
                info!(scope = gate.scope, key = %gate.key, "Filled");
            }
            outcome
        });

        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(scope = self.scope, key = %self.key, error = %e, "Fill task failed");
                let _ = self.try_transition(FillState::FillingSync, FillState::Empty);
                self.filled.notify_waiters();
                Err(CacheError::FillPanicked {
                    scope: self.scope,
                    key: self.key.clone(),
                })
            }
        }
    }

    /// Stale-while-revalidate refresh. Publishes Full whatever the outcome,
    /// including a panicking fill; on failure the previous data stays
    /// authoritative.
    async fn spawn_refresh<F, Fut>(self: &Arc<Self>, attempts: u32, ctx: &FillContext, fill: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PopulateError>> + Send + 'static,
    {
        let gate = Arc::clone(self);
        let metrics = Arc::clone(&ctx.metrics);
        debug!(scope = self.scope, key = %self.key, "Starting background refresh");

        ctx.tasks
            .spawn(async move {
                // The fill runs in its own task so a panic surfaces as a
                // JoinError here instead of skipping the transition below.
                let runner = Arc::clone(&gate);
                let joined =
                    tokio::spawn(async move { runner.run_fill(attempts, "async", &fill).await })
                        .await;

                let success = match joined {
                    Ok(Ok(())) => {
                        info!(scope = gate.scope, key = %gate.key, "Refreshed");
                        true
                    }
                    Ok(Err(e)) => {
                        warn!(
                            scope = gate.scope,
                            key = %gate.key,
                            error = %e,
                            "Background refresh failed, serving stale data"
                        );
                        false
                    }
                    Err(e) => {
                        error!(
                            scope = gate.scope,
                            key = %gate.key,
                            error = %e,
                            "Background refresh task failed, serving stale data"
                        );
                        false
                    }
                };
                let _ = gate.transition(FillState::FillingAsync, FillState::Full);
                metrics.record_fill(gate.scope, "async", success);
            })
            .await;
    }
}

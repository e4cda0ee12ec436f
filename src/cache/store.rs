//! CacheStore: the cached directory of feature sets.
//!
//! The store is the entry point for every lookup. It:
//! - Keeps the directory (set name → entry) filled through its own fill gate
//! - Rebuilds the alias index when the alias staleness window has elapsed
//! - Resolves aliases to canonical set names
//! - Delegates feature lookups to the per-set entries

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::alias::AliasIndex;
use crate::cache::entry::FeatureSetEntry;
use crate::cache::fill::{CacheError, FillContext, FillGate, FillOutcome, FillPolicy, FillState};
use crate::cache::tasks::BackgroundTasks;
use crate::config::CacheConfig;
use crate::metrics::CacheMetrics;
use crate::upstream::{FeatureList, PopulateError, Populator};

/// Point-in-time view of the directory returned by [`CacheStore::directory`].
#[derive(Clone)]
pub struct Directory {
    /// Every known set, ordered by name.
    pub sets: BTreeMap<String, Arc<FeatureSetEntry>>,
    /// The alias index in effect when the view was taken.
    pub aliases: Arc<AliasIndex>,
    /// How the directory fill gate served this request.
    pub outcome: FillOutcome,
}

impl Directory {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}

struct StoreInner {
    populator: Arc<dyn Populator>,
    gate: Arc<FillGate>,
    entries: RwLock<HashMap<String, Arc<FeatureSetEntry>>>,
    aliases: RwLock<Arc<AliasIndex>>,
    aliases_touched_at: RwLock<Option<Instant>>,
    directory_policy: FillPolicy,
    set_policy: FillPolicy,
    alias_ttl: Duration,
    alias_fetch_concurrency: usize,
    ctx: FillContext,
}

/// Read-through cache over the upstream directory. Cheap to clone; clones
/// share state.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl CacheStore {
    pub fn new(populator: Arc<dyn Populator>, config: CacheConfig, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                populator,
                gate: Arc::new(FillGate::new("directory", "sets")),
                entries: RwLock::new(HashMap::new()),
                aliases: RwLock::new(Arc::new(AliasIndex::new())),
                aliases_touched_at: RwLock::new(None),
                directory_policy: config.directory_policy(),
                set_policy: config.set_policy(),
                alias_ttl: config.alias_ttl(),
                alias_fetch_concurrency: config.alias_fetch_concurrency.max(1),
                ctx: FillContext {
                    tasks: BackgroundTasks::new(),
                    metrics,
                },
            }),
        }
    }

    async fn ensure_directory(&self) -> Result<FillOutcome, CacheError> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .gate
            .ensure(&self.inner.directory_policy, &self.inner.ctx, move || {
                let inner = Arc::clone(&inner);
                async move { inner.refresh_directory().await }
            })
            .await
    }

    /// Make sure the directory is loaded and return a view of it.
    ///
    /// Blocks only while the very first fill is in flight; afterwards stale
    /// directories are served while a background refresh runs.
    pub async fn directory(&self) -> Result<Directory, CacheError> {
        let outcome = self.ensure_directory().await?;
        let sets = self
            .inner
            .entries
            .read()
            .await
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect();
        let aliases = Arc::clone(&*self.inner.aliases.read().await);
        Ok(Directory {
            sets,
            aliases,
            outcome,
        })
    }

    /// Find the entry for a set name or alias.
    ///
    /// `Ok(None)` means neither a known set nor a known alias; errors are
    /// internal failures, never "not found".
    pub async fn resolve_entry(&self, name: &str) -> Result<Option<Arc<FeatureSetEntry>>, CacheError> {
        self.ensure_directory().await?;

        let canonical = self
            .inner
            .aliases
            .read()
            .await
            .resolve(name)
            .map(str::to_owned);
        if let Some(set) = &canonical {
            debug!(alias = name, set = %set, "Resolved alias");
        }

        let key = canonical.as_deref().unwrap_or(name);
        Ok(self.inner.entries.read().await.get(key).cloned())
    }

    /// Feature list for a set name or alias, filling it on first use.
    pub async fn features(&self, name: &str) -> Result<Option<Arc<FeatureList>>, CacheError> {
        let metrics = &self.inner.ctx.metrics;

        let entry = match self.resolve_entry(name).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                metrics.record_lookup("not_found");
                return Ok(None);
            }
            Err(e) => {
                metrics.record_lookup("error");
                return Err(e);
            }
        };

        match entry
            .ensure_filled(&self.inner.populator, &self.inner.set_policy, &self.inner.ctx)
            .await
        {
            Ok(outcome) => {
                metrics.record_lookup(outcome.as_str());
                Ok(Some(entry.snapshot().await))
            }
            Err(e) => {
                metrics.record_lookup("error");
                Err(e)
            }
        }
    }

    /// Every alias registered for `set`, sorted. Aliases are not resolved:
    /// `set` must be a canonical name.
    pub async fn aliases_for(&self, set: &str) -> Result<Vec<String>, CacheError> {
        self.ensure_directory().await?;
        Ok(self.inner.aliases.read().await.aliases_for(set))
    }

    pub fn directory_state(&self) -> FillState {
        self.inner.gate.state()
    }

    /// Number of sets discovered so far.
    pub async fn known_sets(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    /// Wait for in-flight background refreshes. Returns how many were awaited.
    pub async fn drain_background(&self) -> usize {
        self.inner.ctx.tasks.drain().await
    }
}

impl StoreInner {
    /// Directory fill: discover sets, then rebuild the alias index if it is stale.
    async fn refresh_directory(&self) -> Result<(), PopulateError> {
        info!("Refreshing feature set directory");
        let names = self.populator.list_sets().await?;

        {
            let mut entries = self.entries.write().await;
            for name in &names {
                if !entries.contains_key(name) {
                    debug!(set = %name, "Discovered feature set");
                    entries.insert(name.clone(), Arc::new(FeatureSetEntry::new(name.clone())));
                }
            }
        }

        if self.aliases_stale().await {
            match self.build_alias_index(&names).await {
                Some(index) => {
                    info!(aliases = index.len(), sets = names.len(), "Rebuilt alias index");
                    *self.aliases.write().await = Arc::new(index);
                    *self.aliases_touched_at.write().await = Some(Instant::now());
                }
                // The alias window is not restarted, so the next directory
                // refresh tries again.
                None => warn!(sets = names.len(), "Every alias fetch failed, keeping previous alias index"),
            }
        }

        Ok(())
    }

    async fn aliases_stale(&self) -> bool {
        match *self.aliases_touched_at.read().await {
            Some(at) => at.elapsed() >= self.alias_ttl,
            None => true,
        }
    }

    /// Fetch aliases for every set. A set whose aliases cannot be fetched is
    /// skipped; the rest of the index is still built. `None` when there were
    /// sets to scan and every fetch failed.
    async fn build_alias_index(&self, names: &[String]) -> Option<AliasIndex> {
        let populator = Arc::clone(&self.populator);
        let results: Vec<(String, Result<Vec<String>, PopulateError>)> = stream::iter(names.to_vec())
            .map(move |set| {
                let populator = Arc::clone(&populator);
                async move {
                    let aliases = populator.set_aliases(&set).await;
                    (set, aliases)
                }
            })
            // `buffered` keeps directory order, which decides contested aliases.
            .buffered(self.alias_fetch_concurrency)
            .collect()
            .await;

        let mut pairs = Vec::new();
        let mut fetched = 0;
        for (set, aliases) in results {
            match aliases {
                Ok(aliases) => {
                    fetched += 1;
                    for alias in aliases {
                        debug!(alias = %alias, set = %set, "Alias");
                        pairs.push((alias, set.clone()));
                    }
                }
                Err(e) => warn!(set = %set, error = %e, "Skipping aliases for set"),
            }
        }

        if fetched == 0 && !names.is_empty() {
            return None;
        }
        Some(pairs.into_iter().collect())
    }
}

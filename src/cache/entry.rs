//! Cached feature list for one feature set.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::fill::{CacheError, FillContext, FillGate, FillOutcome, FillPolicy, FillState};
use crate::upstream::{FeatureList, PopulateError, Populator};

/// One named feature set: its own fill gate and the last fetched feature list.
///
/// Entries are created by a directory refresh and never removed. Refreshes
/// replace the snapshot `Arc` as a whole, so readers see either the previous
/// or the next list, never a mix.
pub struct FeatureSetEntry {
    name: String,
    gate: Arc<FillGate>,
    snapshot: RwLock<Arc<FeatureList>>,
}

impl FeatureSetEntry {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            gate: Arc::new(FillGate::new("set", name.clone())),
            name,
            snapshot: RwLock::new(Arc::new(FeatureList::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> FillState {
        self.gate.state()
    }

    pub async fn touched_at(&self) -> Option<tokio::time::Instant> {
        self.gate.touched_at().await
    }

    /// Current `(version, features)`. The zero snapshot until the first fill.
    pub async fn snapshot(&self) -> Arc<FeatureList> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Make sure this set's feature list is loaded, filling or refreshing it
    /// from `populator` according to `policy`.
    pub async fn ensure_filled(
        self: &Arc<Self>,
        populator: &Arc<dyn Populator>,
        policy: &FillPolicy,
        ctx: &FillContext,
    ) -> Result<FillOutcome, CacheError> {
        let entry = Arc::clone(self);
        let populator = Arc::clone(populator);

        self.gate
            .ensure(policy, ctx, move || {
                let entry = Arc::clone(&entry);
                let populator = Arc::clone(&populator);
                async move {
                    let features = populator.set_features(&entry.name).await?;
                    *entry.snapshot.write().await = Arc::new(features);
                    Ok::<(), PopulateError>(())
                }
            })
            .await
    }
}

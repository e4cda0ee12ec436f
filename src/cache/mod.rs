//! Read-through cache engine.
//!
//! - [`fill`]: FillGate, the CAS-driven fill-state machine shared by every cached key
//! - [`retry`]: attempt-budgeted retry loop used by fills
//! - [`entry`]: FeatureSetEntry, the cached feature list for one set
//! - [`alias`]: AliasIndex, alias token to canonical set name
//! - [`store`]: CacheStore, the directory of sets plus alias resolution
//! - [`tasks`]: tracked background refresh tasks

pub mod alias;
pub mod entry;
pub mod fill;
pub mod retry;
pub mod store;
pub mod tasks;

pub use alias::AliasIndex;
pub use entry::FeatureSetEntry;
pub use fill::{CacheError, FillOutcome, FillPolicy, FillState};
pub use store::{CacheStore, Directory};

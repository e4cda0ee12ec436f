//! Alias index: foreign tokens that resolve to a canonical feature set name.
//!
//! The index is immutable once built. A directory refresh builds a new one
//! and swaps it in whole; readers keep whatever `Arc` they already hold.

use std::collections::HashMap;

/// Alias token → canonical set name, plus the reverse listing.
#[derive(Debug, Clone, Default)]
pub struct AliasIndex {
    to_set: HashMap<String, String>,
    by_set: HashMap<String, Vec<String>>,
}

impl AliasIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical set name for `token`, if it is a known alias.
    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.to_set.get(token).map(String::as_str)
    }

    /// Every alias pointing at `set`, sorted.
    pub fn aliases_for(&self, set: &str) -> Vec<String> {
        self.by_set.get(set).cloned().unwrap_or_default()
    }

    /// Number of alias tokens.
    pub fn len(&self) -> usize {
        self.to_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_set.is_empty()
    }
}

/// Build from `(alias, set)` pairs. When an alias appears twice the later
/// pair wins, so callers feed pairs in directory order.
impl FromIterator<(String, String)> for AliasIndex {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(pairs: I) -> Self {
        let to_set: HashMap<String, String> = pairs.into_iter().collect();

        let mut by_set: HashMap<String, Vec<String>> = HashMap::new();
        for (alias, set) in &to_set {
            by_set.entry(set.clone()).or_default().push(alias.clone());
        }
        for aliases in by_set.values_mut() {
            aliases.sort();
        }

        Self { to_set, by_set }
    }
}

//! Which imported archives each model still requires.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use vdbkit_schema::ImportName;

/// Derived map from model name to the import names it requires.
///
/// Updates are incremental: registering or releasing one model only inspects
/// the names that model gave up, and reports those no other model still
/// requires so the archive can drop their import entries.
#[derive(Debug, Default)]
pub struct ImportTracker {
    required: Mutex<BTreeMap<String, BTreeSet<ImportName>>>,
}

impl ImportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the names `model` requires with `names`.
    ///
    /// Returns the previously required names that are now required by no
    /// model at all. Stale names are computed against the set held before
    /// this call.
    pub fn register(&self, model: &str, names: &BTreeSet<ImportName>) -> BTreeSet<ImportName> {
        let mut required = self.required.lock();
        let previous = if names.is_empty() {
            required.remove(model).unwrap_or_default()
        } else {
            required
                .insert(model.to_owned(), names.clone())
                .unwrap_or_default()
        };
        let stale: BTreeSet<ImportName> = previous.difference(names).cloned().collect();
        unreferenced(&required, stale)
    }

    /// Forget `model` entirely, returning the names no other model requires.
    pub fn release(&self, model: &str) -> BTreeSet<ImportName> {
        let mut required = self.required.lock();
        let previous = required.remove(model).unwrap_or_default();
        unreferenced(&required, previous)
    }

    pub fn required_by(&self, model: &str) -> BTreeSet<ImportName> {
        self.required.lock().get(model).cloned().unwrap_or_default()
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.lock().values().any(|set| set.contains(name))
    }

    /// Every model currently requiring at least one import.
    pub fn models(&self) -> Vec<String> {
        self.required.lock().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.required.lock().clear();
    }
}

fn unreferenced(
    required: &BTreeMap<String, BTreeSet<ImportName>>,
    candidates: BTreeSet<ImportName>,
) -> BTreeSet<ImportName> {
    candidates
        .into_iter()
        .filter(|name| !required.values().any(|set| set.contains(name)))
        .collect()
}

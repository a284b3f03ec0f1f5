//! Set of UI targets currently marked busy.

use std::collections::BTreeSet;

use canvas_types::LoadingTarget;

#[derive(Debug, Default, Clone)]
pub struct LoadingTargets {
    targets: BTreeSet<LoadingTarget>,
}

impl LoadingTargets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the target was already loading.
    pub fn add(&mut self, target: LoadingTarget) -> bool {
        self.targets.insert(target)
    }

    /// Removing an absent target is a no-op and returns `false`.
    pub fn remove(&mut self, target: &LoadingTarget) -> bool {
        self.targets.remove(target)
    }

    #[must_use]
    pub fn contains(&self, target: &LoadingTarget) -> bool {
        self.targets.contains(target)
    }

    pub fn retain(&mut self, keep: impl FnMut(&LoadingTarget) -> bool) {
        self.targets.retain(keep);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadingTarget> {
        self.targets.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }
}

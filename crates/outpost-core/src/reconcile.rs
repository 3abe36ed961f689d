//! Desired-vs-current diff for access controller card lists.

use std::collections::BTreeSet;

/// Cards to program into and remove from a controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FobDiff {
    pub add: Vec<i64>,
    pub remove: Vec<i64>,
}

impl FobDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Computes what must change for `current` to equal `desired`.
///
/// Both outputs are sorted ascending.
pub fn reconcile_fobs(desired: &[i64], current: &[i64]) -> FobDiff {
    let desired: BTreeSet<i64> = desired.iter().copied().collect();
    let current: BTreeSet<i64> = current.iter().copied().collect();

    FobDiff {
        add: desired.difference(&current).copied().collect(),
        remove: current.difference(&desired).copied().collect(),
    }
}

//! Seen-set tracking.
//!
//! A [`Baseline`] is the set of identifiers a top-level cycle inherited from the
//! previous one. It is read-only for the whole cycle: every page, however deep,
//! is diffed against it. The set handed to the *next* cycle is a separate value,
//! built from the first page this cycle fetched (see [`Baseline::next_cycle`]).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Identifiers previously observed for one entity.
///
/// Backed by a `BTreeSet` so the serialized payload is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Deserialize<'de> + Ord"
))]
pub struct Baseline<T: Ord>(BTreeSet<T>);

impl<T: Ord + Clone> Baseline<T> {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, id: &T) -> bool {
        self.0.contains(id)
    }

    /// Identifiers in `snapshot` that this baseline has not seen yet.
    pub fn unseen(&self, snapshot: &Baseline<T>) -> BTreeSet<T> {
        snapshot.0.difference(&self.0).cloned().collect()
    }

    /// Identifiers in this baseline that `snapshot` no longer contains.
    pub fn missing_from(&self, snapshot: &Baseline<T>) -> BTreeSet<T> {
        self.0.difference(&snapshot.0).cloned().collect()
    }

    /// The baseline for the next top-level cycle: the top-of-cycle snapshot,
    /// replacing (never merging into) the inherited set.
    pub fn next_cycle(top_of_cycle: Baseline<T>) -> Baseline<T> {
        top_of_cycle
    }
}

impl<T: Ord> FromIterator<T> for Baseline<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: Ord> IntoIterator for Baseline<T> {
    type Item = T;
    type IntoIter = std::collections::btree_set::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

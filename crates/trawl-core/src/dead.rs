//! Dead-item detection for listing snapshots.

use std::collections::BTreeSet;

use crate::baseline::Baseline;

/// Result of comparing a listing snapshot with the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingDiff<T: Ord> {
    /// Identifiers that dropped off the live listing since the last poll.
    pub dead: BTreeSet<T>,
    /// Baseline for the next poll. Always the snapshot that was diffed.
    pub next_baseline: Baseline<T>,
}

/// Diff `current` against `previous`, consuming `current` so the stored
/// baseline is the exact fetch that produced `dead`.
pub fn diff_listing<T: Ord + Clone>(previous: &Baseline<T>, current: Baseline<T>) -> ListingDiff<T> {
    let dead = previous.missing_from(&current);
    ListingDiff {
        dead,
        next_baseline: Baseline::next_cycle(current),
    }
}

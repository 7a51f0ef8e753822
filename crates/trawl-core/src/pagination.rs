//! Pagination driver: decides, one page at a time, whether a listing walk
//! should go deeper.
//!
//! A page whose every item is new means the previous cycle's items lie further
//! down the listing, so the walk continues with the page's cursor. As soon as a
//! page overlaps the baseline the walk stops.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::baseline::Baseline;

/// What to do when a cycle starts with an empty baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColdStartPolicy {
    /// Persist the first page only; later cycles pick up from there.
    #[default]
    SinglePage,
    /// Keep walking until the listing runs out of cursors.
    Paginate,
}

impl ColdStartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColdStartPolicy::SinglePage => "single-page",
            ColdStartPolicy::Paginate => "paginate",
        }
    }
}

impl fmt::Display for ColdStartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ColdStartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single-page" | "single_page" => Ok(ColdStartPolicy::SinglePage),
            "paginate" => Ok(ColdStartPolicy::Paginate),
            _ => Err(format!("Unknown cold start policy: {}", s)),
        }
    }
}

/// Outcome of diffing one fetched page against the inherited baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct PageStep<T: Ord> {
    /// Page items absent from the baseline.
    pub new_items: BTreeSet<T>,
    /// Every identifier on the page.
    pub snapshot: Baseline<T>,
    /// Cursor for the next page, set only when the walk should continue.
    pub continue_from: Option<String>,
}

impl<T: Ord> PageStep<T> {
    pub fn is_exhausted(&self) -> bool {
        self.continue_from.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PaginationPolicy {
    pub cold_start: ColdStartPolicy,
}

impl PaginationPolicy {
    pub fn new(cold_start: ColdStartPolicy) -> Self {
        Self { cold_start }
    }

    /// Diff a page against `baseline` and decide whether to fetch `next_cursor`.
    pub fn step<T, I>(
        &self,
        baseline: &Baseline<T>,
        page_ids: I,
        next_cursor: Option<&str>,
    ) -> PageStep<T>
    where
        T: Ord + Clone,
        I: IntoIterator<Item = T>,
    {
        let snapshot: Baseline<T> = page_ids.into_iter().collect();
        let new_items = baseline.unseen(&snapshot);

        let whole_page_new = !snapshot.is_empty() && new_items.len() == snapshot.len();
        let may_descend = match self.cold_start {
            ColdStartPolicy::SinglePage => !baseline.is_empty(),
            ColdStartPolicy::Paginate => true,
        };

        let continue_from = if whole_page_new && may_descend {
            next_cursor.filter(|c| !c.is_empty()).map(str::to_owned)
        } else {
            None
        };

        PageStep {
            new_items,
            snapshot,
            continue_from,
        }
    }
}

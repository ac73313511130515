//! Pairwise match counter.
//!
//! A sparse symmetric adjacency count: `count(a, b)` is the number of
//! groups in which views `a` and `b` both participate. The engine keeps it
//! incrementally in lockstep with every group mutation; it is rebuilt
//! wholesale only at initial load. Navigation UIs use it to rank which
//! view pair to review next, so it must be exact, never approximate.

use std::collections::HashMap;

use super::group::Group;
use super::types::ViewId;

/// Symmetric sparse counter of shared groups between view pairs.
///
/// A zero count is represented by key absence, never by a stored zero.
#[derive(Debug, Clone, Default)]
pub struct MatchCounter {
    counts: HashMap<ViewId, HashMap<ViewId, u32>>,
}

impl MatchCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from scratch over the full group set.
    pub fn rebuild<'a>(groups: impl Iterator<Item = &'a Group>) -> Self {
        let mut counter = Self::new();
        for group in groups {
            let members = group.members();
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    counter.link(members[i].0, members[j].0);
                }
            }
        }
        counter
    }

    /// Record one more shared group between `a` and `b`, both directions.
    pub fn link(&mut self, a: ViewId, b: ViewId) {
        debug_assert_ne!(a, b);
        *self.counts.entry(a).or_default().entry(b).or_insert(0) += 1;
        *self.counts.entry(b).or_default().entry(a).or_insert(0) += 1;
    }

    /// Record one fewer shared group between `a` and `b`, both directions.
    ///
    /// Entries that reach zero are removed so absence stays the canonical
    /// zero representation.
    pub fn unlink(&mut self, a: ViewId, b: ViewId) {
        debug_assert_ne!(a, b);
        for (x, y) in [(a, b), (b, a)] {
            if let Some(inner) = self.counts.get_mut(&x) {
                if let Some(n) = inner.get_mut(&y) {
                    *n -= 1;
                    if *n == 0 {
                        inner.remove(&y);
                    }
                }
                if inner.is_empty() {
                    self.counts.remove(&x);
                }
            }
        }
    }

    /// Number of groups shared by `a` and `b`.
    pub fn count(&self, a: ViewId, b: ViewId) -> u32 {
        self.counts
            .get(&a)
            .and_then(|inner| inner.get(&b))
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct views sharing at least one group with `a`.
    pub fn pair_degree(&self, a: ViewId) -> usize {
        self.counts.get(&a).map(|inner| inner.len()).unwrap_or(0)
    }

    /// Views sharing at least one group with `a`, with their counts.
    pub fn partners(&self, a: ViewId) -> impl Iterator<Item = (ViewId, u32)> + '_ {
        self.counts
            .get(&a)
            .into_iter()
            .flat_map(|inner| inner.iter().map(|(v, n)| (*v, *n)))
    }
}

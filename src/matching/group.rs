//! Group - a correspondence track across views.
//!
//! A group is the set of keypoints declared to be the same physical point,
//! at most one per view. Groups are value records replaced wholesale on
//! merge rather than linked through parent pointers: membership is bounded
//! by the view count and merges happen at interactive frequency, so no
//! union-find forest is needed and every lookup stays a direct id index.

use super::types::{GroupId, KeypointId, ViewId};

/// A correspondence group (track).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Unique identifier, never reused after dissolution.
    pub id: GroupId,

    /// Membership pairs in insertion order. Invariant: no two members
    /// share a `ViewId`.
    members: Vec<(ViewId, KeypointId)>,
}

impl Group {
    /// Create a group with an initial membership list.
    pub fn new(id: GroupId, members: Vec<(ViewId, KeypointId)>) -> Self {
        Self { id, members }
    }

    /// Membership pairs in insertion order.
    pub fn members(&self) -> &[(ViewId, KeypointId)] {
        &self.members
    }

    /// Number of member keypoints.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if the group has no members left (logically deleted).
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// True if some member belongs to the given view.
    pub fn contains_view(&self, view: ViewId) -> bool {
        self.members.iter().any(|(v, _)| *v == view)
    }

    /// The keypoint this group contributes to the given view, if any.
    pub fn member_in_view(&self, view: ViewId) -> Option<KeypointId> {
        self.members
            .iter()
            .find(|(v, _)| *v == view)
            .map(|(_, k)| *k)
    }

    /// Append a membership pair.
    ///
    /// The caller must have checked `contains_view` first; this is the
    /// engine's invariant to enforce before any state changes.
    pub fn push(&mut self, view: ViewId, keypoint: KeypointId) {
        debug_assert!(!self.contains_view(view));
        self.members.push((view, keypoint));
    }

    /// Remove a membership pair. Returns true if it was present.
    pub fn remove(&mut self, view: ViewId, keypoint: KeypointId) -> bool {
        match self.members.iter().position(|m| *m == (view, keypoint)) {
            Some(idx) => {
                self.members.remove(idx);
                true
            }
            None => false,
        }
    }
}

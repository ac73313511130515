//! Structured change descriptions returned by mutating operations.
//!
//! Instead of a push callback slot wired by whichever UI touched the
//! engine last, every mutation returns exactly one `Change` describing
//! what happened; the caller decides what to redraw. `Change::NoOp` is the
//! only variant that does not imply unsaved changes.

use super::types::{GroupId, KeypointId, ViewId};

/// What a single mutating call did to the structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Nothing changed (e.g. re-linking an already linked pair, or
    /// removing a match from an unmatched keypoint).
    NoOp,

    /// A fresh two-member group was created.
    GroupCreated { group: GroupId },

    /// An existing group gained one member.
    GroupExtended { group: GroupId, view: ViewId },

    /// Two groups were merged into a new one; both old ids are retired.
    GroupsMerged {
        group: GroupId,
        dissolved: [GroupId; 2],
    },

    /// A membership was removed. `dissolved` is set if the group emptied
    /// out and its id was retired.
    MatchRemoved {
        group: GroupId,
        view: ViewId,
        keypoint: KeypointId,
        dissolved: bool,
    },

    /// A keypoint was deleted (after being detached from its group, if
    /// any).
    KeypointRemoved { view: ViewId, keypoint: KeypointId },

    /// A keypoint was repositioned.
    KeypointMoved { view: ViewId, keypoint: KeypointId },
}

impl Change {
    /// Whether this change left unsaved state behind.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Change::NoOp)
    }
}

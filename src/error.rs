//! Error types for the correspondence core.
//!
//! All mutating operations are all-or-nothing: any error below is raised
//! before any keypoint field, group membership or counter entry changes.

use thiserror::Error;

use crate::matching::types::{GroupId, KeypointId, ViewId};

/// Errors surfaced by the correspondence engine and the record stores.
#[derive(Error, Debug)]
pub enum Error {
    /// Reference to a view that does not exist.
    #[error("unknown view {0}")]
    InvalidViewId(ViewId),

    /// Reference to a keypoint that does not exist in the named view.
    #[error("unknown keypoint {1} in view {0}")]
    InvalidKeypointId(ViewId, KeypointId),

    /// Attempt to pair a view with itself.
    #[error("degenerate view pair: {0} on both sides")]
    DegenerateViewPair(ViewId),

    /// The operation would put two keypoints of the same view into one
    /// group. Recoverable: the caller should tell the user which view
    /// collides and leave the structure as it was.
    #[error("view conflict: {view} already contributes to group {group}")]
    ViewConflict { group: GroupId, view: ViewId },

    /// No active view pair has been selected yet.
    #[error("no active view pair")]
    NoActivePair,

    /// A keypoint names a group that does not exist. Raised when an edit
    /// runs into a corrupt store; the consistency checker reports the
    /// same condition as a violation.
    #[error("keypoint {keypoint} in view {view} references missing group {group}")]
    DanglingGroupReference {
        view: ViewId,
        keypoint: KeypointId,
        group: GroupId,
    },

    /// Record store I/O failure.
    #[error("annotation I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed record or export document.
    #[error("annotation format error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

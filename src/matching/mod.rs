//! Matching module - core correspondence data structures.
//!
//! This module contains:
//! - [`View`] / [`Keypoint`] - per-image annotation records
//! - [`Group`] - correspondence tracks (at most one keypoint per view)
//! - [`MatchCounter`] - the incremental pairwise match counter
//! - [`Matching`] - the correspondence engine tying them together
//!
//! # Architecture
//!
//! The structure is a bipartite association:
//! - keypoints name their track (keypoint → group via `group_id`)
//! - groups list their members (group → keypoints via membership pairs)
//!
//! The engine is the sole writer on both sides, keeps the pairwise
//! counter in lockstep, and derives the Active Match View for the view
//! pair currently open for editing.

pub mod change;
pub mod counter;
pub mod engine;
pub mod group;
pub mod types;
pub mod view;

pub use change::Change;
pub use counter::MatchCounter;
pub use engine::{MatchSlots, Matching};
pub use group::Group;
pub use types::{GroupId, KeypointId, ViewId};
pub use view::{Keypoint, View};

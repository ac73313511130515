//! Core library for interactive multi-view keypoint correspondence
//! annotation.
//!
//! A user marks keypoints independently in each image ("view") and
//! declares cross-view correspondences; correspondences spanning several
//! views form tracks ("groups"). This crate maintains that structure
//! under incremental edits, persists only modified records, exports the
//! accumulated tracks as pairwise match lists, and audits the structure's
//! invariants. Rendering, event handling and image decoding live in the
//! UI layer on top.

pub mod audit;
pub mod error;
pub mod export;
pub mod matching;
pub mod store;

// Re-export the main entry points.
pub use crate::error::{Error, Result};
pub use crate::matching::{
    Change, Group, GroupId, Keypoint, KeypointId, MatchCounter, Matching, View, ViewId,
};

impl Matching {
    /// Flatten the full structure into the pairwise export document.
    pub fn export_document(&mut self) -> Result<export::ExportDocument> {
        export::document(self)
    }

    /// Export the pairwise match document to a JSON file.
    pub fn export_to<P: AsRef<std::path::Path>>(&mut self, path: P) -> Result<()> {
        export::write_to(self, path)
    }

    /// Audit the full structure against its invariants.
    pub fn audit(&mut self) -> Result<audit::AuditReport> {
        audit::audit(self)
    }

    /// Clear dangling group references; returns how many were cleared.
    pub fn repair(&mut self) -> Result<usize> {
        audit::repair(self)
    }
}

//! View - one image's keypoint annotation record.
//!
//! A view owns an ordered sequence of keypoints. Keypoint ids are handed
//! out monotonically per view and never recycled, so removal leaves a gap
//! in the id sequence but positional indices stay dense (the export format
//! addresses keypoints by index, the live structure by id).

use nalgebra::Point2;

use super::types::{GroupId, KeypointId, ViewId};

/// A single annotated point in a view.
#[derive(Debug, Clone, PartialEq)]
pub struct Keypoint {
    /// Identifier, unique within the owning view.
    pub id: KeypointId,

    /// 2D position in image coordinates.
    pub pos: Point2<f64>,

    /// Owning group, or `None` while unmatched. Written only by the
    /// correspondence engine (via [`View::set_keypoint_group`]).
    pub group_id: Option<GroupId>,
}

/// One image's keypoint annotation record.
#[derive(Debug, Clone)]
pub struct View {
    /// Unique identifier, externally assigned.
    pub id: ViewId,

    /// Image path as opaque segments; never interpreted by the core.
    pub filename: Vec<String>,

    /// Ordered keypoint sequence.
    keypoints: Vec<Keypoint>,

    /// Next keypoint id to hand out.
    next_keypoint_id: u64,

    /// Maintained count of keypoints with `group_id == None`.
    unmatched: usize,
}

impl View {
    /// Create an empty view.
    pub fn new(id: ViewId, filename: Vec<String>) -> Self {
        Self {
            id,
            filename,
            keypoints: Vec::new(),
            next_keypoint_id: 0,
            unmatched: 0,
        }
    }

    /// Rebuild a view from persisted parts.
    ///
    /// The id counter resumes past the largest persisted keypoint id, so
    /// ids removed in an earlier session are still never reused.
    pub fn from_parts(id: ViewId, filename: Vec<String>, keypoints: Vec<Keypoint>) -> Self {
        let next_keypoint_id = keypoints.iter().map(|k| k.id.0 + 1).max().unwrap_or(0);
        let unmatched = keypoints.iter().filter(|k| k.group_id.is_none()).count();
        Self {
            id,
            filename,
            keypoints,
            next_keypoint_id,
            unmatched,
        }
    }

    /// Ordered keypoint sequence.
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// Number of keypoints in this view.
    pub fn num_keypoints(&self) -> usize {
        self.keypoints.len()
    }

    /// Number of keypoints not yet part of any group.
    pub fn unmatched_count(&self) -> usize {
        self.unmatched
    }

    /// Look up a keypoint by id.
    pub fn keypoint(&self, id: KeypointId) -> Option<&Keypoint> {
        self.keypoints.iter().find(|k| k.id == id)
    }

    /// Positional index of a keypoint in the sequence.
    pub fn index_of(&self, id: KeypointId) -> Option<usize> {
        self.keypoints.iter().position(|k| k.id == id)
    }

    /// Append a new unmatched keypoint and return its id.
    pub fn append_keypoint(&mut self, pos: Point2<f64>) -> KeypointId {
        let id = KeypointId(self.next_keypoint_id);
        self.next_keypoint_id += 1;
        self.keypoints.push(Keypoint {
            id,
            pos,
            group_id: None,
        });
        self.unmatched += 1;
        id
    }

    /// Remove a keypoint from the sequence.
    ///
    /// The caller is responsible for detaching the keypoint from its group
    /// first; this only maintains the sequence and the unmatched count.
    pub fn remove_keypoint(&mut self, id: KeypointId) -> Option<Keypoint> {
        let idx = self.index_of(id)?;
        let kp = self.keypoints.remove(idx);
        if kp.group_id.is_none() {
            self.unmatched -= 1;
        }
        Some(kp)
    }

    /// Set or clear a keypoint's group, keeping the unmatched count exact.
    ///
    /// Returns false if the keypoint does not exist.
    pub fn set_keypoint_group(&mut self, id: KeypointId, group: Option<GroupId>) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let kp = &mut self.keypoints[idx];
        match (kp.group_id, group) {
            (None, Some(_)) => self.unmatched -= 1,
            (Some(_), None) => self.unmatched += 1,
            _ => {}
        }
        self.keypoints[idx].group_id = group;
        true
    }

    /// Reposition a keypoint. Returns false if it does not exist.
    pub fn set_keypoint_pos(&mut self, id: KeypointId, pos: Point2<f64>) -> bool {
        match self.index_of(id) {
            Some(idx) => {
                self.keypoints[idx].pos = pos;
                true
            }
            None => false,
        }
    }

    /// Nearest keypoint to a query position, for hit-testing.
    ///
    /// Returns `(distance, keypoint_id)`, or `None` for an empty view.
    pub fn nearest_keypoint(&self, pos: Point2<f64>) -> Option<(f64, KeypointId)> {
        self.keypoints
            .iter()
            .map(|k| (nalgebra::distance(&k.pos, &pos), k.id))
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }
}

//! On-disk record formats.
//!
//! One JSON record per view (`views/view_{id}.json`) and per group
//! (`groups/group_{id}.json`). The field names and shapes are a
//! compatibility boundary with existing annotation directories. Fields the
//! core does not own are captured in flattened maps and written back
//! verbatim on flush.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::matching::group::Group;
use crate::matching::types::{GroupId, KeypointId, ViewId};
use crate::matching::view::{Keypoint, View};

/// One keypoint entry inside a view record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeypointRecord {
    pub id: KeypointId,
    pub pos: [f64; 2],
    pub group_id: Option<GroupId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Persisted form of a [`View`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewRecord {
    pub id: ViewId,
    pub filename: Vec<String>,
    pub keypoints: Vec<KeypointRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Persisted form of a [`Group`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    /// Membership pairs `[view_id, keypoint_id]`; the on-disk name
    /// predates the group/track terminology.
    pub keypoints: Vec<(ViewId, KeypointId)>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Unowned fields of a view record, keyed back in at write time.
#[derive(Debug, Clone, Default)]
pub struct ViewExtras {
    /// Unowned fields at the record level.
    pub record: Map<String, Value>,
    /// Unowned fields per keypoint. Keypoints appended in-session have no
    /// entry and serialize without extras.
    pub keypoints: HashMap<KeypointId, Map<String, Value>>,
}

impl ViewRecord {
    /// Split a record into the domain view and its unowned fields.
    pub fn into_domain(self) -> (View, ViewExtras) {
        let mut extras = ViewExtras {
            record: self.extra,
            keypoints: HashMap::new(),
        };
        let keypoints = self
            .keypoints
            .into_iter()
            .map(|k| {
                if !k.extra.is_empty() {
                    extras.keypoints.insert(k.id, k.extra);
                }
                Keypoint {
                    id: k.id,
                    pos: Point2::new(k.pos[0], k.pos[1]),
                    group_id: k.group_id,
                }
            })
            .collect();
        (View::from_parts(self.id, self.filename, keypoints), extras)
    }

    /// Reassemble a record from the domain view and its unowned fields.
    pub fn from_domain(view: &View, extras: &ViewExtras) -> Self {
        Self {
            id: view.id,
            filename: view.filename.clone(),
            keypoints: view
                .keypoints()
                .iter()
                .map(|k| KeypointRecord {
                    id: k.id,
                    pos: [k.pos.x, k.pos.y],
                    group_id: k.group_id,
                    extra: extras.keypoints.get(&k.id).cloned().unwrap_or_default(),
                })
                .collect(),
            extra: extras.record.clone(),
        }
    }
}

impl GroupRecord {
    /// Split a record into the domain group and its unowned fields.
    pub fn into_domain(self) -> (Group, Map<String, Value>) {
        (Group::new(self.id, self.keypoints), self.extra)
    }

    /// Reassemble a record from the domain group and its unowned fields.
    pub fn from_domain(group: &Group, extra: &Map<String, Value>) -> Self {
        Self {
            id: group.id,
            keypoints: group.members().to_vec(),
            extra: extra.clone(),
        }
    }
}

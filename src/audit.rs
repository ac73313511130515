//! Consistency checker.
//!
//! On-demand audit of the persisted structure's invariants, with an
//! optional repair pass for the one violation that is mechanically safe
//! to fix (a keypoint referencing a group that no longer exists).

use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;

use crate::error::Result;
use crate::matching::engine::Matching;
use crate::matching::types::{GroupId, KeypointId, ViewId};

/// A single invariant violation, with enough identifiers to locate it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    /// A group lists a membership whose keypoint names a different group
    /// (or none at all).
    #[error("group {group} lists keypoint {keypoint} of view {view}, but that keypoint links to {actual:?}")]
    MemberNotLinked {
        group: GroupId,
        view: ViewId,
        keypoint: KeypointId,
        actual: Option<GroupId>,
    },

    /// A group lists a view or keypoint that does not exist.
    #[error("group {group} lists non-existent keypoint {keypoint} of view {view}")]
    UnknownMember {
        group: GroupId,
        view: ViewId,
        keypoint: KeypointId,
    },

    /// A group has two memberships in the same view.
    #[error("group {group} has more than one member in view {view}")]
    DuplicateView { group: GroupId, view: ViewId },

    /// A group record with no members.
    #[error("group {group} is empty")]
    EmptyGroup { group: GroupId },

    /// A keypoint references a group that does not exist. The only
    /// violation `repair` fixes (by clearing the reference).
    #[error("keypoint {keypoint} of view {view} references missing group {group}")]
    DanglingGroupReference {
        view: ViewId,
        keypoint: KeypointId,
        group: GroupId,
    },
}

/// Result of a full audit.
#[derive(Debug, Default)]
pub struct AuditReport {
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Audit the full structure. Read-only: nothing is modified.
pub fn audit(matching: &mut Matching) -> Result<AuditReport> {
    matching.load_all()?;
    let mut report = AuditReport::default();

    // Group-side checks: membership backlinks, per-view uniqueness,
    // emptiness.
    let groups: Vec<(GroupId, Vec<(ViewId, KeypointId)>)> = {
        let mut out = Vec::new();
        for gid in matching.group_ids() {
            let members = matching
                .group(gid)?
                .map(|g| g.members().to_vec())
                .unwrap_or_default();
            out.push((gid, members));
        }
        out
    };
    for (gid, members) in &groups {
        if members.is_empty() {
            report.violations.push(Violation::EmptyGroup { group: *gid });
        }
        let mut seen: HashSet<ViewId> = HashSet::new();
        let mut flagged: HashSet<ViewId> = HashSet::new();
        for (vid, _) in members {
            if !seen.insert(*vid) && flagged.insert(*vid) {
                report.violations.push(Violation::DuplicateView {
                    group: *gid,
                    view: *vid,
                });
            }
        }
        for (vid, kid) in members {
            let keypoint = match matching.view(*vid) {
                Ok(view) => view.keypoint(*kid).cloned(),
                Err(_) => None,
            };
            match keypoint {
                None => report.violations.push(Violation::UnknownMember {
                    group: *gid,
                    view: *vid,
                    keypoint: *kid,
                }),
                Some(kp) if kp.group_id != Some(*gid) => {
                    report.violations.push(Violation::MemberNotLinked {
                        group: *gid,
                        view: *vid,
                        keypoint: *kid,
                        actual: kp.group_id,
                    })
                }
                Some(_) => {}
            }
        }
    }

    // View-side check: every group reference must name a live group.
    let live: HashSet<GroupId> = matching.group_ids().into_iter().collect();
    for vid in matching.view_ids() {
        for kp in matching.view(vid)?.keypoints() {
            if let Some(gid) = kp.group_id {
                if !live.contains(&gid) {
                    report.violations.push(Violation::DanglingGroupReference {
                        view: vid,
                        keypoint: kp.id,
                        group: gid,
                    });
                }
            }
        }
    }

    for violation in &report.violations {
        warn!(%violation, "consistency violation");
    }
    Ok(report)
}

/// Clear every dangling group reference found by [`audit`], marking the
/// touched views dirty. No other violation class is repaired. Returns the
/// number of cleared references.
pub fn repair(matching: &mut Matching) -> Result<usize> {
    let dangling: Vec<(ViewId, KeypointId)> = audit(matching)?
        .violations
        .into_iter()
        .filter_map(|v| match v {
            Violation::DanglingGroupReference { view, keypoint, .. } => Some((view, keypoint)),
            _ => None,
        })
        .collect();

    for (view, keypoint) in &dangling {
        matching
            .views_mut()
            .get_mut(*view)?
            .set_keypoint_group(*keypoint, None);
        warn!(%view, %keypoint, "cleared dangling group reference");
    }
    Ok(dangling.len())
}

//! Correspondence engine.
//!
//! `Matching` is the sole writer of keypoint `group_id` fields and group
//! membership lists. It owns:
//! - the view and group stores (lazy caches with dirty tracking),
//! - the pairwise match counter, kept in lockstep with every mutation,
//! - the active view pair and its derived match view.
//!
//! Every mutating operation is all-or-nothing: validation happens before
//! any state is written, so a failed call leaves keypoints, memberships
//! and counters exactly as they were. Each call returns one [`Change`]
//! describing what it did.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use nalgebra::Point2;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::{GroupStore, ViewStore};

use super::change::Change;
use super::counter::MatchCounter;
use super::group::Group;
use super::types::{GroupId, KeypointId, ViewId};
use super::view::{Keypoint, View};

/// One Active Match View entry: the keypoint each of the two active views
/// contributes to a group. Slot 0 is the i-view, slot 1 the j-view.
pub type MatchSlots = [Option<KeypointId>; 2];

/// The correspondence engine over one annotation directory.
pub struct Matching {
    views: ViewStore,
    groups: GroupStore,
    counter: MatchCounter,
    active: Option<(ViewId, ViewId)>,
    /// Derived match view for the active pair, rebuilt by
    /// `set_active_pair` and patched by every edit while the pair stays
    /// active. BTreeMap keeps iteration deterministic.
    matches: BTreeMap<GroupId, MatchSlots>,
}

impl Matching {
    /// Open an annotation directory (`<dir>/views`, `<dir>/groups`).
    ///
    /// All group records are loaded up front to rebuild the pairwise
    /// counter; view records load on first access. No active pair is
    /// selected.
    pub fn open<P: AsRef<Path>>(annot_dir: P) -> Result<Self> {
        let dir = annot_dir.as_ref();
        let views = ViewStore::open(dir.join("views"))?;
        let mut groups = GroupStore::open(dir.join("groups"))?;
        groups.load_all()?;
        let counter = MatchCounter::rebuild(groups.iter_loaded());
        info!(
            views = views.len(),
            groups = groups.len(),
            dir = %dir.display(),
            "opened annotation directory"
        );
        Ok(Self {
            views,
            groups,
            counter,
            active: None,
            matches: BTreeMap::new(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Active view pair
    // ─────────────────────────────────────────────────────────────────────

    /// Select the view pair open for side-by-side editing and rebuild the
    /// derived match view by joining both views' keypoints through their
    /// `group_id`.
    ///
    /// Any external cache of indices into the previous match view is
    /// invalidated by this call.
    pub fn set_active_pair(&mut self, view_i: ViewId, view_j: ViewId) -> Result<()> {
        if view_i == view_j {
            return Err(Error::DegenerateViewPair(view_i));
        }
        // Load (and thereby validate) both views before touching state.
        self.views.get(view_i)?;
        self.views.get(view_j)?;

        let mut matches: BTreeMap<GroupId, MatchSlots> = BTreeMap::new();
        for kp in self.views.get(view_i)?.keypoints() {
            if let Some(gid) = kp.group_id {
                matches.insert(gid, [Some(kp.id), None]);
            }
        }
        for kp in self.views.get(view_j)?.keypoints() {
            if let Some(gid) = kp.group_id {
                matches.entry(gid).or_insert([None, None])[1] = Some(kp.id);
            }
        }

        self.active = Some((view_i, view_j));
        self.matches = matches;
        debug!(%view_i, %view_j, entries = self.matches.len(), "active pair set");
        Ok(())
    }

    /// The active view pair, if one has been selected.
    pub fn active_pair(&self) -> Option<(ViewId, ViewId)> {
        self.active
    }

    /// The derived match view for the active pair. Entries with both
    /// slots set are direct i-j correspondences; single-slot entries are
    /// tracks with no representative in the other view.
    pub fn matches(&self) -> &BTreeMap<GroupId, MatchSlots> {
        &self.matches
    }

    fn active(&self) -> Result<(ViewId, ViewId)> {
        self.active.ok_or(Error::NoActivePair)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Match mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Declare that keypoint `kid_i` of the active i-view and `kid_j` of
    /// the active j-view are the same physical point.
    ///
    /// Branches on the current group membership of the two keypoints:
    /// neither matched creates a group, one matched extends that group,
    /// both matched merges their groups (a no-op if they are already the
    /// same group). Any branch that would give a group two members in one
    /// view fails with [`Error::ViewConflict`] and changes nothing.
    pub fn add_match(&mut self, kid_i: KeypointId, kid_j: KeypointId) -> Result<Change> {
        let (vid_i, vid_j) = self.active()?;
        let gid_i = self.keypoint_group(vid_i, kid_i)?;
        let gid_j = self.keypoint_group(vid_j, kid_j)?;

        match (gid_i, gid_j) {
            (None, None) => self.create_group(vid_i, kid_i, vid_j, kid_j),
            (Some(gid), None) => self.extend_group(gid, vid_j, kid_j, 1),
            (None, Some(gid)) => self.extend_group(gid, vid_i, kid_i, 0),
            (Some(gi), Some(gj)) if gi == gj => Ok(Change::NoOp),
            (Some(gi), Some(gj)) => self.merge_groups(gi, gj, kid_i, kid_j),
        }
    }

    /// Detach a keypoint from its group, in any view.
    ///
    /// A no-op success if the keypoint is unmatched. A group reduced to a
    /// single member is left in that state; a group emptied out is
    /// dissolved and its id retired.
    pub fn remove_match(&mut self, view: ViewId, keypoint: KeypointId) -> Result<Change> {
        let Some(gid) = self.keypoint_group(view, keypoint)? else {
            return Ok(Change::NoOp);
        };
        let group = self
            .groups
            .get_mut(gid)?
            .ok_or(Error::DanglingGroupReference {
                view,
                keypoint,
                group: gid,
            })?;
        group.remove(view, keypoint);
        // Decrement against the already-reduced membership so self-pairs
        // are never counted.
        let remaining: Vec<ViewId> = group.members().iter().map(|(v, _)| *v).collect();
        let dissolved = group.is_empty();
        for other in &remaining {
            self.counter.unlink(*other, view);
        }
        self.views.get_mut(view)?.set_keypoint_group(keypoint, None);

        if let Some((vi, vj)) = self.active {
            if let Some(slots) = self.matches.get_mut(&gid) {
                if view == vi {
                    slots[0] = None;
                } else if view == vj {
                    slots[1] = None;
                }
                if *slots == [None, None] {
                    self.matches.remove(&gid);
                }
            }
        }
        if dissolved {
            self.groups.remove(gid);
            self.matches.remove(&gid);
        }

        debug!(%view, %keypoint, group = %gid, dissolved, "match removed");
        Ok(Change::MatchRemoved {
            group: gid,
            view,
            keypoint,
            dissolved,
        })
    }

    fn create_group(
        &mut self,
        vid_i: ViewId,
        kid_i: KeypointId,
        vid_j: ViewId,
        kid_j: KeypointId,
    ) -> Result<Change> {
        let gid = self.groups.next_id();
        self.groups.insert(Group::new(
            gid,
            vec![(vid_i, kid_i), (vid_j, kid_j)],
        ));
        self.views.get_mut(vid_i)?.set_keypoint_group(kid_i, Some(gid));
        self.views.get_mut(vid_j)?.set_keypoint_group(kid_j, Some(gid));
        self.counter.link(vid_i, vid_j);
        self.matches.insert(gid, [Some(kid_i), Some(kid_j)]);
        debug!(group = %gid, %vid_i, %kid_i, %vid_j, %kid_j, "group created");
        Ok(Change::GroupCreated { group: gid })
    }

    fn extend_group(
        &mut self,
        gid: GroupId,
        vid_new: ViewId,
        kid_new: KeypointId,
        slot: usize,
    ) -> Result<Change> {
        let group = self.groups.get(gid)?.ok_or(Error::DanglingGroupReference {
            view: vid_new,
            keypoint: kid_new,
            group: gid,
        })?;
        if group.contains_view(vid_new) {
            return Err(Error::ViewConflict {
                group: gid,
                view: vid_new,
            });
        }
        let existing: Vec<ViewId> = group.members().iter().map(|(v, _)| *v).collect();

        self.groups
            .get_mut(gid)?
            .ok_or(Error::DanglingGroupReference {
                view: vid_new,
                keypoint: kid_new,
                group: gid,
            })?
            .push(vid_new, kid_new);
        self.views
            .get_mut(vid_new)?
            .set_keypoint_group(kid_new, Some(gid));
        for other in existing {
            self.counter.link(other, vid_new);
        }
        if let Some(slots) = self.matches.get_mut(&gid) {
            slots[slot] = Some(kid_new);
        }
        debug!(group = %gid, view = %vid_new, keypoint = %kid_new, "group extended");
        Ok(Change::GroupExtended {
            group: gid,
            view: vid_new,
        })
    }

    fn merge_groups(
        &mut self,
        gi: GroupId,
        gj: GroupId,
        kid_i: KeypointId,
        kid_j: KeypointId,
    ) -> Result<Change> {
        let (vid_i, vid_j) = self.active()?;
        let members_i = self.group_members_snapshot(gi, vid_i, kid_i)?;
        let members_j = self.group_members_snapshot(gj, vid_j, kid_j)?;

        // Transactional check: the union must still hold at most one
        // member per view, otherwise nothing changes.
        let mut seen: HashSet<ViewId> = HashSet::new();
        for (view, _) in members_i.iter().chain(members_j.iter()) {
            if !seen.insert(*view) {
                return Err(Error::ViewConflict {
                    group: gj,
                    view: *view,
                });
            }
        }
        // Validate every member keypoint up front so reassignment below
        // cannot fail halfway through.
        for (view, keypoint) in members_i.iter().chain(members_j.iter()) {
            if self.views.get(*view)?.keypoint(*keypoint).is_none() {
                return Err(Error::InvalidKeypointId(*view, *keypoint));
            }
        }

        let merged: Vec<(ViewId, KeypointId)> =
            members_i.iter().chain(members_j.iter()).copied().collect();
        let gid = self.groups.next_id();
        self.groups.remove(gi);
        self.groups.remove(gj);
        self.groups.insert(Group::new(gid, merged.clone()));
        for (view, keypoint) in &merged {
            self.views
                .get_mut(*view)?
                .set_keypoint_group(*keypoint, Some(gid));
        }

        self.matches.remove(&gi);
        self.matches.remove(&gj);
        self.matches.insert(gid, [Some(kid_i), Some(kid_j)]);

        for (va, _) in &members_i {
            for (vb, _) in &members_j {
                self.counter.link(*va, *vb);
            }
        }

        debug!(group = %gid, from_i = %gi, from_j = %gj, members = merged.len(), "groups merged");
        Ok(Change::GroupsMerged {
            group: gid,
            dissolved: [gi, gj],
        })
    }

    fn group_members_snapshot(
        &mut self,
        gid: GroupId,
        view: ViewId,
        keypoint: KeypointId,
    ) -> Result<Vec<(ViewId, KeypointId)>> {
        self.groups
            .get(gid)?
            .map(|g| g.members().to_vec())
            .ok_or(Error::DanglingGroupReference {
                view,
                keypoint,
                group: gid,
            })
    }

    fn keypoint_group(&mut self, view: ViewId, keypoint: KeypointId) -> Result<Option<GroupId>> {
        self.views
            .get(view)?
            .keypoint(keypoint)
            .map(|kp| kp.group_id)
            .ok_or(Error::InvalidKeypointId(view, keypoint))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Keypoint mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Append an unmatched keypoint to a view and return its id.
    pub fn add_keypoint(&mut self, view: ViewId, x: f64, y: f64) -> Result<KeypointId> {
        let kid = self.views.get_mut(view)?.append_keypoint(Point2::new(x, y));
        debug!(%view, keypoint = %kid, x, y, "keypoint added");
        Ok(kid)
    }

    /// Delete a keypoint, detaching it from its group first if matched.
    pub fn remove_keypoint(&mut self, view: ViewId, keypoint: KeypointId) -> Result<Change> {
        // Validate before remove_match so an unknown keypoint aborts with
        // no state change.
        if self.views.get(view)?.keypoint(keypoint).is_none() {
            return Err(Error::InvalidKeypointId(view, keypoint));
        }
        self.remove_match(view, keypoint)?;
        self.views.get_mut(view)?.remove_keypoint(keypoint);
        debug!(%view, %keypoint, "keypoint removed");
        Ok(Change::KeypointRemoved { view, keypoint })
    }

    /// Reposition a keypoint.
    pub fn move_keypoint(
        &mut self,
        view: ViewId,
        keypoint: KeypointId,
        x: f64,
        y: f64,
    ) -> Result<Change> {
        if self.views.get(view)?.keypoint(keypoint).is_none() {
            return Err(Error::InvalidKeypointId(view, keypoint));
        }
        self.views
            .get_mut(view)?
            .set_keypoint_pos(keypoint, Point2::new(x, y));
        Ok(Change::KeypointMoved { view, keypoint })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// All view ids in ascending (navigation) order.
    pub fn view_ids(&self) -> Vec<ViewId> {
        self.views.ids().collect()
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Borrow a view, loading it if needed.
    pub fn view(&mut self, view: ViewId) -> Result<&View> {
        self.views.get(view)
    }

    /// A view's image path segments.
    pub fn filename(&mut self, view: ViewId) -> Result<&[String]> {
        Ok(self.views.get(view)?.filename.as_slice())
    }

    /// A view's keypoint sequence.
    pub fn keypoints(&mut self, view: ViewId) -> Result<&[Keypoint]> {
        Ok(self.views.get(view)?.keypoints())
    }

    pub fn keypoint_count(&mut self, view: ViewId) -> Result<usize> {
        Ok(self.views.get(view)?.num_keypoints())
    }

    /// Number of keypoints in a view not yet part of any group.
    pub fn unmatched_count(&mut self, view: ViewId) -> Result<usize> {
        Ok(self.views.get(view)?.unmatched_count())
    }

    /// The next view in id order, clamped at the end.
    pub fn next_view(&self, view: ViewId) -> Result<ViewId> {
        let ids = self.view_ids();
        let idx = ids
            .iter()
            .position(|v| *v == view)
            .ok_or(Error::InvalidViewId(view))?;
        Ok(ids[(idx + 1).min(ids.len() - 1)])
    }

    /// The previous view in id order, clamped at the start.
    pub fn prev_view(&self, view: ViewId) -> Result<ViewId> {
        let ids = self.view_ids();
        let idx = ids
            .iter()
            .position(|v| *v == view)
            .ok_or(Error::InvalidViewId(view))?;
        Ok(ids[idx.saturating_sub(1)])
    }

    /// Nearest keypoint to a position in a view, for hit-testing.
    pub fn nearest_keypoint(
        &mut self,
        view: ViewId,
        x: f64,
        y: f64,
    ) -> Result<Option<(f64, KeypointId)>> {
        Ok(self.views.get(view)?.nearest_keypoint(Point2::new(x, y)))
    }

    /// Number of groups shared by two views (symmetric, exact).
    pub fn match_count(&self, a: ViewId, b: ViewId) -> u32 {
        self.counter.count(a, b)
    }

    /// Number of distinct views sharing at least one group with `a`.
    pub fn pair_degree(&self, a: ViewId) -> usize {
        self.counter.pair_degree(a)
    }

    /// Views sharing at least one group with `a`, most shared first.
    /// Ties break on ascending view id so the order is deterministic.
    pub fn pair_partners(&self, a: ViewId) -> Vec<(ViewId, u32)> {
        let mut partners: Vec<(ViewId, u32)> = self.counter.partners(a).collect();
        partners.sort_by(|x, y| y.1.cmp(&x.1).then(x.0.cmp(&y.0)));
        partners
    }

    /// All live group ids in ascending order.
    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groups.ids().collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Borrow a group, loading it if needed. `Ok(None)` if the id does
    /// not name a live group.
    pub fn group(&mut self, group: GroupId) -> Result<Option<&Group>> {
        self.groups.get(group)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────

    /// Whether any record changed since the last flush.
    pub fn is_dirty(&self) -> bool {
        self.views.is_dirty() || self.groups.is_dirty()
    }

    /// Write every modified record back to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.views.flush()?;
        self.groups.flush()?;
        info!("flushed annotation records");
        Ok(())
    }

    /// Force every record into memory (export and audit need the full
    /// structure).
    pub(crate) fn load_all(&mut self) -> Result<()> {
        self.views.load_all()?;
        self.groups.load_all()
    }

    pub(crate) fn views_mut(&mut self) -> &mut ViewStore {
        &mut self.views
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    /// Seed an annotation dir: each `(id, n)` becomes a view with `n`
    /// unmatched keypoints at (k, k).
    fn seed(dir: &Path, views: &[(u64, usize)]) {
        let views_dir = dir.join("views");
        std::fs::create_dir_all(&views_dir).unwrap();
        for (id, n) in views {
            let keypoints: Vec<serde_json::Value> = (0..*n)
                .map(|k| {
                    serde_json::json!({"id": k, "pos": [k as f64, k as f64], "group_id": null})
                })
                .collect();
            let record = serde_json::json!({
                "id": id,
                "filename": ["img", format!("{id:04}.png")],
                "keypoints": keypoints,
            });
            std::fs::write(
                views_dir.join(format!("view_{id}.json")),
                serde_json::to_string(&record).unwrap(),
            )
            .unwrap();
        }
    }

    fn fixture(views: &[(u64, usize)]) -> (tempfile::TempDir, Matching) {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), views);
        let matching = Matching::open(tmp.path()).unwrap();
        (tmp, matching)
    }

    fn members(m: &mut Matching, gid: u64) -> Vec<(u64, u64)> {
        m.group(GroupId(gid))
            .unwrap()
            .unwrap()
            .members()
            .iter()
            .map(|(v, k)| (v.0, k.0))
            .collect()
    }

    #[test]
    fn test_set_active_pair_validation() {
        let (_tmp, mut m) = fixture(&[(1, 2), (2, 2)]);

        assert!(matches!(
            m.set_active_pair(ViewId(1), ViewId(1)),
            Err(Error::DegenerateViewPair(ViewId(1)))
        ));
        assert!(matches!(
            m.set_active_pair(ViewId(1), ViewId(9)),
            Err(Error::InvalidViewId(ViewId(9)))
        ));
        assert!(m.active_pair().is_none());

        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        assert_eq!(m.active_pair(), Some((ViewId(1), ViewId(2))));
        assert!(m.matches().is_empty());
    }

    #[test]
    fn test_add_match_requires_active_pair() {
        let (_tmp, mut m) = fixture(&[(1, 1), (2, 1)]);
        assert!(matches!(
            m.add_match(KeypointId(0), KeypointId(0)),
            Err(Error::NoActivePair)
        ));
    }

    // Scenario A: first match creates group 0 and counts one shared pair.
    #[test]
    fn test_first_match_creates_group() {
        let (_tmp, mut m) = fixture(&[(1, 2), (2, 2)]);
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();

        let change = m.add_match(KeypointId(0), KeypointId(0)).unwrap();
        assert_eq!(change, Change::GroupCreated { group: GroupId(0) });
        assert!(change.is_mutation());
        assert_eq!(members(&mut m, 0), vec![(1, 0), (2, 0)]);
        assert_eq!(m.match_count(ViewId(1), ViewId(2)), 1);
        assert_eq!(m.match_count(ViewId(2), ViewId(1)), 1);
        assert_eq!(
            m.matches().get(&GroupId(0)),
            Some(&[Some(KeypointId(0)), Some(KeypointId(0))])
        );
        assert_eq!(m.unmatched_count(ViewId(1)).unwrap(), 1);
        assert!(m.is_dirty());
    }

    // Scenario B: merging two groups that both contain view 2 fails with
    // ViewConflict and changes nothing.
    #[test]
    fn test_merge_conflict_leaves_state_unchanged() {
        let (_tmp, mut m) = fixture(&[(1, 2), (2, 2)]);
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();
        m.add_match(KeypointId(1), KeypointId(1)).unwrap();

        let err = m.add_match(KeypointId(0), KeypointId(1)).unwrap_err();
        assert!(matches!(err, Error::ViewConflict { .. }));

        assert_eq!(members(&mut m, 0), vec![(1, 0), (2, 0)]);
        assert_eq!(members(&mut m, 1), vec![(1, 1), (2, 1)]);
        assert_eq!(m.match_count(ViewId(1), ViewId(2)), 2);
        assert_eq!(m.group_ids(), vec![GroupId(0), GroupId(1)]);
        assert_eq!(m.matches().len(), 2);
    }

    // Scenario C: matching an already-grouped keypoint against an
    // unmatched one in a third view extends the group.
    #[test]
    fn test_extend_group_across_third_view() {
        let (_tmp, mut m) = fixture(&[(1, 1), (2, 1), (3, 1)]);
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();

        m.set_active_pair(ViewId(1), ViewId(3)).unwrap();
        let change = m.add_match(KeypointId(0), KeypointId(0)).unwrap();
        assert_eq!(
            change,
            Change::GroupExtended {
                group: GroupId(0),
                view: ViewId(3)
            }
        );
        assert_eq!(members(&mut m, 0), vec![(1, 0), (2, 0), (3, 0)]);
        assert_eq!(m.match_count(ViewId(1), ViewId(3)), 1);
        assert_eq!(m.match_count(ViewId(2), ViewId(3)), 1);
        assert_eq!(m.match_count(ViewId(1), ViewId(2)), 1);
    }

    // Scenario D: removing one membership drops only that view's pairs.
    #[test]
    fn test_remove_match_decrements_remaining_pairs() {
        let (_tmp, mut m) = fixture(&[(1, 1), (2, 1), (3, 1)]);
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();
        m.set_active_pair(ViewId(1), ViewId(3)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();

        let change = m.remove_match(ViewId(1), KeypointId(0)).unwrap();
        assert_eq!(
            change,
            Change::MatchRemoved {
                group: GroupId(0),
                view: ViewId(1),
                keypoint: KeypointId(0),
                dissolved: false,
            }
        );
        assert_eq!(members(&mut m, 0), vec![(2, 0), (3, 0)]);
        assert_eq!(m.match_count(ViewId(1), ViewId(2)), 0);
        assert_eq!(m.match_count(ViewId(1), ViewId(3)), 0);
        assert_eq!(m.match_count(ViewId(2), ViewId(3)), 1);
        assert_eq!(m.pair_degree(ViewId(1)), 0);
        assert_eq!(
            m.view(ViewId(1)).unwrap().keypoint(KeypointId(0)).unwrap().group_id,
            None
        );
        // Group 0 lost its slot in the active i-view (view 1).
        assert_eq!(
            m.matches().get(&GroupId(0)),
            Some(&[None, Some(KeypointId(0))])
        );
    }

    #[test]
    fn test_add_match_idempotent_on_linked_pair() {
        let (_tmp, mut m) = fixture(&[(1, 1), (2, 1)]);
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();

        let change = m.add_match(KeypointId(0), KeypointId(0)).unwrap();
        assert_eq!(change, Change::NoOp);
        assert_eq!(m.match_count(ViewId(1), ViewId(2)), 1);
        assert_eq!(m.group_ids(), vec![GroupId(0)]);
    }

    #[test]
    fn test_extend_conflict_when_view_already_represented() {
        let (_tmp, mut m) = fixture(&[(1, 2), (2, 1)]);
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();

        // Keypoint 1 of view 1 against the already-grouped view-2 point:
        // group 0 already has a view-1 member.
        let err = m.add_match(KeypointId(1), KeypointId(0)).unwrap_err();
        assert!(matches!(
            err,
            Error::ViewConflict {
                group: GroupId(0),
                view: ViewId(1)
            }
        ));
        assert_eq!(members(&mut m, 0), vec![(1, 0), (2, 0)]);
        assert_eq!(m.unmatched_count(ViewId(1)).unwrap(), 1);
    }

    #[test]
    fn test_merge_reassigns_members_in_other_views() {
        // Group A spans views 1,3; group B spans views 2,4. Merging via
        // the (1,2) pair must rewrite group ids in views 3 and 4 too.
        let (_tmp, mut m) = fixture(&[(1, 1), (2, 1), (3, 1), (4, 1)]);
        m.set_active_pair(ViewId(1), ViewId(3)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();
        m.set_active_pair(ViewId(2), ViewId(4)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();

        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        let change = m.add_match(KeypointId(0), KeypointId(0)).unwrap();
        assert_eq!(
            change,
            Change::GroupsMerged {
                group: GroupId(2),
                dissolved: [GroupId(0), GroupId(1)],
            }
        );

        assert_eq!(m.group_ids(), vec![GroupId(2)]);
        assert_eq!(members(&mut m, 2), vec![(1, 0), (3, 0), (2, 0), (4, 0)]);
        for v in [1u64, 2, 3, 4] {
            assert_eq!(
                m.view(ViewId(v)).unwrap().keypoint(KeypointId(0)).unwrap().group_id,
                Some(GroupId(2)),
                "view {v} not reassigned"
            );
        }
        // Cross pairs between former members, in both directions.
        for (a, b) in [(1, 2), (1, 4), (3, 2), (3, 4)] {
            assert_eq!(m.match_count(ViewId(a), ViewId(b)), 1);
            assert_eq!(m.match_count(ViewId(b), ViewId(a)), 1);
        }
        // Intra-group pairs from before the merge are untouched.
        assert_eq!(m.match_count(ViewId(1), ViewId(3)), 1);
        assert_eq!(m.match_count(ViewId(2), ViewId(4)), 1);

        assert_eq!(
            m.matches().get(&GroupId(2)),
            Some(&[Some(KeypointId(0)), Some(KeypointId(0))])
        );
        assert!(m.matches().get(&GroupId(0)).is_none());
    }

    #[test]
    fn test_remove_match_dissolves_pair_group() {
        let (_tmp, mut m) = fixture(&[(1, 1), (2, 1)]);
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();

        m.remove_match(ViewId(1), KeypointId(0)).unwrap();
        // Singleton group survives with the view-2 member.
        assert_eq!(members(&mut m, 0), vec![(2, 0)]);

        let change = m.remove_match(ViewId(2), KeypointId(0)).unwrap();
        assert_eq!(
            change,
            Change::MatchRemoved {
                group: GroupId(0),
                view: ViewId(2),
                keypoint: KeypointId(0),
                dissolved: true,
            }
        );
        assert!(m.group(GroupId(0)).unwrap().is_none());
        assert!(m.matches().is_empty());
        assert_eq!(m.match_count(ViewId(1), ViewId(2)), 0);

        // The retired id is never handed out again.
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();
        assert_eq!(m.group_ids(), vec![GroupId(1)]);
    }

    #[test]
    fn test_remove_match_unmatched_is_noop() {
        let (_tmp, mut m) = fixture(&[(1, 1), (2, 1)]);
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        let change = m.remove_match(ViewId(1), KeypointId(0)).unwrap();
        assert_eq!(change, Change::NoOp);
        // NoOp is the one change that implies no unsaved state.
        assert!(!change.is_mutation());
        assert!(!m.is_dirty());
    }

    #[test]
    fn test_remove_keypoint_detaches_match_first() {
        let (_tmp, mut m) = fixture(&[(1, 2), (2, 1)]);
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();

        m.remove_keypoint(ViewId(1), KeypointId(0)).unwrap();
        assert_eq!(m.keypoint_count(ViewId(1)).unwrap(), 1);
        assert_eq!(m.match_count(ViewId(1), ViewId(2)), 0);
        assert_eq!(members(&mut m, 0), vec![(2, 0)]);

        // New ids keep counting past removed ones.
        assert_eq!(m.add_keypoint(ViewId(1), 5.0, 5.0).unwrap(), KeypointId(2));

        assert!(matches!(
            m.remove_keypoint(ViewId(1), KeypointId(0)),
            Err(Error::InvalidKeypointId(ViewId(1), KeypointId(0)))
        ));
    }

    #[test]
    fn test_set_active_pair_rebuilds_join() {
        let (_tmp, mut m) = fixture(&[(1, 2), (2, 2), (3, 1)]);
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();
        m.set_active_pair(ViewId(2), ViewId(3)).unwrap();
        m.add_match(KeypointId(1), KeypointId(0)).unwrap();

        // Back to (1,2): group 0 joins fully, group 1 only on the j side.
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        assert_eq!(
            m.matches().get(&GroupId(0)),
            Some(&[Some(KeypointId(0)), Some(KeypointId(0))])
        );
        assert_eq!(
            m.matches().get(&GroupId(1)),
            Some(&[None, Some(KeypointId(1))])
        );

        // Pair (1,3): group 1 appears only on the j side as well.
        m.set_active_pair(ViewId(1), ViewId(3)).unwrap();
        assert_eq!(
            m.matches().get(&GroupId(1)),
            Some(&[None, Some(KeypointId(0))])
        );
        assert_eq!(
            m.matches().get(&GroupId(0)),
            Some(&[Some(KeypointId(0)), None])
        );
    }

    #[test]
    fn test_navigation_clamps_at_ends() {
        let (_tmp, m) = fixture(&[(1, 0), (3, 0), (7, 0)]);
        assert_eq!(m.next_view(ViewId(1)).unwrap(), ViewId(3));
        assert_eq!(m.next_view(ViewId(7)).unwrap(), ViewId(7));
        assert_eq!(m.prev_view(ViewId(3)).unwrap(), ViewId(1));
        assert_eq!(m.prev_view(ViewId(1)).unwrap(), ViewId(1));
        assert!(m.next_view(ViewId(2)).is_err());
    }

    #[test]
    fn test_pair_partners_ranked_by_shared_groups() {
        let (_tmp, mut m) = fixture(&[(1, 2), (2, 2), (3, 1)]);
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();
        m.add_match(KeypointId(1), KeypointId(1)).unwrap();
        m.set_active_pair(ViewId(1), ViewId(3)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();

        assert_eq!(
            m.pair_partners(ViewId(1)),
            vec![(ViewId(2), 2), (ViewId(3), 1)]
        );
        // Extending group 0 into view 3 links it to both prior members.
        assert_eq!(
            m.pair_partners(ViewId(3)),
            vec![(ViewId(1), 1), (ViewId(2), 1)]
        );
        assert!(m.pair_partners(ViewId(9)).is_empty());
    }

    #[test]
    fn test_counter_survives_reload() {
        let (tmp, mut m) = fixture(&[(1, 2), (2, 2), (3, 1)]);
        m.set_active_pair(ViewId(1), ViewId(2)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();
        m.add_match(KeypointId(1), KeypointId(1)).unwrap();
        m.set_active_pair(ViewId(1), ViewId(3)).unwrap();
        m.add_match(KeypointId(0), KeypointId(0)).unwrap();
        m.flush().unwrap();
        assert!(!m.is_dirty());

        let reopened = Matching::open(tmp.path()).unwrap();
        assert_eq!(reopened.match_count(ViewId(1), ViewId(2)), 2);
        assert_eq!(reopened.match_count(ViewId(1), ViewId(3)), 1);
        assert_eq!(reopened.match_count(ViewId(2), ViewId(3)), 1);
        assert_eq!(reopened.pair_degree(ViewId(1)), 2);
    }

    #[test]
    fn test_move_keypoint_marks_dirty() {
        let (_tmp, mut m) = fixture(&[(1, 1), (2, 1)]);
        assert!(!m.is_dirty());
        m.move_keypoint(ViewId(1), KeypointId(0), 10.0, 20.0).unwrap();
        assert!(m.is_dirty());
        let kp = m.view(ViewId(1)).unwrap().keypoint(KeypointId(0)).unwrap();
        assert_eq!((kp.pos.x, kp.pos.y), (10.0, 20.0));
    }
}

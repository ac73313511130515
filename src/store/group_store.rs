//! Group store - per-group records with dirty tracking and id retirement.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use super::records::GroupRecord;
use super::{id_from_file_name, read_record, scan_record_dir, write_record_atomic};
use crate::error::{Error, Result};
use crate::matching::group::Group;
use crate::matching::types::GroupId;

enum GroupSlot {
    Unloaded(PathBuf),
    Loaded {
        group: Group,
        extra: Map<String, Value>,
        path: PathBuf,
        /// Whether the record exists on disk (scanned, or flushed since
        /// creation). Dissolving a persisted group schedules its file for
        /// deletion at the next flush.
        persisted: bool,
    },
}

/// Cache of group records under `<annot_dir>/groups`.
pub struct GroupStore {
    dir: PathBuf,
    slots: BTreeMap<GroupId, GroupSlot>,
    dirty: BTreeSet<GroupId>,
    /// Backing files of dissolved groups, removed at the next flush.
    retired: Vec<PathBuf>,
    /// Next id to allocate. Monotonic for the whole session: dissolving a
    /// group never lowers it, so retired ids are not handed out again.
    next_id: u64,
}

impl GroupStore {
    /// Scan the groups directory and register every record.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut slots = BTreeMap::new();
        for path in scan_record_dir(&dir)? {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let (id, slot) = match id_from_file_name(name, "group") {
                Some(id) => (GroupId(id), GroupSlot::Unloaded(path.clone())),
                None => {
                    let record: GroupRecord = read_record(&path)?;
                    let id = record.id;
                    let (group, extra) = record.into_domain();
                    (
                        id,
                        GroupSlot::Loaded {
                            group,
                            extra,
                            path: path.clone(),
                            persisted: true,
                        },
                    )
                }
            };
            if slots.insert(id, slot).is_some() {
                return Err(Error::Io(IoError::new(
                    ErrorKind::InvalidData,
                    format!("duplicate group record for {id} at {}", path.display()),
                )));
            }
        }
        let next_id = slots.keys().last().map(|g| g.0 + 1).unwrap_or(0);
        debug!(groups = slots.len(), dir = %dir.display(), "scanned group records");
        Ok(Self {
            dir,
            slots,
            dirty: BTreeSet::new(),
            retired: Vec::new(),
            next_id,
        })
    }

    /// All live group ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.slots.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, id: GroupId) -> bool {
        self.slots.contains_key(&id)
    }

    /// The id the next `insert` is expected to carry. Not consumed until
    /// a group with it is actually inserted.
    pub fn next_id(&self) -> GroupId {
        GroupId(self.next_id)
    }

    fn ensure_loaded(&mut self, id: GroupId) -> Result<()> {
        if let Some(GroupSlot::Unloaded(path)) = self.slots.get(&id) {
            let path = path.clone();
            let record: GroupRecord = read_record(&path)?;
            if record.id != id {
                return Err(Error::Io(IoError::new(
                    ErrorKind::InvalidData,
                    format!(
                        "record at {} declares id {} but file name says {id}",
                        path.display(),
                        record.id
                    ),
                )));
            }
            let (group, extra) = record.into_domain();
            self.slots.insert(
                id,
                GroupSlot::Loaded {
                    group,
                    extra,
                    path,
                    persisted: true,
                },
            );
        }
        Ok(())
    }

    /// Load (if needed) and borrow a group. `Ok(None)` means the id does
    /// not name a live group; the caller decides whether that is a
    /// dangling reference or a plain miss.
    pub fn get(&mut self, id: GroupId) -> Result<Option<&Group>> {
        self.ensure_loaded(id)?;
        match self.slots.get(&id) {
            Some(GroupSlot::Loaded { group, .. }) => Ok(Some(group)),
            _ => Ok(None),
        }
    }

    /// Load (if needed) and borrow a group mutably, marking it dirty.
    pub fn get_mut(&mut self, id: GroupId) -> Result<Option<&mut Group>> {
        self.ensure_loaded(id)?;
        match self.slots.get_mut(&id) {
            Some(GroupSlot::Loaded { group, .. }) => {
                self.dirty.insert(id);
                Ok(Some(group))
            }
            _ => Ok(None),
        }
    }

    /// Register a newly created group. Dirty until first flush.
    pub fn insert(&mut self, group: Group) {
        let id = group.id;
        let path = self.dir.join(format!("group_{}.json", id.0));
        self.slots.insert(
            id,
            GroupSlot::Loaded {
                group,
                extra: Map::new(),
                path,
                persisted: false,
            },
        );
        self.dirty.insert(id);
        self.next_id = self.next_id.max(id.0 + 1);
    }

    /// Dissolve a group, retiring its id permanently.
    ///
    /// If the record had ever been written to disk, the backing file is
    /// deleted at the next flush; otherwise it is simply forgotten.
    pub fn remove(&mut self, id: GroupId) {
        match self.slots.remove(&id) {
            Some(GroupSlot::Loaded {
                path, persisted, ..
            }) => {
                if persisted {
                    self.retired.push(path);
                }
            }
            Some(GroupSlot::Unloaded(path)) => self.retired.push(path),
            None => {}
        }
        self.dirty.remove(&id);
    }

    /// Force every record into memory (counter rebuild, export, audit).
    pub fn load_all(&mut self) -> Result<()> {
        let ids: Vec<GroupId> = self.slots.keys().copied().collect();
        for id in ids {
            self.ensure_loaded(id)?;
        }
        Ok(())
    }

    /// Iterate groups already in memory. Call `load_all` first when the
    /// full set is required.
    pub fn iter_loaded(&self) -> impl Iterator<Item = &Group> {
        self.slots.values().filter_map(|slot| match slot {
            GroupSlot::Loaded { group, .. } => Some(group),
            GroupSlot::Unloaded(_) => None,
        })
    }

    /// Whether any record is waiting to be written or deleted.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty() || !self.retired.is_empty()
    }

    /// Write dirty records, delete retired ones, mark everything clean.
    ///
    /// Records are unmarked (and retired paths dropped) only as each
    /// write or deletion succeeds, so a failed flush can be retried with
    /// nothing lost.
    pub fn flush(&mut self) -> Result<()> {
        let pending: Vec<GroupId> = self.dirty.iter().copied().collect();
        for id in pending {
            match self.slots.get_mut(&id) {
                Some(GroupSlot::Loaded {
                    group,
                    extra,
                    path,
                    persisted,
                }) => {
                    write_record_atomic(path, &GroupRecord::from_domain(group, extra))?;
                    *persisted = true;
                }
                _ => unreachable!("dirty record cannot be unloaded or absent"),
            }
            self.dirty.remove(&id);
        }
        while let Some(path) = self.retired.pop() {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    self.retired.push(path);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

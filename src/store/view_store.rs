//! View store - per-view records with dirty tracking.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::records::{ViewExtras, ViewRecord};
use super::{id_from_file_name, read_record, scan_record_dir, write_record_atomic};
use crate::error::{Error, Result};
use crate::matching::types::ViewId;
use crate::matching::view::View;

enum ViewSlot {
    /// Seen at scan time, not read yet.
    Unloaded(PathBuf),
    /// In memory; dirty iff its id is in the store's pending set.
    Loaded {
        view: View,
        extras: ViewExtras,
        path: PathBuf,
    },
}

/// Cache of view records under `<annot_dir>/views`.
///
/// View records are externally produced; the store only ever rewrites
/// files it scanned, so it does not retain the directory path.
pub struct ViewStore {
    slots: BTreeMap<ViewId, ViewSlot>,
    dirty: BTreeSet<ViewId>,
}

impl ViewStore {
    /// Scan the views directory and register every record.
    ///
    /// Records named `view_{id}.json` stay unloaded until first access;
    /// anything else is read once here to learn its id.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut slots = BTreeMap::new();
        for path in scan_record_dir(&dir)? {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let (id, slot) = match id_from_file_name(name, "view") {
                Some(id) => (ViewId(id), ViewSlot::Unloaded(path.clone())),
                None => {
                    let record: ViewRecord = read_record(&path)?;
                    let id = record.id;
                    let (view, extras) = record.into_domain();
                    (
                        id,
                        ViewSlot::Loaded {
                            view,
                            extras,
                            path: path.clone(),
                        },
                    )
                }
            };
            if slots.insert(id, slot).is_some() {
                return Err(Error::Io(IoError::new(
                    ErrorKind::InvalidData,
                    format!("duplicate view record for {id} at {}", path.display()),
                )));
            }
        }
        debug!(views = slots.len(), dir = %dir.display(), "scanned view records");
        Ok(Self {
            slots,
            dirty: BTreeSet::new(),
        })
    }

    /// All registered view ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ViewId> + '_ {
        self.slots.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.slots.contains_key(&id)
    }

    fn ensure_loaded(&mut self, id: ViewId) -> Result<()> {
        let Some(slot) = self.slots.get_mut(&id) else {
            return Err(Error::InvalidViewId(id));
        };
        if let ViewSlot::Unloaded(path) = slot {
            let path = path.clone();
            let record: ViewRecord = read_record(&path)?;
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
            let (view, extras) = record.into_domain();
            *slot = ViewSlot::Loaded { view, extras, path };
        }
        Ok(())
    }

    /// Load (if needed) and borrow a view.
    pub fn get(&mut self, id: ViewId) -> Result<&View> {
        self.ensure_loaded(id)?;
        match &self.slots[&id] {
            ViewSlot::Loaded { view, .. } => Ok(view),
            ViewSlot::Unloaded(_) => unreachable!("ensure_loaded left slot unloaded"),
        }
    }

    /// Load (if needed) and borrow a view mutably, marking it dirty.
    pub fn get_mut(&mut self, id: ViewId) -> Result<&mut View> {
        self.ensure_loaded(id)?;
        self.dirty.insert(id);
        match self.slots.get_mut(&id) {
            Some(ViewSlot::Loaded { view, .. }) => Ok(view),
            _ => unreachable!("ensure_loaded left slot unloaded"),
        }
    }

    /// Borrow a view only if it is already in memory.
    pub fn peek(&self, id: ViewId) -> Option<&View> {
        match self.slots.get(&id)? {
            ViewSlot::Loaded { view, .. } => Some(view),
            ViewSlot::Unloaded(_) => None,
        }
    }

    /// Force every record into memory (export and audit walk them all).
    pub fn load_all(&mut self) -> Result<()> {
        let ids: Vec<ViewId> = self.slots.keys().copied().collect();
        for id in ids {
            self.ensure_loaded(id)?;
        }
        Ok(())
    }

    /// Whether any record is waiting to be written back.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Write every dirty record back to disk and mark it clean.
    ///
    /// Each record is unmarked only once its write succeeded, so a failed
    /// flush leaves everything unwritten still dirty for the next attempt.
    pub fn flush(&mut self) -> Result<()> {
        let pending: Vec<ViewId> = self.dirty.iter().copied().collect();
        for id in pending {
            match &self.slots[&id] {
                ViewSlot::Loaded { view, extras, path } => {
                    write_record_atomic(path, &ViewRecord::from_domain(view, extras))?;
                }
                ViewSlot::Unloaded(_) => unreachable!("dirty record cannot be unloaded"),
            }
            self.dirty.remove(&id);
        }
        Ok(())
    }
}

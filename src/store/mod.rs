//! Record stores - lazy, mutation-aware caches over the annotation dir.
//!
//! An annotation directory holds one JSON record per view under `views/`
//! and one per group under `groups/`. Each store keeps its records in one
//! of three states:
//! - **unloaded**: the file was seen at scan time but never read;
//! - **loaded-clean**: read into memory and identical to disk;
//! - **loaded-dirty**: modified since the last flush.
//!
//! `flush` rewrites only dirty records (write-temp-then-rename, so a crash
//! never corrupts a single record) and deletes the backing files of
//! dissolved groups. Dirty records are never evicted.

pub mod group_store;
pub mod records;
pub mod view_store;

pub use group_store::GroupStore;
pub use view_store::ViewStore;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Parse the numeric id out of a record file name like `view_12.json`.
///
/// Returns `None` for names that do not follow the convention; those
/// records are read eagerly at scan time to learn their id.
pub(crate) fn id_from_file_name(name: &str, stem: &str) -> Option<u64> {
    name.strip_prefix(stem)?
        .strip_prefix('_')?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Collect every `.json` record path in a directory, creating it if absent.
pub(crate) fn scan_record_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

pub(crate) fn read_record<R: DeserializeOwned>(path: &Path) -> Result<R> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Write a record so that a crash mid-write never corrupts the old file:
/// serialize to a sibling temp file, then rename over the target.
pub(crate) fn write_record_atomic<R: Serialize>(path: &Path, record: &R) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, record)?;
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

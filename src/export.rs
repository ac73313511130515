//! Export - flatten groups into pairwise match lists.
//!
//! Downstream geometry pipelines consume a single document with a `views`
//! section (positions only) and a `pairs` section addressing keypoints by
//! their *positional index* in the view's sequence, not by id. A group
//! spanning views {A, B, C} expands combinatorially into one match entry
//! for each of (A,B), (A,C), (B,C). Output ordering is deterministic:
//! views ascend by id, groups are visited in id order with members in
//! view-id order, pairs ascend by (i, j).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::matching::engine::Matching;
use crate::matching::types::ViewId;

/// One view in the export document: id, path segments, flattened
/// keypoint positions in sequence order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportView {
    pub id_view: ViewId,
    pub filename: Vec<String>,
    pub keypoints: Vec<[f64; 2]>,
}

/// One view pair and its index-addressed matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPair {
    pub id_view_i: ViewId,
    pub id_view_j: ViewId,
    pub matches: Vec<[usize; 2]>,
}

/// The complete export artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub views: Vec<ExportView>,
    pub pairs: Vec<ExportPair>,
}

/// Flatten the full structure into an export document.
pub fn document(matching: &mut Matching) -> Result<ExportDocument> {
    matching.load_all()?;

    let mut views = Vec::with_capacity(matching.view_count());
    for vid in matching.view_ids() {
        let view = matching.view(vid)?;
        views.push(ExportView {
            id_view: vid,
            filename: view.filename.clone(),
            keypoints: view.keypoints().iter().map(|k| [k.pos.x, k.pos.y]).collect(),
        });
    }

    let mut pair_matches: BTreeMap<(ViewId, ViewId), Vec<[usize; 2]>> = BTreeMap::new();
    for gid in matching.group_ids() {
        let mut members = matching
            .group(gid)?
            .map(|g| g.members().to_vec())
            .unwrap_or_default();
        members.sort_by_key(|(v, _)| *v);
        for a in 0..members.len() {
            for b in (a + 1)..members.len() {
                let (vid_a, kid_a) = members[a];
                let (vid_b, kid_b) = members[b];
                let idx_a = matching
                    .view(vid_a)?
                    .index_of(kid_a)
                    .ok_or(Error::InvalidKeypointId(vid_a, kid_a))?;
                let idx_b = matching
                    .view(vid_b)?
                    .index_of(kid_b)
                    .ok_or(Error::InvalidKeypointId(vid_b, kid_b))?;
                pair_matches
                    .entry((vid_a, vid_b))
                    .or_default()
                    .push([idx_a, idx_b]);
            }
        }
    }

    let pairs = pair_matches
        .into_iter()
        .map(|((i, j), matches)| ExportPair {
            id_view_i: i,
            id_view_j: j,
            matches,
        })
        .collect();

    Ok(ExportDocument { views, pairs })
}

/// Export to a JSON file.
pub fn write_to<P: AsRef<Path>>(matching: &mut Matching, path: P) -> Result<()> {
    let doc = document(matching)?;
    let file = File::create(path.as_ref())?;
    serde_json::to_writer(BufWriter::new(file), &doc)?;
    info!(
        views = doc.views.len(),
        pairs = doc.pairs.len(),
        path = %path.as_ref().display(),
        "exported match document"
    );
    Ok(())
}

use crate::state::ProgressState;
use anyhow::{anyhow, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// `comments-<NNN>.xml`, index zero-padded to at least three digits.
pub fn batch_file_name(index: u32) -> String {
    format!("comments-{:03}.xml", index)
}

pub fn batch_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(batch_file_name(index))
}

/// Completed batch documents already present in `dir`, by index.
/// Temp files (`*.inprogress`) are not batches.
pub fn discover_batch_files(dir: &Path) -> BTreeMap<u32, PathBuf> {
    let re = Regex::new(r"^comments-(\d{3,})\.xml$").expect("static batch pattern");
    let mut map = BTreeMap::new();
    if !dir.exists() {
        return map;
    }
    for ent in WalkDir::new(dir).min_depth(1).max_depth(1).into_iter().flatten() {
        if let Some(name) = ent.file_name().to_str() {
            if let Some(caps) = re.captures(name) {
                if let Ok(idx) = caps[1].parse::<u32>() {
                    map.insert(idx, ent.path().to_path_buf());
                }
            }
        }
    }
    map
}

/// First batch index of this run.
///
/// Continues after the last completed batch in `state`, and also past any batch
/// file already on disk so a lost or reset state never overwrites earlier output.
pub fn next_batch_index(state: &ProgressState, out_dir: Option<&Path>) -> Result<u32> {
    let from_state = state
        .next_batch_index()
        .ok_or_else(|| anyhow!("batch numbering exhausted in saved state"))?;
    let from_disk = match out_dir.map(discover_batch_files).and_then(|m| m.keys().next_back().copied()) {
        Some(last) => last
            .checked_add(1)
            .ok_or_else(|| anyhow!("batch numbering exhausted: comments-{last}.xml exists"))?,
        None => 0,
    };
    if from_disk > from_state {
        tracing::warn!(
            from_state,
            from_disk,
            "batch files beyond the saved state exist; numbering continues after them"
        );
    }
    Ok(from_state.max(from_disk))
}

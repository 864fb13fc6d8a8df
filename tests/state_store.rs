#[path = "common/mod.rs"]
mod common;

use common::*;
use comment_export::{
    next_batch_index, ProgressState, ProgressStore, ProgressTracker, RecordKey, SaveGranularity,
    STATE_VERSION,
};
use std::fs;

/// Missing, corrupt and version-skewed state files all mean "start fresh".
#[test]
fn unusable_state_loads_as_none() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("state.json");
    let store = ProgressStore::new(&path);

    assert!(store.load().is_none());

    fs::write(&path, b"{ not json").unwrap();
    assert!(store.load().is_none());

    fs::write(&path, br#"{"version": 99, "processed_keys": [], "last_completed_batch_index": 4}"#).unwrap();
    assert!(store.load().is_none());

    fs::write(&path, br#"{"processed_keys": [], "last_completed_batch_index": 4}"#).unwrap();
    assert!(store.load().is_none());

    fs::write(&path, br#"{"version": 1, "processed_keys": "oops", "last_completed_batch_index": 4}"#).unwrap();
    assert!(store.load().is_none());
    assert_eq!(store.load_or_default(), ProgressState::default());
}

/// Saved state reloads equal, carries the current version, and leaves no temp file.
#[test]
fn save_then_load_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("nested").join("state.json");
    let store = ProgressStore::new(&path);

    let mut state = ProgressState::default();
    state.processed_keys.insert(RecordKey::new(3, "7"));
    state.processed_keys.insert(RecordKey::new(4, "slug-12"));
    state.processed_comments.insert(41);
    state.last_completed_batch_index = Some(1);
    store.save(&state).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded, state);
    assert_eq!(loaded.version, STATE_VERSION);
    assert_eq!(loaded.next_batch_index(), Some(2));
    assert_eq!(file_names(&tmp.path().join("nested")), vec!["state.json"]);
}

/// A state file written before comment-level progress existed still loads.
#[test]
fn state_without_comment_ids_loads() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("state.json");
    fs::write(
        &path,
        br#"{"version": 1, "processed_keys": [{"content_type_id": 3, "object_id": "7"}], "last_completed_batch_index": 1}"#,
    )
    .unwrap();

    let state = ProgressStore::new(&path).load().unwrap();
    assert!(state.is_processed(&RecordKey::new(3, "7")));
    assert!(state.processed_comments.is_empty());
}

/// Per-batch saving writes records only on commit; per-item saving writes on each new mark.
/// Re-marking a key does not write again.
#[test]
fn tracker_save_granularity() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("state.json");

    let mut coarse = ProgressTracker::new(
        ProgressState::default(),
        Some(ProgressStore::new(&path)),
        SaveGranularity::PerBatch,
    );
    coarse.mark_record(&RecordKey::new(3, "7")).unwrap();
    coarse.mark_record(&RecordKey::new(3, "8")).unwrap();
    assert_eq!(coarse.saves(), 0);
    assert!(!path.exists());
    coarse.commit_batch(0).unwrap();
    assert_eq!(coarse.saves(), 1);
    assert_eq!(ProgressStore::new(&path).load().unwrap().processed_keys.len(), 2);

    let mut fine = ProgressTracker::new(
        ProgressStore::new(&path).load_or_default(),
        Some(ProgressStore::new(&path)),
        SaveGranularity::PerItem,
    );
    fine.mark_record(&RecordKey::new(3, "8")).unwrap();
    assert_eq!(fine.saves(), 0);
    fine.mark_record(&RecordKey::new(3, "9")).unwrap();
    fine.mark_comment_durable(5).unwrap();
    assert_eq!(fine.saves(), 2);
    let on_disk = ProgressStore::new(&path).load().unwrap();
    assert!(on_disk.is_processed(&RecordKey::new(3, "9")));
    assert!(on_disk.processed_comments.contains(&5));
}

/// An accepted comment is on disk at once even with per-batch saving, and
/// accepting it again writes nothing.
#[test]
fn accepted_comment_is_saved_regardless_of_granularity() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("state.json");
    let mut t = ProgressTracker::new(
        ProgressState::default(),
        Some(ProgressStore::new(&path)),
        SaveGranularity::PerBatch,
    );

    t.mark_record(&RecordKey::new(3, "7")).unwrap();
    t.mark_comment_durable(11).unwrap();
    assert_eq!(t.saves(), 1);
    let on_disk = ProgressStore::new(&path).load().unwrap();
    assert!(on_disk.processed_comments.contains(&11));

    t.mark_comment_durable(11).unwrap();
    assert_eq!(t.saves(), 1);
}

/// The last completed index never moves backwards; without a store nothing is written.
#[test]
fn commit_keeps_highest_index_and_dry_tracker_writes_nothing() {
    let mut t = ProgressTracker::new(ProgressState::default(), None, SaveGranularity::PerItem);
    t.commit_batch(4).unwrap();
    t.commit_batch(2).unwrap();
    t.mark_record(&RecordKey::new(1, "1")).unwrap();
    assert_eq!(t.state().last_completed_batch_index, Some(4));
    assert_eq!(t.saves(), 0);
}

/// Numbering continues after the saved index, and past any batch file already on disk.
#[test]
fn next_index_considers_state_and_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let mut state = ProgressState::default();
    assert_eq!(next_batch_index(&state, Some(tmp.path())).unwrap(), 0);

    state.last_completed_batch_index = Some(1);
    assert_eq!(next_batch_index(&state, Some(tmp.path())).unwrap(), 2);
    assert_eq!(next_batch_index(&state, None).unwrap(), 2);

    fs::write(tmp.path().join("comments-004.xml"), b"<rss/>").unwrap();
    fs::write(tmp.path().join("comments-009.xml.inprogress"), b"").unwrap();
    fs::write(tmp.path().join("notes.txt"), b"").unwrap();
    assert_eq!(next_batch_index(&state, Some(tmp.path())).unwrap(), 5);
}

/// A saved state at the last representable index cannot continue: it loads as
/// absent instead of wrapping back to batch zero.
#[test]
fn exhausted_state_index_loads_as_none() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("state.json");
    fs::write(
        &path,
        br#"{"version": 1, "processed_keys": [], "last_completed_batch_index": 4294967295}"#,
    )
    .unwrap();
    assert!(ProgressStore::new(&path).load().is_none());

    let state = ProgressState { last_completed_batch_index: Some(u32::MAX), ..Default::default() };
    assert_eq!(state.next_batch_index(), None);
    assert!(next_batch_index(&state, None).is_err());
}

/// A batch file at the last representable index on disk is an error, not a
/// silent restart at zero.
#[test]
fn exhausted_disk_index_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("comments-4294967295.xml"), b"<rss/>").unwrap();
    let err = next_batch_index(&ProgressState::default(), Some(tmp.path())).unwrap_err();
    assert!(format!("{err:#}").contains("exhausted"));
}

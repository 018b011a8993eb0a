use super::persistence::temp_path_for;
use super::*;
use crate::config::TrackingConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_test_rule() -> AnomalyRule {
    AnomalyRule {
        pixel_threshold: 120.0,
        velocity_threshold: 50.0,
        theft_count_threshold: 2,
    }
}

fn create_tracking_config(persist_path: Option<String>) -> TrackingConfig {
    TrackingConfig {
        persist_path,
        save_interval_seconds: 5.0,
        stale_timeout_seconds: 60.0,
    }
}

fn samples(store: &TrackStore, id: TrackId) -> Vec<(f64, i32, i32)> {
    store
        .history(id)
        .map(|history| history.iter().map(|s| (s.timestamp, s.x, s.y)).collect())
        .unwrap_or_default()
}

#[test]
fn test_history_is_bounded_to_most_recent_samples() {
    let mut store = TrackStore::new(create_test_rule(), &create_tracking_config(None));

    for i in 0..12 {
        store.update_at(7, i, i * 2, 1000.0 + i as f64);
        assert!(store.history(7).unwrap().len() <= MAX_HISTORY);
    }

    let expected: Vec<(f64, i32, i32)> = (7..12)
        .map(|i| (1000.0 + i as f64, i, i * 2))
        .collect();
    assert_eq!(samples(&store, 7), expected);
}

#[test]
fn test_stale_tracks_are_evicted_on_update() {
    let mut store = TrackStore::new(create_test_rule(), &create_tracking_config(None));

    store.update_at(1, 0, 0, 1000.0);
    store.update_at(2, 5, 5, 1030.0);
    assert_eq!(store.track_ids(), vec![1, 2]);

    // Exactly at the timeout is not yet stale
    store.update_at(3, 9, 9, 1060.0);
    assert_eq!(store.track_ids(), vec![1, 2, 3]);

    store.update_at(3, 9, 9, 1060.5);
    assert_eq!(store.track_ids(), vec![2, 3]);
    assert!(store.history(1).is_none());
}

#[test]
fn test_anomaly_rule_example() {
    let mut store = TrackStore::new(create_test_rule(), &create_tracking_config(None));
    store.update_at(1, 0, 0, 0.0);
    store.update_at(1, 100, 0, 1.0);

    let primaries = vec![(1, (100, 0))];
    let secondaries = vec![(10, 0), (20, 0)];
    assert!(store.evaluate(&primaries, &secondaries));

    let matched = store.find_anomaly(&primaries, &secondaries).unwrap();
    assert_eq!(matched.track_id, 1);
    assert_eq!(matched.nearby, 2);
    assert!((matched.velocity - 100.0).abs() < 1e-9);

    // One nearby secondary entity is not enough
    assert!(!store.evaluate(&primaries, &secondaries[..1]));
}

#[test]
fn test_single_sample_tracks_are_skipped() {
    let mut store = TrackStore::new(create_test_rule(), &create_tracking_config(None));
    store.update_at(1, 100, 0, 10.0);

    assert!(!store.evaluate(&[(1, (100, 0))], &[(100, 10), (100, 20)]));
    // Unknown ids are skipped too
    assert!(!store.evaluate(&[(42, (100, 0))], &[(100, 10), (100, 20)]));
}

#[test]
fn test_thresholds_are_strict_for_velocity_and_distance() {
    let mut store = TrackStore::new(create_test_rule(), &create_tracking_config(None));

    // Exactly 50px/s does not trigger
    store.update_at(1, 0, 0, 0.0);
    store.update_at(1, 50, 0, 1.0);
    assert!(!store.evaluate(&[(1, (50, 0))], &[(50, 10), (50, 20)]));

    // Exactly 120px away does not count as nearby
    store.update_at(2, 0, 0, 0.0);
    store.update_at(2, 200, 0, 1.0);
    assert!(!store.evaluate(&[(2, (200, 0))], &[(80, 0), (200, 10)]));
    assert!(store.evaluate(&[(2, (200, 0))], &[(81, 0), (200, 10)]));
}

#[test]
fn test_zero_elapsed_time_is_floored() {
    let mut store = TrackStore::new(create_test_rule(), &create_tracking_config(None));
    store.update_at(1, 0, 0, 5.0);
    store.update_at(1, 1, 0, 5.0);

    let matched = store
        .find_anomaly(&[(1, (1, 0))], &[(0, 0), (2, 0)])
        .expect("1px over the 1ms floor is 1000px/s");
    assert!((matched.velocity - 1000.0).abs() < 1e-6);
}

#[test]
fn test_first_matching_primary_wins() {
    let mut store = TrackStore::new(create_test_rule(), &create_tracking_config(None));
    store.update_at(1, 0, 0, 0.0);
    store.update_at(1, 10, 0, 1.0);
    store.update_at(2, 0, 0, 0.0);
    store.update_at(2, 300, 0, 1.0);
    store.update_at(3, 0, 0, 0.0);
    store.update_at(3, 400, 0, 1.0);

    let primaries = vec![(1, (10, 0)), (2, (300, 0)), (3, (400, 0))];
    let secondaries = vec![(300, 10), (310, 0), (400, 10), (410, 0)];
    let matched = store.find_anomaly(&primaries, &secondaries).unwrap();
    assert_eq!(matched.track_id, 2);
}

#[test]
fn test_persistence_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tracks.json");
    let config = create_tracking_config(Some(path.to_string_lossy().into_owned()));

    let mut store = TrackStore::new(create_test_rule(), &config);
    store.update_at(1, 5, 5, 1000.0);
    store.update_at(2, 10, 10, 1000.0);
    store.update_at(2, 11, 11, 1001.0);
    store.save();

    let restored = TrackStore::new(create_test_rule(), &config);
    assert_eq!(restored.track_ids(), vec![1, 2]);
    assert_eq!(samples(&restored, 1), vec![(1000.0, 5, 5)]);
    assert_eq!(
        samples(&restored, 2),
        vec![(1000.0, 10, 10), (1001.0, 11, 11)]
    );
}

#[test]
fn test_persisted_format_uses_string_ids_and_triples() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tracks.json");
    let config = create_tracking_config(Some(path.to_string_lossy().into_owned()));

    let mut store = TrackStore::new(create_test_rule(), &config);
    store.update_at(3, 4, 5, 1000.5);
    store.save();

    let value: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(value, serde_json::json!({"3": [[1000.5, 4, 5]]}));
}

#[test]
fn test_loading_truncates_long_histories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tracks.json");
    fs::write(
        &path,
        r#"{"9": [[1,0,0],[2,1,1],[3,2,2],[4,3,3],[5,4,4],[6,5,5],[7,6,6]]}"#,
    )
    .unwrap();

    let config = create_tracking_config(Some(path.to_string_lossy().into_owned()));
    let store = TrackStore::new(create_test_rule(), &config);
    let restored = samples(&store, 9);
    assert_eq!(restored.len(), MAX_HISTORY);
    assert_eq!(restored.first(), Some(&(3.0, 2, 2)));
    assert_eq!(restored.last(), Some(&(7.0, 6, 6)));
}

#[test]
fn test_malformed_or_missing_file_yields_empty_store() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.json");
    let store = TrackStore::new(
        create_test_rule(),
        &create_tracking_config(Some(missing.to_string_lossy().into_owned())),
    );
    assert!(store.is_empty());

    let malformed = dir.path().join("malformed.json");
    fs::write(&malformed, "{not json").unwrap();
    let mut store = TrackStore::new(
        create_test_rule(),
        &create_tracking_config(Some(malformed.to_string_lossy().into_owned())),
    );
    assert!(store.is_empty());

    store.load();
    assert!(store.is_empty());
}

#[test]
fn test_periodic_save_happens_after_interval() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tracks.json");
    let config = create_tracking_config(Some(path.to_string_lossy().into_owned()));

    let mut store = TrackStore::new(create_test_rule(), &config);
    let now = super::store::now_seconds();

    store.update_at(1, 0, 0, now);
    assert!(!path.exists());

    store.update_at(1, 1, 1, now + 6.0);
    assert!(path.exists());

    let restored = load_tracks(&path);
    assert_eq!(restored.get(&1).map(|h| h.len()), Some(2));
}

#[test]
fn test_save_failure_is_swallowed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("no_such_dir").join("tracks.json");
    let config = create_tracking_config(Some(path.to_string_lossy().into_owned()));

    let mut store = TrackStore::new(create_test_rule(), &config);
    store.update_at(1, 0, 0, 1000.0);
    store.save();
    assert!(!path.exists());
    assert_eq!(store.len(), 1);
}

#[test]
fn test_staging_file_never_matches_target() {
    assert_eq!(
        temp_path_for(Path::new("/var/lib/coopguard/tracks.tmp")),
        PathBuf::from("/var/lib/coopguard/tracks.tmp.tmp")
    );
    assert_eq!(
        temp_path_for(Path::new("tracks.json")),
        PathBuf::from("tracks.json.tmp")
    );
}

#[test]
fn test_save_to_tmp_suffixed_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tracks.tmp");
    let config = create_tracking_config(Some(path.to_string_lossy().into_owned()));

    let mut store = TrackStore::new(create_test_rule(), &config);
    store.update_at(8, 1, 2, 1000.0);
    store.save();

    let restored = TrackStore::new(create_test_rule(), &config);
    assert_eq!(restored.track_ids(), vec![8]);

    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("tracks.tmp")]);
}

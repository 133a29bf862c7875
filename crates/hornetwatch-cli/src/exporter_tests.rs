use crate::exporter::{prune_expired, SnapshotSink};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use hornetwatch_core::{DetectionEvent, ManualClock, Pipeline, PipelineConfig, Species};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

fn make_temp_dir(name: &str) -> PathBuf {
    let mut path = env::temp_dir();
    let uniq = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("unix epoch")
        .as_nanos();
    path.push(format!("hornetwatch-tests-{name}-{uniq}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

fn late_evening() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 30, 23, 50, 0)
        .single()
        .expect("valid date")
}

#[test]
fn prune_removes_only_expired_snapshot_files() {
    // Arrange
    let dir = make_temp_dir("old-vs-fresh");
    let old_log = dir.join("hornetwatch-2026-04-01.jsonl");
    let fresh_log = dir.join("hornetwatch-2026-08-20.jsonl");
    let foreign = dir.join("camera-2020-01-01.jsonl");
    fs::write(&old_log, "old").expect("write old log");
    fs::write(&fresh_log, "fresh").expect("write fresh log");
    fs::write(&foreign, "keep").expect("write foreign file");
    let today = NaiveDate::from_ymd_opt(2026, 8, 30).expect("valid date");

    // Act
    let removed = prune_expired(&dir, 90, today).expect("prune");

    // Assert
    assert_eq!(removed, 1);
    assert!(!old_log.exists(), "expired snapshot file should be pruned");
    assert!(fresh_log.exists(), "recent snapshot file should be kept");
    assert!(foreign.exists(), "files without our prefix are never pruned");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn snapshots_rotate_into_daily_files() {
    // Arrange
    let dir = make_temp_dir("rotate");
    let clock = Arc::new(ManualClock::new(late_evening()));
    let pipeline = Pipeline::new(PipelineConfig::default(), clock.clone(), None).expect("pipeline");
    let mut sink = SnapshotSink::open(dir.clone(), Utc.fix(), 90, late_evening()).expect("sink");

    // Act
    pipeline.ingest(
        DetectionEvent::new(Species::AsianHornet, 0.9, late_evening(), None).expect("event"),
        None,
    );
    sink.append(&pipeline.read_snapshot()).expect("first write");
    clock.set(late_evening() + Duration::minutes(20));
    sink.append(&pipeline.read_snapshot()).expect("second write");

    // Assert
    let first = fs::read_to_string(dir.join("hornetwatch-2026-08-30.jsonl")).expect("first day file");
    let second = fs::read_to_string(dir.join("hornetwatch-2026-08-31.jsonl")).expect("second day file");
    assert_eq!(first.lines().count(), 1);
    assert_eq!(second.lines().count(), 1);
    assert_eq!(sink.written, 2);

    let latest: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.join("latest.json")).expect("latest")).expect("json");
    assert_eq!(latest["totals"]["velutina"], 1);
    assert_eq!(latest["frames"]["capacity"], 20);
    assert_eq!(latest["hourly"].as_array().map(Vec::len), Some(24));
    assert!(!dir.join("latest.json.tmp").exists());

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn file_day_follows_bucket_offset() {
    // Arrange
    let dir = make_temp_dir("offset");
    let plus_two = FixedOffset::east_opt(2 * 3600).expect("offset");
    let clock = Arc::new(ManualClock::new(late_evening()));
    let pipeline = Pipeline::new(
        PipelineConfig {
            bucket_offset: plus_two,
            ..PipelineConfig::default()
        },
        clock,
        None,
    )
    .expect("pipeline");
    let mut sink = SnapshotSink::open(dir.clone(), plus_two, 90, late_evening()).expect("sink");

    // Act
    sink.append(&pipeline.read_snapshot()).expect("write");

    // Assert
    assert!(dir.join("hornetwatch-2026-08-31.jsonl").exists());
    assert!(!dir.join("hornetwatch-2026-08-30.jsonl").exists());

    let _ = fs::remove_dir_all(dir);
}

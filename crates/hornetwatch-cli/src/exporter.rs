use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};
use hornetwatch_core::{
    AlertStats, DeliveryStats, FrameSummary, HourlyBucket, LogEntry, Pipeline, Species,
    StatsSnapshot, Totals,
};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::source;

const FILE_PREFIX: &str = "hornetwatch-";
const FILE_SUFFIX: &str = ".jsonl";

pub async fn run_exporter(
    pipeline: Arc<Pipeline>,
    input: String,
    output_dir: &Path,
    retention_days: u64,
    every: Duration,
) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let offset = pipeline.config().bucket_offset;
    let mut sink = SnapshotSink::open(output_dir.to_path_buf(), offset, retention_days, Utc::now())?;
    let mut ingest = source::spawn_ingest(input, Arc::clone(&pipeline));
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("received ctrl-c, stopping export");
                ingest.abort();
                sink.append(&pipeline.read_snapshot())?;
                break;
            }
            done = &mut ingest => {
                let summary = done??;
                info!(accepted = summary.accepted, rejected = summary.rejected, malformed = summary.malformed, "input exhausted");
                sink.append(&pipeline.read_snapshot())?;
                break;
            }
            _ = ticker.tick() => {
                sink.append(&pipeline.read_snapshot())?;
            }
        }
    }

    info!(records = sink.written, dir = %output_dir.display(), "export finished");
    Ok(())
}

#[derive(Debug, Serialize)]
struct ExportRecord<'a> {
    ts: DateTime<Utc>,
    unix_ms: i64,
    uptime_ms: u128,
    totals: &'a Totals,
    confidence_avg: Option<f64>,
    detection_rate: f64,
    last_detection: &'a BTreeMap<Species, DateTime<Utc>>,
    hourly: &'a [HourlyBucket],
    alerts: &'a AlertStats,
    delivery: Option<&'a DeliveryStats>,
    frames: &'a FrameSummary,
    rejected: u64,
    recent_log: &'a [LogEntry],
}

impl<'a> From<&'a StatsSnapshot> for ExportRecord<'a> {
    fn from(snapshot: &'a StatsSnapshot) -> Self {
        Self {
            ts: snapshot.ts,
            unix_ms: snapshot.ts.timestamp_millis(),
            uptime_ms: snapshot.uptime_ms,
            totals: &snapshot.totals,
            confidence_avg: snapshot.confidence_avg,
            detection_rate: snapshot.detection_rate,
            last_detection: &snapshot.last_detection,
            hourly: &snapshot.hourly_buckets,
            alerts: &snapshot.alert_stats,
            delivery: snapshot.delivery.as_ref(),
            frames: &snapshot.frames,
            rejected: snapshot.rejected,
            recent_log: &snapshot.recent_log,
        }
    }
}

/// One JSONL file per day, in the offset of the hourly buckets.
pub(crate) struct SnapshotSink {
    out_dir: PathBuf,
    offset: FixedOffset,
    retention_days: u64,
    day: NaiveDate,
    writer: BufWriter<File>,
    pub(crate) written: u64,
}

impl SnapshotSink {
    pub(crate) fn open(
        out_dir: PathBuf,
        offset: FixedOffset,
        retention_days: u64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let day = now.with_timezone(&offset).date_naive();
        prune_expired(&out_dir, retention_days, day)?;
        let writer = open_day_file(&out_dir, day)?;

        Ok(Self {
            out_dir,
            offset,
            retention_days,
            day,
            writer,
            written: 0,
        })
    }

    pub(crate) fn append(&mut self, snapshot: &StatsSnapshot) -> Result<()> {
        let day = snapshot.ts.with_timezone(&self.offset).date_naive();
        if day != self.day {
            self.writer.flush()?;
            self.writer = open_day_file(&self.out_dir, day)?;
            self.day = day;
            let removed = prune_expired(&self.out_dir, self.retention_days, day)?;
            debug!(%day, removed, "rotated snapshot file");
        }

        let record = ExportRecord::from(snapshot);
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        // Readers poll latest.json; swap it in whole.
        let staging = self.out_dir.join("latest.json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(&record)?)?;
        fs::rename(&staging, self.out_dir.join("latest.json"))?;

        self.written += 1;
        Ok(())
    }
}

fn day_file(out_dir: &Path, day: NaiveDate) -> PathBuf {
    out_dir.join(format!("{FILE_PREFIX}{}{FILE_SUFFIX}", day.format("%Y-%m-%d")))
}

fn open_day_file(out_dir: &Path, day: NaiveDate) -> Result<BufWriter<File>> {
    let path = day_file(out_dir, day);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn file_day(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Removes snapshot files dated more than `retention_days` before `today`.
/// Anything not named like a snapshot file is left alone.
pub(crate) fn prune_expired(out_dir: &Path, retention_days: u64, today: NaiveDate) -> Result<usize> {
    let Some(cutoff) = today.checked_sub_days(Days::new(retention_days)) else {
        return Ok(0);
    };

    let mut removed = 0;
    for entry in fs::read_dir(out_dir)? {
        let path = entry?.path();
        if !file_day(&path).is_some_and(|day| day < cutoff) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) => warn!(path = %path.display(), error = %err, "could not prune snapshot file"),
        }
    }

    Ok(removed)
}

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hornetwatch_core::{FrameId, Pipeline};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const STDIN_BUFFER_LINES: usize = 256;

#[derive(Debug, Deserialize)]
pub struct EventLine {
    pub species: String,
    pub confidence: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub frame_id: Option<String>,
    #[serde(default)]
    pub image_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub lines: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub malformed: u64,
}

pub enum LineSource {
    File(Lines<BufReader<File>>),
    /// Filled by a detached reader thread so a pending stdin read never holds
    /// up runtime shutdown.
    Stdin(mpsc::Receiver<std::io::Result<String>>),
}

impl LineSource {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        match self {
            LineSource::File(lines) => lines.next_line().await,
            LineSource::Stdin(rx) => rx.recv().await.transpose(),
        }
    }
}

pub async fn open_input(input: &str) -> Result<LineSource> {
    if input == "-" {
        return Ok(LineSource::Stdin(spawn_stdin_reader()));
    }
    let file = File::open(input)
        .await
        .with_context(|| format!("failed to open input {input}"))?;
    Ok(LineSource::File(BufReader::new(file).lines()))
}

fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(STDIN_BUFFER_LINES);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn ingest_input(input: &str, pipeline: &Pipeline) -> Result<IngestSummary> {
    let source = open_input(input).await?;
    ingest_source(source, pipeline).await
}

pub async fn ingest_source(mut source: LineSource, pipeline: &Pipeline) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    while let Some(line) = source.next_line().await? {
        ingest_line(&line, pipeline, &mut summary).await;
    }
    Ok(summary)
}

pub fn spawn_ingest(input: String, pipeline: Arc<Pipeline>) -> JoinHandle<Result<IngestSummary>> {
    tokio::spawn(async move { ingest_input(&input, &pipeline).await })
}

async fn ingest_line(line: &str, pipeline: &Pipeline, summary: &mut IngestSummary) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }
    summary.lines += 1;

    let record: EventLine = match serde_json::from_str(line) {
        Ok(record) => record,
        Err(err) => {
            summary.malformed += 1;
            warn!(line = summary.lines, error = %err, "skipping malformed event line");
            return;
        }
    };

    let image = match &record.image_path {
        Some(path) => read_image(path).await,
        None => None,
    };
    let frame_id = record
        .frame_id
        .map(FrameId::from)
        .or_else(|| image.as_ref().and(record.image_path.as_deref()).and_then(frame_id_from_path));
    let timestamp = record.timestamp.unwrap_or_else(Utc::now);

    match pipeline.ingest_raw(&record.species, record.confidence, timestamp, frame_id, image) {
        Ok(outcome) => {
            summary.accepted += 1;
            debug!(line = summary.lines, logged = outcome.logged, alert = ?outcome.alert, "event ingested");
        }
        Err(_) => summary.rejected += 1,
    }
}

async fn read_image(path: &Path) -> Option<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not read detection image");
            None
        }
    }
}

fn frame_id_from_path(path: &Path) -> Option<FrameId> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(FrameId::from)
}

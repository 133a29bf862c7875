use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use clap::{Parser, Subcommand, ValueEnum};
use hornetwatch_core::{
    AlertDispatcher, DispatchConfig, LogTransport, Pipeline, PipelineConfig, StatsSnapshot,
    SystemClock,
};
use tokio::time::{interval_at, timeout, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod exporter;
mod source;
mod viewer;
#[cfg(test)]
mod exporter_tests;

#[derive(Debug, Parser)]
#[command(name = "hornetwatchd")]
#[command(about = "Hornet detection pipeline: rolling stats, detection log, frame cache and alerts")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value_t = 0.8)]
    threshold: f64,

    #[arg(long, default_value_t = 300)]
    cooldown_secs: u64,

    #[arg(long, default_value_t = 0.09)]
    alert_cost: f64,

    #[arg(long, default_value_t = 20)]
    log_capacity: usize,

    #[arg(long, default_value_t = 20)]
    frame_capacity: usize,

    #[arg(long, default_value_t = 16)]
    alert_queue: usize,

    #[arg(long, default_value_t = 10_000)]
    send_timeout_ms: u64,

    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    utc_offset_minutes: i32,

    #[arg(long)]
    public_url: Option<String>,

    #[arg(long)]
    no_alerts: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    Replay {
        #[arg(long, default_value = "-")]
        input: String,
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
        #[arg(long)]
        frames_dir: Option<PathBuf>,
    },
    Run {
        #[arg(long, default_value = "-")]
        input: String,
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,
    },
    View {
        #[arg(long)]
        input: String,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    Export {
        #[arg(long, default_value = "-")]
        input: String,
        #[arg(long, default_value = "./data/snapshots")]
        output_dir: PathBuf,
        #[arg(long, default_value_t = 90)]
        retention_days: u64,
        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Ndjson,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    let bucket_offset = FixedOffset::east_opt(cli.utc_offset_minutes * 60)
        .with_context(|| format!("utc offset of {} minutes is out of range", cli.utc_offset_minutes))?;

    let config = PipelineConfig {
        detection_threshold: cli.threshold,
        alert_cooldown: Duration::from_secs(cli.cooldown_secs),
        alert_cost: cli.alert_cost,
        log_capacity: cli.log_capacity,
        frame_capacity: cli.frame_capacity,
        bucket_offset,
        public_url: cli.public_url.clone(),
    };

    let dispatch = DispatchConfig {
        queue_capacity: cli.alert_queue,
        send_timeout: Duration::from_millis(cli.send_timeout_ms),
    };

    let (alerts, worker) = if cli.no_alerts {
        (None, None)
    } else {
        let (sender, worker) = AlertDispatcher::spawn(Arc::new(LogTransport), &dispatch);
        (Some(sender), Some(worker))
    };

    let pipeline = Arc::new(Pipeline::new(config, Arc::new(SystemClock::new()), alerts)?);

    match cli.command {
        Command::Replay {
            input,
            format,
            frames_dir,
        } => {
            let summary = source::ingest_input(&input, &pipeline).await?;
            info!(lines = summary.lines, accepted = summary.accepted, rejected = summary.rejected, malformed = summary.malformed, "replay finished");
            print_snapshot(&pipeline.read_snapshot(), format)?;
            if let Some(dir) = frames_dir {
                dump_frames(&pipeline, &dir).await?;
            }
        }
        Command::Run {
            input,
            format,
            interval_ms,
        } => {
            stream_loop(Arc::clone(&pipeline), input, format, Duration::from_millis(interval_ms)).await?;
        }
        Command::View { input, interval_ms } => {
            viewer::run_viewer(Arc::clone(&pipeline), input, Duration::from_millis(interval_ms)).await?;
        }
        Command::Export {
            input,
            output_dir,
            retention_days,
            interval_ms,
        } => {
            exporter::run_exporter(
                Arc::clone(&pipeline),
                input,
                &output_dir,
                retention_days,
                Duration::from_millis(interval_ms),
            )
            .await?;
        }
    }

    // Dropping the last pipeline handle closes the alert queue so the worker can drain.
    drop(pipeline);
    if let Some(worker) = worker {
        match timeout(dispatch.send_timeout + Duration::from_secs(1), worker).await {
            Ok(Ok(stats)) => info!(delivered = stats.delivered, failed = stats.failed, dropped = stats.dropped, "alert worker stopped"),
            Ok(Err(err)) => warn!(error = %err, "alert worker panicked"),
            Err(_) => warn!("alert worker did not drain in time"),
        }
    }

    Ok(())
}

async fn stream_loop(
    pipeline: Arc<Pipeline>,
    input: String,
    format: OutputFormat,
    interval: Duration,
) -> Result<()> {
    let mut ingest = source::spawn_ingest(input, Arc::clone(&pipeline));
    let start = Instant::now() + Duration::from_millis(50);
    let mut ticker = interval_at(start, interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("received ctrl-c, stopping");
                ingest.abort();
                break;
            }
            done = &mut ingest => {
                let summary = done??;
                info!(accepted = summary.accepted, rejected = summary.rejected, malformed = summary.malformed, "input exhausted");
                print_snapshot(&pipeline.read_snapshot(), format)?;
                break;
            }
            _ = ticker.tick() => {
                let snapshot = pipeline.read_snapshot();
                print_snapshot(&snapshot, format)?;
                info!(total = snapshot.totals.total, alerts = snapshot.alert_stats.sent, "tick");
            }
        }
    }

    Ok(())
}

async fn dump_frames(pipeline: &Pipeline, dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;

    let frames = pipeline.frames();
    for info in &frames {
        let bytes = match pipeline.frame(&info.frame_id) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "frame evicted while dumping");
                continue;
            }
        };
        let name = sanitize_file_name(info.frame_id.as_str());
        tokio::fs::write(dir.join(format!("{name}.jpg")), &bytes[..]).await?;
    }

    tokio::fs::write(dir.join("frames.json"), serde_json::to_vec_pretty(&frames)?).await?;
    info!(count = frames.len(), dir = %dir.display(), "cached frames written");
    Ok(())
}

fn sanitize_file_name(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn print_snapshot(snapshot: &StatsSnapshot, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(snapshot)?);
        }
        OutputFormat::Ndjson => {
            println!("{}", serde_json::to_string(snapshot)?);
        }
        OutputFormat::Human => {
            let uptime_min = snapshot.uptime_ms / 60_000;
            println!("=== Hornet Snapshot ===");
            println!("Time:       {}", snapshot.ts.to_rfc3339());
            println!("Uptime:     {}h {:02}m", uptime_min / 60, uptime_min % 60);
            println!(
                "Detections: total={} velutina={} crabro={} rate={:.1}/h avg_confidence={}",
                snapshot.totals.total,
                snapshot.totals.velutina,
                snapshot.totals.crabro,
                snapshot.detection_rate,
                snapshot
                    .confidence_avg
                    .map(|c| format!("{:.1}%", c * 100.0))
                    .unwrap_or_else(|| "n/a".to_string())
            );

            for (species, ts) in &snapshot.last_detection {
                println!("Last seen:  {:<16} {}", species.label(), ts.format("%Y-%m-%d %H:%M:%S"));
            }

            let alerts = &snapshot.alert_stats;
            println!(
                "Alerts:     sent={} cost={:.2} suppressed_invalid={} suppressed_cooldown={}",
                alerts.sent, alerts.cost, alerts.suppressed_invalid, alerts.suppressed_cooldown
            );
            if let Some(delivery) = &snapshot.delivery {
                println!(
                    "Delivery:   queued={} delivered={} failed={} timed_out={} dropped={}",
                    delivery.queued, delivery.delivered, delivery.failed, delivery.timed_out, delivery.dropped
                );
            }
            println!(
                "Frames:     {}/{} cached, rejected events={}",
                snapshot.frames.cached, snapshot.frames.capacity, snapshot.rejected
            );

            let active: Vec<_> = snapshot.hourly_buckets.iter().filter(|b| b.total() > 0).collect();
            if !active.is_empty() {
                println!("Hourly:");
                for bucket in active {
                    println!(
                        "  {:02}:00  velutina={:<4} crabro={}",
                        bucket.hour_of_day, bucket.velutina_count, bucket.crabro_count
                    );
                }
            }

            if !snapshot.recent_log.is_empty() {
                println!("Recent:");
                for entry in &snapshot.recent_log {
                    let frame = match (&entry.frame_id, entry.frame_cached) {
                        (Some(id), true) => format!(" frame={id}"),
                        (Some(id), false) => format!(" frame={id} (evicted)"),
                        (None, _) => String::new(),
                    };
                    println!(
                        "  {}  {:<16} {:>5.1}%{}",
                        entry.timestamp.format("%H:%M:%S"),
                        entry.species.label(),
                        entry.confidence * 100.0,
                        frame
                    );
                }
            }
        }
    }

    Ok(())
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::alert::{AlertDecision, AlertPolicy, SuppressReason};
use crate::clock::Clock;
use crate::config::{ConfigError, PipelineConfig};
use crate::dispatch::{AlertSender, SubmitOutcome};
use crate::event::{DetectionEvent, FrameId, IngestError, Species};
use crate::frames::{FrameCache, FrameError, FrameInfo};
use crate::log::DetectionLog;
use crate::snapshot::{FrameSummary, StatsSnapshot};
use crate::stats::RollingStats;

#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    Disabled,
    Suppressed(SuppressReason),
    Queued,
    Dropped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub logged: bool,
    pub frame_cached: bool,
    pub alert: AlertOutcome,
}

struct PipelineState {
    stats: RollingStats,
    log: DetectionLog,
    frames: FrameCache,
    alerts: AlertPolicy,
    rejected: u64,
}

/// Every `ingest` runs its state changes inside a single critical section, so
/// a concurrent `read_snapshot` sees either all of an event or none of it. The
/// alert hand-off happens after the lock is released.
pub struct Pipeline {
    config: PipelineConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<PipelineState>,
    alerts: Option<AlertSender>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        clock: Arc<dyn Clock>,
        alerts: Option<AlertSender>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let state = PipelineState {
            stats: RollingStats::new(config.bucket_offset),
            log: DetectionLog::with_capacity(config.log_capacity),
            frames: FrameCache::with_capacity(config.frame_capacity),
            alerts: AlertPolicy::new(&config),
            rejected: 0,
        };

        Ok(Self {
            config,
            clock,
            state: Mutex::new(state),
            alerts,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ingest_raw(
        &self,
        species: &str,
        confidence: f64,
        timestamp: DateTime<Utc>,
        frame_id: Option<FrameId>,
        image: Option<Vec<u8>>,
    ) -> Result<IngestOutcome, IngestError> {
        let event = species
            .parse::<Species>()
            .and_then(|species| DetectionEvent::new(species, confidence, timestamp, frame_id));

        match event {
            Ok(event) => Ok(self.ingest(event, image)),
            Err(err) => {
                self.lock().rejected += 1;
                warn!(error = %err, "rejected detection event");
                Err(err)
            }
        }
    }

    pub fn ingest(&self, event: DetectionEvent, image: Option<Vec<u8>>) -> IngestOutcome {
        let now = self.clock.now();

        let (logged, frame_cached, decision) = {
            let mut state = self.lock();

            state.stats.record(&event, now);

            let appended = state.log.append(&event);
            if let Some(old_frame) = appended.evicted.as_ref().and_then(|e| e.frame_id.as_ref()) {
                state.frames.unlink(old_frame);
            }

            let mut frame_cached = false;
            if let Some(frame_id) = event.frame_id() {
                if let Some(bytes) = image {
                    frame_cached = state.frames.put(frame_id.clone(), bytes, now).inserted;
                }
                if frame_cached {
                    // Entries logged before the bytes arrived, or before an eviction, still count.
                    let references = state.log.references(frame_id);
                    state.frames.set_links(frame_id, references);
                } else if appended.created {
                    state.frames.link(frame_id);
                }
            }

            let decision = self
                .alerts
                .is_some()
                .then(|| state.alerts.evaluate(&event, now));

            (appended.created, frame_cached, decision)
        };

        let alert = match (decision, self.alerts.as_ref()) {
            (Some(AlertDecision::Fire(request)), Some(sender)) => match sender.submit(request) {
                SubmitOutcome::Queued => AlertOutcome::Queued,
                SubmitOutcome::Dropped | SubmitOutcome::Closed => AlertOutcome::Dropped,
            },
            (Some(AlertDecision::Suppressed(reason)), _) => AlertOutcome::Suppressed(reason),
            _ => AlertOutcome::Disabled,
        };

        debug!(
            species = %event.species(),
            confidence = event.confidence(),
            logged,
            frame_cached,
            alert = ?alert,
            "ingested detection"
        );

        IngestOutcome {
            logged,
            frame_cached,
            alert,
        }
    }

    pub fn read_snapshot(&self) -> StatsSnapshot {
        let now = self.clock.now();
        let uptime_ms = self.clock.monotonic().as_millis();

        let mut snapshot = {
            let state = self.lock();
            let recent_log = state
                .log
                .entries()
                .map(|entry| {
                    let mut entry = entry.clone();
                    entry.frame_cached = entry
                        .frame_id
                        .as_ref()
                        .is_some_and(|id| state.frames.contains(id));
                    entry
                })
                .collect();

            StatsSnapshot {
                ts: now,
                uptime_ms,
                totals: state.stats.totals(),
                last_detection: state.stats.last_detection().clone(),
                confidence_avg: state.stats.confidence_avg(),
                detection_rate: detection_rate(state.stats.totals().total, uptime_ms),
                hourly_buckets: state.stats.hourly(now),
                recent_log,
                frames: FrameSummary {
                    cached: state.frames.len(),
                    capacity: state.frames.capacity(),
                },
                alert_stats: state.alerts.stats(),
                delivery: None,
                rejected: state.rejected,
            }
        };

        snapshot.delivery = self.alerts.as_ref().map(AlertSender::stats);
        snapshot
    }

    pub fn frame(&self, id: &FrameId) -> Result<Arc<[u8]>, FrameError> {
        self.lock().frames.get(id)
    }

    pub fn frames(&self) -> Vec<FrameInfo> {
        self.lock().frames.frames()
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn detection_rate(total: u64, uptime_ms: u128) -> f64 {
    if uptime_ms == 0 {
        return 0.0;
    }
    let hours = uptime_ms as f64 / 3_600_000.0;
    (total as f64 / hours * 10.0).round() / 10.0
}

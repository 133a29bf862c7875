use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::event::{DetectionEvent, FrameId, Species};
use crate::snapshot::AlertStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Critical,
    Informational,
}

impl Species {
    pub fn urgency(self) -> Urgency {
        match self {
            Species::AsianHornet => Urgency::Critical,
            Species::EuropeanHornet => Urgency::Informational,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub species: Species,
    pub urgency: Urgency,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub frame_id: Option<FrameId>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SuppressReason {
    Invalid { confidence: f64, threshold: f64 },
    Cooldown { remaining: Duration },
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressReason::Invalid { .. } => f.write_str("invalid"),
            SuppressReason::Cooldown { .. } => f.write_str("cooldown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    Suppressed(SuppressReason),
    Fire(AlertRequest),
}

/// Per-species rate limiting for outbound notifications.
///
/// Each event is placed at its timestamp, clamped to the clock's `now` so a
/// future stamp cannot push the cooldown ahead. Two alerts of one species are
/// never placed closer than the cooldown, in either direction.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    threshold: f64,
    cooldown: TimeDelta,
    cost_per_alert: f64,
    offset: FixedOffset,
    public_url: Option<String>,
    last_sent: BTreeMap<Species, DateTime<Utc>>,
    sent: u64,
    cost: f64,
    suppressed_invalid: u64,
    suppressed_cooldown: u64,
}

impl AlertPolicy {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            threshold: config.detection_threshold,
            cooldown: TimeDelta::from_std(config.alert_cooldown).unwrap_or(TimeDelta::MAX),
            cost_per_alert: config.alert_cost,
            offset: config.bucket_offset,
            public_url: config.public_url.clone(),
            last_sent: BTreeMap::new(),
            sent: 0,
            cost: 0.0,
            suppressed_invalid: 0,
            suppressed_cooldown: 0,
        }
    }

    pub fn evaluate(&mut self, event: &DetectionEvent, now: DateTime<Utc>) -> AlertDecision {
        if event.confidence() < self.threshold {
            self.suppressed_invalid += 1;
            return AlertDecision::Suppressed(SuppressReason::Invalid {
                confidence: event.confidence(),
                threshold: self.threshold,
            });
        }

        let species = event.species();
        let at = event.timestamp().min(now);
        if at < event.timestamp() {
            debug!(%species, ts = %event.timestamp(), %now, "future-stamped detection, cooldown uses clock time");
        }

        if let Some(last) = self.last_sent.get(&species) {
            let since = at - *last;
            if since.abs() < self.cooldown {
                self.suppressed_cooldown += 1;
                let remaining = (self.cooldown - since.abs()).to_std().unwrap_or_default();
                debug!(%species, remaining_s = remaining.as_secs(), "alert suppressed by cooldown");
                return AlertDecision::Suppressed(SuppressReason::Cooldown { remaining });
            }
        }

        // Recorded before the hand-off: a failing transport still consumes the slot.
        let last = self.last_sent.entry(species).or_insert(at);
        *last = (*last).max(at);
        self.sent += 1;
        self.cost += self.cost_per_alert;

        let request = AlertRequest {
            species,
            urgency: species.urgency(),
            timestamp: event.timestamp(),
            confidence: event.confidence(),
            frame_id: event.frame_id().cloned(),
            message: self.render_message(event),
        };
        info!(%species, urgency = ?request.urgency, sent = self.sent, "alert fired");

        AlertDecision::Fire(request)
    }

    pub fn last_sent_at(&self, species: Species) -> Option<DateTime<Utc>> {
        self.last_sent.get(&species).copied()
    }

    pub fn stats(&self) -> AlertStats {
        AlertStats {
            sent: self.sent,
            cost: self.cost,
            last_sent: self.last_sent.clone(),
            suppressed_invalid: self.suppressed_invalid,
            suppressed_cooldown: self.suppressed_cooldown,
        }
    }

    fn render_message(&self, event: &DetectionEvent) -> String {
        let species = event.species();
        let prefix = match species.urgency() {
            Urgency::Critical => "ALERT",
            Urgency::Informational => "Info",
        };
        let time = event.timestamp().with_timezone(&self.offset).format("%H:%M");

        let mut message = format!(
            "{prefix}: {} detected at {time} ({:.1}% confidence)",
            species.label(),
            event.confidence() * 100.0
        );

        if let (Some(base), Some(frame_id)) = (self.public_url.as_deref(), event.frame_id()) {
            message.push_str(&format!(". View: {}/frame/{frame_id}", base.trim_end_matches('/')));
        }

        message
    }
}

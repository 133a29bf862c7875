use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{FrameId, Species};

/// Point-in-time copy of the pipeline state; holds nothing from the live store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub ts: DateTime<Utc>,
    pub uptime_ms: u128,
    pub totals: Totals,
    pub last_detection: BTreeMap<Species, DateTime<Utc>>,
    pub confidence_avg: Option<f64>,
    /// Detections per hour of uptime, one decimal.
    #[serde(default)]
    pub detection_rate: f64,
    pub hourly_buckets: Vec<HourlyBucket>,
    pub recent_log: Vec<LogEntry>,
    pub frames: FrameSummary,
    pub alert_stats: AlertStats,
    pub delivery: Option<DeliveryStats>,
    pub rejected: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub velutina: u64,
    pub crabro: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyBucket {
    pub hour_of_day: u8,
    pub velutina_count: u64,
    pub crabro_count: u64,
}

impl HourlyBucket {
    pub fn total(&self) -> u64 {
        self.velutina_count + self.crabro_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub species: Species,
    pub confidence: f64,
    pub frame_id: Option<FrameId>,
    #[serde(default)]
    pub frame_cached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub cached: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStats {
    pub sent: u64,
    pub cost: f64,
    pub last_sent: BTreeMap<Species, DateTime<Utc>>,
    pub suppressed_invalid: u64,
    pub suppressed_cooldown: u64,
}

/// Outcome counters for the notification worker. These trail [`AlertStats`]:
/// an alert counts as sent the moment it fires, delivery is reconciled later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub queued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub dropped: u64,
    pub reported_cost: f64,
}

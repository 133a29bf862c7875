use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, Timelike, Utc};
use tracing::debug;

use crate::event::{DetectionEvent, Species};
use crate::snapshot::{HourlyBucket, Totals};

const FUTURE_SKEW_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Copy, Default)]
struct HourSlot {
    /// Calendar day of the last write; a write on any other day resets the slot.
    day: Option<NaiveDate>,
    velutina: u64,
    crabro: u64,
}

impl HourSlot {
    fn bump(&mut self, species: Species) {
        match species {
            Species::AsianHornet => self.velutina += 1,
            Species::EuropeanHornet => self.crabro += 1,
        }
    }
}

/// Lifetime counters plus a 24-slot hour-of-day histogram.
#[derive(Debug, Clone)]
pub struct RollingStats {
    offset: FixedOffset,
    velutina: u64,
    crabro: u64,
    confidence_sum: f64,
    last_seen: Option<DateTime<Utc>>,
    last_detection: BTreeMap<Species, DateTime<Utc>>,
    slots: [HourSlot; 24],
}

impl RollingStats {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            velutina: 0,
            crabro: 0,
            confidence_sum: 0.0,
            last_seen: None,
            last_detection: BTreeMap::new(),
            slots: [HourSlot::default(); 24],
        }
    }

    /// Future-stamped events (beyond a small skew past `now`) only reach the
    /// lifetime counters, so they cannot freeze the histogram.
    pub fn record(&mut self, event: &DetectionEvent, now: DateTime<Utc>) {
        let species = event.species();
        let ts = event.timestamp();

        match species {
            Species::AsianHornet => self.velutina += 1,
            Species::EuropeanHornet => self.crabro += 1,
        }
        self.confidence_sum += event.confidence();
        self.last_detection
            .entry(species)
            .and_modify(|last| {
                if ts > *last {
                    *last = ts;
                }
            })
            .or_insert(ts);

        if ts > now + TimeDelta::seconds(FUTURE_SKEW_SECS) {
            debug!(%ts, %now, "future-stamped detection, hourly buckets left untouched");
            return;
        }
        if self.last_seen.is_some_and(|seen| ts < seen) {
            debug!(%ts, "out-of-order detection, hourly buckets left untouched");
            return;
        }
        self.last_seen = Some(ts);

        let local = ts.with_timezone(&self.offset);
        let day = local.date_naive();
        let slot = &mut self.slots[local.hour() as usize];
        if slot.day != Some(day) {
            *slot = HourSlot {
                day: Some(day),
                ..HourSlot::default()
            };
        }
        slot.bump(species);
    }

    pub fn totals(&self) -> Totals {
        Totals {
            velutina: self.velutina,
            crabro: self.crabro,
            total: self.velutina + self.crabro,
        }
    }

    pub fn count(&self, species: Species) -> u64 {
        match species {
            Species::AsianHornet => self.velutina,
            Species::EuropeanHornet => self.crabro,
        }
    }

    pub fn confidence_avg(&self) -> Option<f64> {
        let total = self.velutina + self.crabro;
        (total > 0).then(|| self.confidence_sum / total as f64)
    }

    pub fn last_detection(&self) -> &BTreeMap<Species, DateTime<Utc>> {
        &self.last_detection
    }

    /// The trailing 24 hours ending at `now`'s hour, oldest first.
    ///
    /// A slot only contributes when the day it was written on is the day that
    /// hour denotes inside the window; older writes read as zero.
    pub fn hourly(&self, now: DateTime<Utc>) -> Vec<HourlyBucket> {
        let local_now = now.with_timezone(&self.offset);
        let current_hour = local_now.hour();
        let today = local_now.date_naive();

        (1..=24)
            .map(|step| {
                let hour = (current_hour + step) % 24;
                let expected_day = if hour <= current_hour {
                    Some(today)
                } else {
                    today.pred_opt()
                };
                let slot = self.slots[hour as usize];
                let live = slot.day.is_some() && slot.day == expected_day;

                HourlyBucket {
                    hour_of_day: hour as u8,
                    velutina_count: if live { slot.velutina } else { 0 },
                    crabro_count: if live { slot.crabro } else { 0 },
                }
            })
            .collect()
    }
}

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::event::{DedupKey, DetectionEvent, FrameId};
use crate::snapshot::LogEntry;

#[derive(Debug, Clone, PartialEq)]
pub struct Appended {
    pub created: bool,
    pub evicted: Option<LogEntry>,
}

/// Bounded, newest-first history of detections, deduplicated on
/// `(timestamp, species, frame_id)` across the entries it currently holds.
#[derive(Debug, Clone)]
pub struct DetectionLog {
    capacity: usize,
    entries: VecDeque<LogEntry>,
    keys: HashSet<DedupKey>,
}

impl DetectionLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity + 1),
            keys: HashSet::with_capacity(capacity + 1),
        }
    }

    pub fn append(&mut self, event: &DetectionEvent) -> Appended {
        if !self.keys.insert(event.dedup_key()) {
            debug!(species = %event.species(), ts = %event.timestamp(), "duplicate detection, log unchanged");
            return Appended {
                created: false,
                evicted: None,
            };
        }

        self.entries.push_front(LogEntry {
            timestamp: event.timestamp(),
            species: event.species(),
            confidence: event.confidence(),
            frame_id: event.frame_id().cloned(),
            frame_cached: false,
        });

        let evicted = if self.entries.len() > self.capacity {
            self.entries.pop_back().inspect(|old| {
                self.keys
                    .remove(&(old.timestamp, old.species, old.frame_id.clone()));
            })
        } else {
            None
        };

        Appended {
            created: true,
            evicted,
        }
    }

    pub fn references(&self, frame_id: &FrameId) -> u32 {
        self.entries
            .iter()
            .filter(|entry| entry.frame_id.as_ref() == Some(frame_id))
            .count() as u32
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

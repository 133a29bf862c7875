use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::event::FrameId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame {0} not found")]
    NotFound(FrameId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePut {
    pub inserted: bool,
    pub evicted: Option<FrameId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub frame_id: FrameId,
    pub size_bytes: usize,
    pub inserted_at: DateTime<Utc>,
    /// Number of log entries currently pointing at this frame.
    pub linked: u32,
}

#[derive(Debug, Clone)]
struct CachedFrame {
    bytes: Arc<[u8]>,
    inserted_at: DateTime<Utc>,
    links: u32,
}

/// FIFO frame store. Eviction follows insertion order only; reads never reorder.
#[derive(Debug, Clone)]
pub struct FrameCache {
    capacity: usize,
    order: VecDeque<FrameId>,
    frames: HashMap<FrameId, CachedFrame>,
}

impl FrameCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::with_capacity(capacity + 1),
            frames: HashMap::with_capacity(capacity + 1),
        }
    }

    pub fn put(&mut self, id: FrameId, bytes: Vec<u8>, inserted_at: DateTime<Utc>) -> FramePut {
        if self.frames.contains_key(&id) {
            return FramePut {
                inserted: false,
                evicted: None,
            };
        }

        self.frames.insert(
            id.clone(),
            CachedFrame {
                bytes: bytes.into(),
                inserted_at,
                links: 0,
            },
        );
        self.order.push_back(id);

        let mut evicted = None;
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                if let Some(frame) = self.frames.remove(&oldest) {
                    debug!(frame_id = %oldest, links = frame.links, "evicted cached frame");
                }
                evicted = Some(oldest);
            }
        }

        FramePut {
            inserted: true,
            evicted,
        }
    }

    pub fn get(&self, id: &FrameId) -> Result<Arc<[u8]>, FrameError> {
        self.frames
            .get(id)
            .map(|frame| Arc::clone(&frame.bytes))
            .ok_or_else(|| FrameError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &FrameId) -> bool {
        self.frames.contains_key(id)
    }

    pub fn link(&mut self, id: &FrameId) {
        if let Some(frame) = self.frames.get_mut(id) {
            frame.links += 1;
        }
    }

    pub fn set_links(&mut self, id: &FrameId, links: u32) {
        if let Some(frame) = self.frames.get_mut(id) {
            frame.links = links;
        }
    }

    pub fn unlink(&mut self, id: &FrameId) {
        if let Some(frame) = self.frames.get_mut(id) {
            frame.links = frame.links.saturating_sub(1);
        }
    }

    pub fn frames(&self) -> Vec<FrameInfo> {
        self.order
            .iter()
            .filter_map(|id| {
                self.frames.get(id).map(|frame| FrameInfo {
                    frame_id: id.clone(),
                    size_bytes: frame.bytes.len(),
                    inserted_at: frame.inserted_at,
                    linked: frame.links,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

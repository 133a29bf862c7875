use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("detection threshold must be within 0.0..=1.0, got {0}")]
    Threshold(f64),
    #[error("{0} capacity must be at least 1")]
    Capacity(&'static str),
    #[error("alert cost must be a non-negative number, got {0}")]
    Cost(f64),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub detection_threshold: f64,
    pub alert_cooldown: Duration,
    pub alert_cost: f64,
    pub log_capacity: usize,
    pub frame_capacity: usize,
    /// Offset used to derive hour-of-day and calendar day for the hourly buckets.
    pub bucket_offset: FixedOffset,
    pub public_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 0.8,
            alert_cooldown: Duration::from_secs(5 * 60),
            alert_cost: 0.09,
            log_capacity: 20,
            frame_capacity: 20,
            bucket_offset: Utc.fix(),
            public_url: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return Err(ConfigError::Threshold(self.detection_threshold));
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::Capacity("log"));
        }
        if self.frame_capacity == 0 {
            return Err(ConfigError::Capacity("frame cache"));
        }
        if !self.alert_cost.is_finite() || self.alert_cost < 0.0 {
            return Err(ConfigError::Cost(self.alert_cost));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub queue_capacity: usize,
    pub send_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            send_timeout: Duration::from_secs(10),
        }
    }
}

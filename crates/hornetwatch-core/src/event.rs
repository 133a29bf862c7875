use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("confidence {0} is outside 0.0..=1.0")]
    InvalidConfidence(f64),
    #[error("unknown species: {0}")]
    UnknownSpecies(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    #[serde(alias = "velutina")]
    AsianHornet,
    #[serde(alias = "crabro")]
    EuropeanHornet,
}

impl Species {
    pub const ALL: [Species; 2] = [Species::AsianHornet, Species::EuropeanHornet];

    pub fn label(self) -> &'static str {
        match self {
            Species::AsianHornet => "Asian Hornet",
            Species::EuropeanHornet => "European Hornet",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Species::AsianHornet => "velutina",
            Species::EuropeanHornet => "crabro",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Species {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asian_hornet" | "velutina" => Ok(Species::AsianHornet),
            "european_hornet" | "crabro" => Ok(Species::EuropeanHornet),
            _ => Err(IngestError::UnknownSpecies(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(String);

impl FrameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FrameId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

pub type DedupKey = (DateTime<Utc>, Species, Option<FrameId>);

/// One classified observation. Only constructible through [`DetectionEvent::new`],
/// so every instance carries an in-range confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionEvent {
    species: Species,
    confidence: f64,
    timestamp: DateTime<Utc>,
    frame_id: Option<FrameId>,
}

impl DetectionEvent {
    pub fn new(
        species: Species,
        confidence: f64,
        timestamp: DateTime<Utc>,
        frame_id: Option<FrameId>,
    ) -> Result<Self, IngestError> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(IngestError::InvalidConfidence(confidence));
        }

        Ok(Self {
            species,
            confidence,
            timestamp,
            frame_id,
        })
    }

    pub fn species(&self) -> Species {
        self.species
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn frame_id(&self) -> Option<&FrameId> {
        self.frame_id.as_ref()
    }

    pub fn dedup_key(&self) -> DedupKey {
        (self.timestamp, self.species, self.frame_id.clone())
    }
}

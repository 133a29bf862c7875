pub mod alert;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod frames;
pub mod log;
pub mod pipeline;
pub mod snapshot;
pub mod stats;

#[cfg(test)]
mod alert_tests;
#[cfg(test)]
mod dispatch_tests;

pub use alert::{AlertDecision, AlertPolicy, AlertRequest, SuppressReason, Urgency};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, DispatchConfig, PipelineConfig};
pub use dispatch::{
    AlertDispatcher, AlertSender, AlertWorker, Delivery, LogTransport, NotificationTransport,
    SubmitOutcome, TransportError,
};
pub use event::{DetectionEvent, FrameId, IngestError, Species};
pub use frames::{FrameCache, FrameError, FrameInfo};
pub use log::DetectionLog;
pub use pipeline::{AlertOutcome, IngestOutcome, Pipeline};
pub use snapshot::{
    AlertStats, DeliveryStats, FrameSummary, HourlyBucket, LogEntry, StatsSnapshot, Totals,
};
pub use stats::RollingStats;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::alert::AlertRequest;
use crate::config::DispatchConfig;
use crate::snapshot::DeliveryStats;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("delivery rejected: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delivery {
    pub cost: Option<f64>,
}

#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, request: &AlertRequest) -> Result<Delivery, TransportError>;
}

#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, request: &AlertRequest) -> Result<Delivery, TransportError> {
        info!(species = %request.species, urgency = ?request.urgency, message = %request.message, "notification");
        Ok(Delivery::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    Dropped,
    Closed,
}

#[derive(Debug, Clone)]
pub struct AlertSender {
    tx: mpsc::Sender<AlertRequest>,
    stats: Arc<Mutex<DeliveryStats>>,
}

impl AlertSender {
    pub fn submit(&self, request: AlertRequest) -> SubmitOutcome {
        let outcome = match self.tx.try_send(request) {
            Ok(()) => SubmitOutcome::Queued,
            Err(TrySendError::Full(dropped)) => {
                warn!(species = %dropped.species, ts = %dropped.timestamp, "alert queue full, dropping newest alert");
                SubmitOutcome::Dropped
            }
            Err(TrySendError::Closed(dropped)) => {
                warn!(species = %dropped.species, "alert worker stopped, alert discarded");
                SubmitOutcome::Closed
            }
        };

        let mut stats = lock(&self.stats);
        match outcome {
            SubmitOutcome::Queued => stats.queued += 1,
            SubmitOutcome::Dropped | SubmitOutcome::Closed => stats.dropped += 1,
        }
        outcome
    }

    pub fn stats(&self) -> DeliveryStats {
        lock(&self.stats).clone()
    }
}

pub struct AlertWorker {
    transport: Arc<dyn NotificationTransport>,
    rx: mpsc::Receiver<AlertRequest>,
    stats: Arc<Mutex<DeliveryStats>>,
    send_timeout: Duration,
}

impl AlertWorker {
    pub async fn run(mut self) -> DeliveryStats {
        while let Some(request) = self.rx.recv().await {
            self.deliver(request).await;
        }
        debug!("alert queue closed, worker exiting");
        lock(&self.stats).clone()
    }

    async fn deliver(&self, request: AlertRequest) {
        let started = Instant::now();
        let result = timeout(self.send_timeout, self.transport.send(&request)).await;
        let elapsed_ms = started.elapsed().as_millis();

        let mut stats = lock(&self.stats);
        match result {
            Ok(Ok(delivery)) => {
                stats.delivered += 1;
                if let Some(cost) = delivery.cost {
                    stats.reported_cost += cost;
                }
                info!(species = %request.species, elapsed_ms, "alert delivered");
            }
            Ok(Err(err)) => {
                stats.failed += 1;
                warn!(species = %request.species, elapsed_ms, error = %err, "alert delivery failed");
            }
            Err(_) => {
                stats.failed += 1;
                stats.timed_out += 1;
                warn!(species = %request.species, timeout_ms = self.send_timeout.as_millis(), "alert delivery timed out");
            }
        }
    }
}

pub struct AlertDispatcher;

impl AlertDispatcher {
    pub fn channel(
        transport: Arc<dyn NotificationTransport>,
        config: &DispatchConfig,
    ) -> (AlertSender, AlertWorker) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(Mutex::new(DeliveryStats::default()));

        let sender = AlertSender {
            tx,
            stats: Arc::clone(&stats),
        };
        let worker = AlertWorker {
            transport,
            rx,
            stats,
            send_timeout: config.send_timeout,
        };
        (sender, worker)
    }

    /// Builds the queue and runs the worker on the current tokio runtime.
    /// The worker exits once every [`AlertSender`] is dropped and the queue is empty.
    pub fn spawn(
        transport: Arc<dyn NotificationTransport>,
        config: &DispatchConfig,
    ) -> (AlertSender, JoinHandle<DeliveryStats>) {
        let (sender, worker) = Self::channel(transport, config);
        (sender, tokio::spawn(worker.run()))
    }
}

fn lock(stats: &Mutex<DeliveryStats>) -> std::sync::MutexGuard<'_, DeliveryStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

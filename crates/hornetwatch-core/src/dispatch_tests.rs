use crate::alert::{AlertRequest, Urgency};
use crate::config::DispatchConfig;
use crate::dispatch::{
    AlertDispatcher, Delivery, NotificationTransport, SubmitOutcome, TransportError,
};
use crate::event::Species;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every request and answers with a fixed result after an optional delay.
pub(crate) struct ScriptedTransport {
    pub(crate) sent: Mutex<Vec<AlertRequest>>,
    delay: Duration,
    fail: bool,
    cost: Option<f64>,
}

impl ScriptedTransport {
    pub(crate) fn ok(cost: Option<f64>) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            fail: false,
            cost,
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            fail: true,
            cost: None,
        })
    }

    pub(crate) fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            delay,
            fail: false,
            cost: None,
        })
    }

    pub(crate) fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.sent
            .lock()
            .expect("transport lock")
            .iter()
            .map(|r| r.timestamp)
            .collect()
    }
}

#[async_trait]
impl NotificationTransport for ScriptedTransport {
    async fn send(&self, request: &AlertRequest) -> Result<Delivery, TransportError> {
        self.sent.lock().expect("transport lock").push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(TransportError::Unavailable("gateway down".to_string()));
        }
        Ok(Delivery { cost: self.cost })
    }
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 2, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn request(seq: i64) -> AlertRequest {
    AlertRequest {
        species: Species::AsianHornet,
        urgency: Urgency::Critical,
        timestamp: base() + ChronoDuration::minutes(seq),
        confidence: 0.9,
        frame_id: None,
        message: format!("alert {seq}"),
    }
}

#[tokio::test]
async fn full_queue_drops_newest_request() {
    // Arrange
    let transport = ScriptedTransport::ok(None);
    let config = DispatchConfig {
        queue_capacity: 2,
        ..DispatchConfig::default()
    };
    let (sender, worker) = AlertDispatcher::channel(transport.clone(), &config);

    // Act
    let outcomes: Vec<_> = (0..3).map(|seq| sender.submit(request(seq))).collect();
    let stats = sender.stats();
    drop(sender);
    worker.run().await;

    // Assert
    assert_eq!(
        outcomes,
        vec![SubmitOutcome::Queued, SubmitOutcome::Queued, SubmitOutcome::Dropped]
    );
    assert_eq!(stats.queued, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(transport.timestamps(), vec![request(0).timestamp, request(1).timestamp]);
}

#[tokio::test]
async fn delivery_reconciles_reported_cost() {
    // Arrange
    let transport = ScriptedTransport::ok(Some(0.07));
    let (sender, worker) = AlertDispatcher::channel(transport, &DispatchConfig::default());

    // Act
    sender.submit(request(0));
    sender.submit(request(1));
    drop(sender);
    let stats = worker.run().await;

    // Assert
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.failed, 0);
    assert!((stats.reported_cost - 0.14).abs() < 1e-9);
}

#[tokio::test]
async fn transport_failure_is_counted_not_raised() {
    // Arrange
    let (sender, worker) = AlertDispatcher::channel(ScriptedTransport::failing(), &DispatchConfig::default());

    // Act
    sender.submit(request(0));
    drop(sender);
    let stats = worker.run().await;

    // Assert
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.delivered, 0);
}

#[tokio::test]
async fn slow_transport_hits_send_timeout() {
    // Arrange
    let config = DispatchConfig {
        queue_capacity: 4,
        send_timeout: Duration::from_millis(20),
    };
    let (sender, worker) =
        AlertDispatcher::channel(ScriptedTransport::slow(Duration::from_secs(5)), &config);

    // Act
    sender.submit(request(0));
    drop(sender);
    let stats = worker.run().await;

    // Assert
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.failed, 1);
}

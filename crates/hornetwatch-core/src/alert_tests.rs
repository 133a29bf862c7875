use crate::alert::{AlertDecision, AlertPolicy, SuppressReason, Urgency};
use crate::config::PipelineConfig;
use crate::event::{DetectionEvent, FrameId, Species};
use chrono::{DateTime, Duration, TimeZone, Utc};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 14, 14, 5, 0)
        .single()
        .expect("valid timestamp")
}

fn now() -> DateTime<Utc> {
    base() + Duration::hours(1)
}

fn event(species: Species, confidence: f64, ts: DateTime<Utc>) -> DetectionEvent {
    DetectionEvent::new(species, confidence, ts, None).expect("valid event")
}

fn fired(policy: &mut AlertPolicy, events: &[DetectionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(policy.evaluate(e, now()), AlertDecision::Fire(_)))
        .count()
}

#[test]
fn cooldown_allows_one_alert_per_window() {
    // Arrange
    let mut close = AlertPolicy::new(&PipelineConfig::default());
    let mut spaced = AlertPolicy::new(&PipelineConfig::default());

    // Act
    let close_count = fired(
        &mut close,
        &[
            event(Species::AsianHornet, 0.9, base()),
            event(Species::AsianHornet, 0.9, base() + Duration::minutes(1)),
        ],
    );
    let spaced_count = fired(
        &mut spaced,
        &[
            event(Species::AsianHornet, 0.9, base()),
            event(Species::AsianHornet, 0.9, base() + Duration::minutes(6)),
        ],
    );

    // Assert
    assert_eq!(close_count, 1);
    assert_eq!(spaced_count, 2);
    assert_eq!(close.stats().suppressed_cooldown, 1);
}

#[test]
fn cooldown_reports_remaining_time() {
    // Arrange
    let mut policy = AlertPolicy::new(&PipelineConfig::default());
    policy.evaluate(&event(Species::AsianHornet, 0.9, base()), now());

    // Act
    let decision = policy.evaluate(&event(Species::AsianHornet, 0.9, base() + Duration::minutes(2)), now());

    // Assert
    assert_eq!(
        decision,
        AlertDecision::Suppressed(SuppressReason::Cooldown {
            remaining: std::time::Duration::from_secs(180)
        })
    );
}

#[test]
fn low_confidence_never_fires() {
    // Arrange
    let mut policy = AlertPolicy::new(&PipelineConfig::default());

    // Act
    let decisions: Vec<_> = Species::ALL
        .iter()
        .map(|species| policy.evaluate(&event(*species, 0.5, base()), now()))
        .collect();

    // Assert
    for decision in decisions {
        match decision {
            AlertDecision::Suppressed(reason) => assert_eq!(reason.to_string(), "invalid"),
            AlertDecision::Fire(_) => panic!("low confidence must not alert"),
        }
    }
    assert_eq!(policy.stats().sent, 0);
    assert_eq!(policy.last_sent_at(Species::AsianHornet), None);
}

#[test]
fn species_have_independent_cooldowns() {
    // Arrange
    let mut policy = AlertPolicy::new(&PipelineConfig::default());

    // Act
    let count = fired(
        &mut policy,
        &[
            event(Species::AsianHornet, 0.9, base()),
            event(Species::EuropeanHornet, 0.9, base() + Duration::seconds(10)),
        ],
    );

    // Assert
    assert_eq!(count, 2);
}

#[test]
fn earlier_timestamp_within_window_is_suppressed() {
    // Arrange
    let mut policy = AlertPolicy::new(&PipelineConfig::default());
    policy.evaluate(&event(Species::AsianHornet, 0.9, base()), now());

    // Act
    let close = policy.evaluate(&event(Species::AsianHornet, 0.9, base() - Duration::minutes(2)), now());
    let far = policy.evaluate(&event(Species::AsianHornet, 0.9, base() - Duration::minutes(30)), now());

    // Assert
    assert!(matches!(
        close,
        AlertDecision::Suppressed(SuppressReason::Cooldown { .. })
    ));
    assert!(matches!(far, AlertDecision::Fire(_)));
    assert_eq!(policy.last_sent_at(Species::AsianHornet), Some(base()));
}

#[test]
fn future_timestamp_does_not_block_later_alerts() {
    // Arrange
    let mut policy = AlertPolicy::new(&PipelineConfig::default());
    let clock_now = base();
    let first = policy.evaluate(&event(Species::AsianHornet, 0.9, base() + Duration::days(365)), clock_now);

    // Act
    let later: Vec<_> = [10, 20, 30]
        .iter()
        .map(|min| {
            let ts = base() + Duration::minutes(*min);
            policy.evaluate(&event(Species::AsianHornet, 0.9, ts), ts)
        })
        .collect();

    // Assert
    assert!(matches!(first, AlertDecision::Fire(_)));
    assert!(later.iter().all(|d| matches!(d, AlertDecision::Fire(_))));
    assert_eq!(policy.stats().sent, 4);
    assert_eq!(
        policy.last_sent_at(Species::AsianHornet),
        Some(base() + Duration::minutes(30))
    );
}

#[test]
fn fire_counts_cost_and_renders_message() {
    // Arrange
    let config = PipelineConfig {
        alert_cost: 0.25,
        public_url: Some("https://hive.example/".to_string()),
        ..PipelineConfig::default()
    };
    let mut policy = AlertPolicy::new(&config);
    let asian = DetectionEvent::new(Species::AsianHornet, 0.93, base(), Some(FrameId::from("42_140500")))
        .expect("valid event");
    let european = event(Species::EuropeanHornet, 0.81, base());

    // Act
    let first = policy.evaluate(&asian, now());
    let second = policy.evaluate(&european, now());

    // Assert
    let AlertDecision::Fire(critical) = first else {
        panic!("expected asian hornet alert");
    };
    assert_eq!(critical.urgency, Urgency::Critical);
    assert_eq!(
        critical.message,
        "ALERT: Asian Hornet detected at 14:05 (93.0% confidence). View: https://hive.example/frame/42_140500"
    );
    let AlertDecision::Fire(info) = second else {
        panic!("expected european hornet alert");
    };
    assert_eq!(info.urgency, Urgency::Informational);
    assert!(info.message.starts_with("Info: European Hornet"));

    let stats = policy.stats();
    assert_eq!(stats.sent, 2);
    assert!((stats.cost - 0.5).abs() < 1e-9);
    assert_eq!(stats.last_sent.get(&Species::AsianHornet), Some(&base()));
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use domain::broker::{ConnectionState, MessagePublisher, PublishOutcome, QueueTransport};
use domain::health::ErrorTracker;
use domain::message::{MessageType, QueueEnvelope, TagReading, TransportMessage};
use domain::tag::{TagQuality, TagValue};
use infrastructure::config::{BrokerConfig, OverflowPolicy};
use infrastructure::messaging::{BufferedQueuePublisher, InMemoryQueue};
use tokio_util::sync::CancellationToken;

const QUEUE: &str = "telemetry:equipment:oven1";

fn message(value: f64) -> TransportMessage {
    TransportMessage {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        equipment_id: "oven1".to_string(),
        site: "plant-a".to_string(),
        product_type: "panels".to_string(),
        line_number: 1,
        message_type: MessageType::DataUpdate,
        state: Some("RUNNING".to_string()),
        tags: vec![TagReading::new(
            "temperature",
            TagValue::Real(value),
            TagQuality::Good,
        )],
    }
}

fn config(capacity: usize, policy: OverflowPolicy) -> BrokerConfig {
    BrokerConfig {
        buffer_capacity: capacity,
        overflow_policy: policy,
        reconnect_initial_delay_ms: 100,
        reconnect_max_delay_ms: 1_000,
        ..BrokerConfig::default()
    }
}

fn values(queue: &InMemoryQueue) -> Vec<f64> {
    queue
        .contents(QUEUE)
        .iter()
        .map(|raw| {
            let envelope: QueueEnvelope = serde_json::from_str(raw).unwrap();
            envelope.message.tags[0].value.as_f64()
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_offline_buffering_and_recovery() -> Result<()> {
    let queue = Arc::new(InMemoryQueue::new());
    let transport: Arc<dyn QueueTransport> = queue.clone();
    let publisher = BufferedQueuePublisher::new(
        transport,
        &config(100, OverflowPolicy::DropOldest),
        3,
        Arc::new(ErrorTracker::new()),
    );
    assert!(publisher.connect().await);
    let cancel = CancellationToken::new();
    let flusher = publisher.start_flusher(cancel.clone());

    // Scenario 1: Online
    let outcome = publisher.publish(message(10.0)).await?;
    assert_eq!(outcome, PublishOutcome::Delivered);
    assert_eq!(values(&queue), vec![10.0]);

    // Scenario 2: Go offline
    queue.set_online(false);
    let outcome = publisher.publish(message(20.0)).await?;
    assert_eq!(outcome, PublishOutcome::Buffered { depth: 1, evicted: 0 });
    publisher.publish(message(30.0)).await?;
    assert_eq!(publisher.buffer_depth(), 2);
    assert_eq!(values(&queue), vec![10.0], "Should NOT publish when offline");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_ne!(publisher.connection_state(), ConnectionState::Connected);

    // Scenario 3: Recovery, backlog flushed in order
    queue.set_online(true);
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(publisher.buffer_depth(), 0, "Buffer should be empty after flush");
    assert_eq!(values(&queue), vec![10.0, 20.0, 30.0]);
    assert_eq!(publisher.connection_state(), ConnectionState::Connected);

    let snapshot = publisher.snapshot();
    assert_eq!(snapshot.published, 3);
    assert_eq!(snapshot.buffered, 2);
    assert_eq!(snapshot.dropped, 0);

    cancel.cancel();
    flusher.await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_drop_oldest_overflow_is_counted() -> Result<()> {
    let queue = Arc::new(InMemoryQueue::new());
    queue.set_online(false);
    let publisher = BufferedQueuePublisher::new(
        queue.clone(),
        &config(2, OverflowPolicy::DropOldest),
        3,
        Arc::new(ErrorTracker::new()),
    );

    publisher.publish(message(1.0)).await?;
    publisher.publish(message(2.0)).await?;
    let outcome = publisher.publish(message(3.0)).await?;
    assert_eq!(outcome, PublishOutcome::Buffered { depth: 2, evicted: 1 });
    assert_eq!(outcome.dropped(), 1);
    assert_eq!(publisher.snapshot().dropped, 1);

    queue.set_online(true);
    assert_eq!(publisher.drain(Duration::from_secs(1)).await, 0);
    assert_eq!(values(&queue), vec![2.0, 3.0]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reject_newest_overflow() -> Result<()> {
    let queue = Arc::new(InMemoryQueue::new());
    queue.set_online(false);
    let publisher = BufferedQueuePublisher::new(
        queue.clone(),
        &config(1, OverflowPolicy::RejectNewest),
        3,
        Arc::new(ErrorTracker::new()),
    );

    publisher.publish(message(1.0)).await?;
    let outcome = publisher.publish(message(2.0)).await?;
    assert_eq!(outcome, PublishOutcome::Rejected { depth: 1 });

    queue.set_online(true);
    publisher.drain(Duration::from_secs(1)).await;
    assert_eq!(values(&queue), vec![1.0]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_drain_abandons_backlog_after_grace() -> Result<()> {
    let queue = Arc::new(InMemoryQueue::new());
    queue.set_online(false);
    let errors = Arc::new(ErrorTracker::new());
    let publisher = BufferedQueuePublisher::new(
        queue.clone(),
        &config(10, OverflowPolicy::DropOldest),
        3,
        errors,
    );

    publisher.publish(message(1.0)).await?;
    publisher.publish(message(2.0)).await?;

    let abandoned = publisher.drain(Duration::from_millis(500)).await;
    assert_eq!(abandoned, 2);
    assert_eq!(publisher.connection_state(), ConnectionState::Failed);
    Ok(())
}

#[tokio::test]
async fn test_envelope_carries_priority_and_retry_budget() -> Result<()> {
    let queue = Arc::new(InMemoryQueue::new());
    let publisher = BufferedQueuePublisher::new(
        queue.clone(),
        &BrokerConfig::default(),
        5,
        Arc::new(ErrorTracker::new()),
    );
    publisher.connect().await;

    let mut alarm = message(400.0);
    alarm.message_type = MessageType::Alarm;
    publisher.publish(alarm).await?;

    let raw = queue.contents(QUEUE).pop().unwrap();
    let envelope: QueueEnvelope = serde_json::from_str(&raw)?;
    assert_eq!(envelope.priority, 1);
    assert_eq!(envelope.max_retries, 5);
    assert_eq!(envelope.retry_count, 0);
    Ok(())
}

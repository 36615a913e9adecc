use std::sync::Arc;
use std::time::Duration;

use application::consumer::{ConsumerSettings, QueueConsumer};
use application::writer::TimeSeriesWriter;
use chrono::Utc;
use domain::broker::{MessagePublisher, QueueTransport};
use domain::health::ErrorTracker;
use domain::message::{DeadLetterEntry, MessageType, TagReading, TransportMessage};
use domain::{ErrorClass, SinkWriteError, TagQuality, TagValue};
use infrastructure::config::{BrokerConfig, ConsumerConfig, WriterConfig};
use infrastructure::{BufferedQueuePublisher, InMemoryQueue, InMemorySink};
use tokio_util::sync::CancellationToken;

const PREFIX: &str = "telemetry:equipment:";
const DLQ: &str = "telemetry:dead-letter";

struct Harness {
    queue: Arc<InMemoryQueue>,
    sink: Arc<InMemorySink>,
    consumer: QueueConsumer,
    errors: Arc<ErrorTracker>,
}

fn harness(consumer: ConsumerConfig) -> Harness {
    let queue = Arc::new(InMemoryQueue::new());
    let sink = Arc::new(InMemorySink::new());
    let errors = Arc::new(ErrorTracker::new());
    let writer_config = WriterConfig {
        batch_size: 500,
        flush_interval_ms: 50,
        retry_attempts: 0,
        ..WriterConfig::default()
    };
    let (writer, _task) =
        TimeSeriesWriter::spawn(sink.clone(), writer_config, CancellationToken::new());
    let settings = ConsumerSettings {
        consumer,
        queue_prefix: PREFIX.to_string(),
        dead_letter_queue: DLQ.to_string(),
        measurement: "equipment_telemetry".to_string(),
    };
    let consumer = QueueConsumer::new(queue.clone(), writer, settings, errors.clone());
    Harness {
        queue,
        sink,
        consumer,
        errors,
    }
}

fn fast_consumer() -> ConsumerConfig {
    ConsumerConfig {
        concurrency: 1,
        batch_size: 10,
        poll_interval_ms: 10,
        max_retries: 3,
        ..ConsumerConfig::default()
    }
}

fn message(equipment_id: &str, n: usize) -> TransportMessage {
    TransportMessage {
        id: format!("msg-{n}"),
        timestamp: Utc::now(),
        equipment_id: equipment_id.to_string(),
        site: "plant-a".to_string(),
        product_type: "panels".to_string(),
        line_number: 1,
        message_type: MessageType::DataUpdate,
        state: Some("RUNNING".to_string()),
        tags: vec![
            TagReading::new("temperature", TagValue::Real(350.0 + n as f64), TagQuality::Good),
            TagReading::new("running", TagValue::Bool(true), TagQuality::Good),
        ],
    }
}

fn dead_letters(queue: &InMemoryQueue) -> Vec<DeadLetterEntry> {
    queue
        .contents(DLQ)
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap())
        .collect()
}

/// Advances paused time until `done` holds or the budget runs out
async fn wait_until<F: Fn() -> bool>(done: F) {
    for _ in 0..400 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_hundred_published_messages_reach_the_sink() {
    let h = harness(fast_consumer());
    let publisher = BufferedQueuePublisher::new(
        h.queue.clone(),
        &BrokerConfig::default(),
        3,
        h.errors.clone(),
    );
    assert!(publisher.connect().await);
    h.consumer.ensure_queues(["oven1"]).await;

    for n in 0..100 {
        publisher.publish(message("oven1", n)).await.unwrap();
    }

    let sink = h.sink.clone();
    wait_until(|| sink.record_count() == 200).await;

    assert_eq!(h.sink.record_count(), 200);
    assert!(h.queue.contents(DLQ).is_empty());
    let snapshot = h.consumer.snapshot().await;
    assert_eq!(snapshot.delivered, 100);
    assert_eq!(snapshot.records_written, 200);
    assert_eq!(snapshot.dead_lettered, 0);
    assert_eq!(snapshot.queues.get("telemetry:equipment:oven1"), Some(&0));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_json_is_dead_lettered_once() {
    let h = harness(fast_consumer());
    h.queue
        .push("telemetry:equipment:oven1", "{ not json".to_string())
        .await
        .unwrap();
    h.consumer.ensure_queues(["oven1"]).await;

    let queue = h.queue.clone();
    wait_until(|| !queue.contents(DLQ).is_empty()).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let entries = dead_letters(&h.queue);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].original_queue, "telemetry:equipment:oven1");
    assert_eq!(entries[0].error_class, ErrorClass::Validation);
    assert_eq!(entries[0].message, serde_json::json!("{ not json"));
    assert!(h.sink.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_equipment_id_dead_lettered_without_retry() {
    let h = harness(fast_consumer());
    let mut payload = serde_json::to_value(message("oven1", 1)).unwrap();
    payload.as_object_mut().unwrap().remove("equipmentId");
    h.queue
        .push("telemetry:equipment:oven1", payload.to_string())
        .await
        .unwrap();
    h.consumer.ensure_queues(["oven1"]).await;

    let queue = h.queue.clone();
    wait_until(|| !queue.contents(DLQ).is_empty()).await;

    let entries = dead_letters(&h.queue);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].retry_count, 0);
    assert_eq!(entries[0].error_class, ErrorClass::Validation);
    assert!(entries[0].error.contains("equipmentId"));
    assert_eq!(h.consumer.snapshot().await.retried, 0);
    assert_eq!(h.errors.snapshot().count(ErrorClass::Validation), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_back_off_then_dead_letter() {
    let h = harness(ConsumerConfig {
        max_retries: 3,
        initial_delay_ms: 1_000,
        backoff_multiplier: 2.0,
        max_delay_ms: 30_000,
        ..fast_consumer()
    });
    h.sink
        .fail_always(Some(SinkWriteError::Transient("HTTP 503".to_string())));
    h.queue
        .push(
            "telemetry:equipment:oven1",
            serde_json::to_string(&message("oven1", 1)).unwrap(),
        )
        .await
        .unwrap();
    h.consumer.ensure_queues(["oven1"]).await;

    let queue = h.queue.clone();
    wait_until(|| !queue.contents(DLQ).is_empty()).await;

    let attempts = h.sink.attempts();
    assert_eq!(attempts.len(), 4, "first attempt plus three retries");
    let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps.windows(2).all(|g| g[1] > g[0]), "gaps {gaps:?}");
    assert!(gaps[0] >= Duration::from_millis(1_000));

    let entries = dead_letters(&h.queue);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].retry_count, 3);
    assert_eq!(entries[0].error_class, ErrorClass::SinkTransient);
    assert!(entries[0].error.contains("HTTP 503"));

    let snapshot = h.consumer.snapshot().await;
    assert_eq!(snapshot.retried, 3);
    assert_eq!(snapshot.dead_lettered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_skips_retries() {
    let h = harness(fast_consumer());
    h.sink
        .fail_always(Some(SinkWriteError::Permanent("HTTP 400".to_string())));
    h.queue
        .push(
            "telemetry:equipment:oven1",
            serde_json::to_string(&message("oven1", 1)).unwrap(),
        )
        .await
        .unwrap();
    h.consumer.ensure_queues(["oven1"]).await;

    let queue = h.queue.clone();
    wait_until(|| !queue.contents(DLQ).is_empty()).await;

    let entries = dead_letters(&h.queue);
    assert_eq!(entries[0].retry_count, 0);
    assert_eq!(entries[0].error_class, ErrorClass::SinkPermanent);
    assert_eq!(h.sink.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_pushes_pending_retries_back() {
    let h = harness(ConsumerConfig {
        initial_delay_ms: 10_000,
        ..fast_consumer()
    });
    h.sink
        .fail_always(Some(SinkWriteError::Transient("HTTP 503".to_string())));
    h.queue
        .push(
            "telemetry:equipment:oven1",
            serde_json::to_string(&message("oven1", 1)).unwrap(),
        )
        .await
        .unwrap();
    h.consumer.ensure_queues(["oven1"]).await;

    let sink = h.sink.clone();
    wait_until(|| !sink.attempts().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = tokio::time::Instant::now();
    h.consumer.shutdown(Duration::from_secs(1)).await;
    assert!(started.elapsed() < Duration::from_secs(10));

    let requeued = h.queue.contents("telemetry:equipment:oven1");
    assert_eq!(requeued.len(), 1);
    assert!(requeued[0].contains("\"retryCount\":1"));
    assert!(h.queue.contents(DLQ).is_empty());
}

#[tokio::test]
async fn test_ensure_queues_is_idempotent() {
    let h = harness(fast_consumer());

    assert_eq!(h.consumer.ensure_queues(["oven1"]).await, 1);
    assert_eq!(h.consumer.ensure_queues(["oven1", "press1"]).await, 1);
    assert_eq!(
        h.consumer.queues().await,
        vec![
            "telemetry:equipment:oven1".to_string(),
            "telemetry:equipment:press1".to_string()
        ]
    );

    h.consumer.shutdown(Duration::from_secs(1)).await;
    assert_eq!(h.consumer.ensure_queues(["mixer1"]).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_envelope_does_not_sink_its_batch_neighbours() {
    let h = harness(fast_consumer());
    h.sink.reject_equipment(
        "press1",
        SinkWriteError::Permanent("HTTP 422: field type conflict".to_string()),
    );
    for equipment_id in ["oven1", "press1"] {
        h.queue
            .push(
                &format!("{PREFIX}{equipment_id}"),
                serde_json::to_string(&message(equipment_id, 1)).unwrap(),
            )
            .await
            .unwrap();
    }
    h.consumer.ensure_queues(["oven1", "press1"]).await;

    let queue = h.queue.clone();
    let sink = h.sink.clone();
    wait_until(|| !queue.contents(DLQ).is_empty() && sink.record_count() == 2).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let entries = dead_letters(&h.queue);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].original_queue, "telemetry:equipment:press1");
    assert_eq!(entries[0].error_class, ErrorClass::SinkPermanent);

    let records = h.sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.tags["equipment_id"] == "oven1"));

    let snapshot = h.consumer.snapshot().await;
    assert_eq!(snapshot.delivered, 1);
    assert_eq!(snapshot.dead_lettered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_worker_keeps_one_envelope_in_flight() {
    let h = harness(fast_consumer());
    for n in 0..5 {
        h.queue
            .push(
                "telemetry:equipment:oven1",
                serde_json::to_string(&message("oven1", n)).unwrap(),
            )
            .await
            .unwrap();
    }
    h.consumer.ensure_queues(["oven1"]).await;

    let sink = h.sink.clone();
    wait_until(|| sink.record_count() == 10).await;

    // The writer would take up to 500 records per flush; each one carries a single envelope
    assert_eq!(h.sink.batch_sizes(), vec![2; 5]);
    assert_eq!(h.consumer.snapshot().await.delivered, 5);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_returns_envelope_stuck_in_slow_sink() {
    let h = harness(fast_consumer());
    h.sink.set_delay(Duration::from_secs(8));
    let payload = serde_json::to_string(&message("oven1", 1)).unwrap();
    h.queue
        .push("telemetry:equipment:oven1", payload.clone())
        .await
        .unwrap();
    h.consumer.ensure_queues(["oven1"]).await;

    let sink = h.sink.clone();
    wait_until(|| !sink.attempts().is_empty()).await;

    let started = tokio::time::Instant::now();
    h.consumer.shutdown(Duration::from_secs(5)).await;
    assert!(started.elapsed() < Duration::from_secs(8));

    assert_eq!(h.queue.contents("telemetry:equipment:oven1"), vec![payload]);
    assert!(h.queue.contents(DLQ).is_empty());
    let snapshot = h.consumer.snapshot().await;
    assert_eq!(snapshot.returned, 1);
    assert_eq!(snapshot.delivered, 0);
    assert_eq!(snapshot.dead_lettered, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retired_queue_drains_then_stops() {
    let h = harness(fast_consumer());
    h.consumer.ensure_queues(["oven1", "press1"]).await;
    assert_eq!(h.consumer.running_workers().await, 2);

    h.queue
        .push(
            "telemetry:equipment:press1",
            serde_json::to_string(&message("press1", 1)).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(h.consumer.retire_missing(["oven1"]).await, 1);
    assert_eq!(
        h.consumer.queues().await,
        vec!["telemetry:equipment:oven1".to_string()]
    );

    let sink = h.sink.clone();
    wait_until(|| sink.record_count() == 2).await;
    for _ in 0..100 {
        if h.consumer.running_workers().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(h.consumer.running_workers().await, 1);

    // Nobody consumes the retired queue any more
    h.queue
        .push(
            "telemetry:equipment:press1",
            serde_json::to_string(&message("press1", 2)).unwrap(),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.queue.contents("telemetry:equipment:press1").len(), 1);
    assert_eq!(h.sink.record_count(), 2);
}

//! End-to-end pipeline behavior over the in-memory broker and store.

use axum::http::StatusCode;
use axum_test::TestServer;
use rask_log_pipeline::broadcast::Broadcaster;
use rask_log_pipeline::domain::{LogLevel, LogRecord, StoredRecord};
use rask_log_pipeline::ingest::{self, IngestState};
use rask_log_pipeline::parser::ParserRegistry;
use rask_log_pipeline::port::{ReadCursor, ReadRequest, StreamBroker};
use rask_log_pipeline::queue::{BatchOutcome, ConsumerError, ConsumerSettings, QueueConsumer, QueueProducer};
use rask_log_pipeline::test_support::{InMemoryBroker, InMemoryStore};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn settings(name: &str) -> ConsumerSettings {
    ConsumerSettings {
        block: Duration::from_millis(1),
        idle_sleep: Duration::from_millis(1),
        retry_backoff: Duration::from_millis(1),
        ..ConsumerSettings::new(name)
    }
}

fn record(message: &str) -> LogRecord {
    LogRecord::new(
        chrono::Utc::now(),
        LogLevel::Info,
        "web-01",
        "shop",
        message,
    )
}

async fn enqueue(producer: &QueueProducer, messages: &[&str]) {
    let records: Vec<LogRecord> = messages.iter().map(|m| record(m)).collect();
    producer.enqueue_batch(&records).await.unwrap();
}

/// Drain pending recovery, then read whatever is new.
async fn process_new(consumer: &QueueConsumer) -> BatchOutcome {
    loop {
        match consumer.process_batch().await.unwrap() {
            BatchOutcome::Empty => continue,
            outcome => return outcome,
        }
    }
}

#[tokio::test]
async fn test_ingested_record_reaches_store_and_live_subscribers() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = InMemoryStore::new();
    let broadcaster = Broadcaster::new(broker.clone(), "new_logs", 16);
    let mut subscription = broadcaster.connect();

    let state = Arc::new(IngestState {
        registry: Arc::new(ParserRegistry::with_builtins()),
        producer: Arc::new(QueueProducer::new(broker.clone(), "logs")),
        broadcaster: broadcaster.clone(),
        max_batch: 100,
    });
    let server = TestServer::new(ingest::router(state)).unwrap();

    let consumer = QueueConsumer::new(broker.clone(), store.clone(), settings("worker-1"));
    consumer.setup().await.unwrap();

    // Let the broadcaster's listener subscribe before anything is published.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = server
        .post("/logs")
        .json(&json!({
            "timestamp": "2025-11-11T16:00:00Z",
            "level": "ERROR",
            "source": "web-01",
            "application": "shop",
            "message": "payment declined",
            "metadata": {"order": 42}
        }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);

    let outcome = process_new(&consumer).await;
    assert!(matches!(outcome, BatchOutcome::Completed { persisted: 1, .. }));

    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].record.message, "payment declined");
    assert_eq!(rows[0].record.level, LogLevel::Error);

    let pushed = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
        .await
        .unwrap()
        .unwrap();
    let pushed: StoredRecord = serde_json::from_str(&pushed).unwrap();
    assert_eq!(pushed.id, rows[0].id);
    assert_eq!(pushed.record.metadata["order"], Value::from(42));
}

#[tokio::test]
async fn test_failed_batch_is_neither_persisted_nor_acknowledged() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = InMemoryStore::new();
    let producer = QueueProducer::new(broker.clone(), "logs");
    let consumer = QueueConsumer::new(broker.clone(), store.clone(), settings("worker-1"));
    consumer.setup().await.unwrap();
    enqueue(&producer, &["a", "b", "c"]).await;

    store.fail_on_row(Some(1));
    assert_eq!(consumer.process_batch().await.unwrap(), BatchOutcome::Empty);
    let result = consumer.process_batch().await;

    assert!(matches!(result, Err(ConsumerError::Persist(_))));
    assert!(store.rows().is_empty());
    assert_eq!(store.committed_batches(), 0);
    assert_eq!(broker.pending_count("logs", "log-processors").await.unwrap(), 3);
    assert_eq!(consumer.stats().processed, 0);
}

#[tokio::test]
async fn test_failed_batch_is_retried_from_pending_entries() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = InMemoryStore::new();
    let producer = QueueProducer::new(broker.clone(), "logs");
    let consumer = QueueConsumer::new(broker.clone(), store.clone(), settings("worker-1"));
    consumer.setup().await.unwrap();
    enqueue(&producer, &["a", "b", "c"]).await;

    store.fail_on_row(Some(2));
    assert!(process_batch_err(&consumer).await);
    store.fail_on_row(None);

    let outcome = consumer.process_batch().await.unwrap();

    assert!(matches!(
        outcome,
        BatchOutcome::Completed { persisted: 3, acknowledged: 3, .. }
    ));
    let messages: Vec<String> = store.rows().into_iter().map(|r| r.record.message).collect();
    assert_eq!(messages, vec!["a", "b", "c"]);
    assert_eq!(broker.pending_count("logs", "log-processors").await.unwrap(), 0);
}

async fn process_batch_err(consumer: &QueueConsumer) -> bool {
    for _ in 0..3 {
        if consumer.process_batch().await.is_err() {
            return true;
        }
    }
    false
}

#[tokio::test]
async fn test_relaunched_consumer_recovers_unacknowledged_entries() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = InMemoryStore::new();
    let producer = QueueProducer::new(broker.clone(), "logs");
    broker.ensure_group("logs", "log-processors").await.unwrap();
    enqueue(&producer, &["in-flight-1", "in-flight-2"]).await;

    // A worker read the entries and crashed before acknowledging them.
    let delivered = broker
        .read_group(&ReadRequest {
            stream: "logs".to_string(),
            group: "log-processors".to_string(),
            consumer: "worker-2".to_string(),
            count: 10,
            block: Duration::from_millis(1),
            cursor: ReadCursor::New,
        })
        .await
        .unwrap();
    assert_eq!(delivered.len(), 2);

    let relaunched = QueueConsumer::new(broker.clone(), store.clone(), settings("worker-2"));
    relaunched.setup().await.unwrap();
    let outcome = relaunched.process_batch().await.unwrap();

    assert!(matches!(outcome, BatchOutcome::Completed { persisted: 2, .. }));
    assert_eq!(store.rows().len(), 2);
    assert_eq!(broker.pending_count("logs", "log-processors").await.unwrap(), 0);
}

#[tokio::test]
async fn test_consumers_in_one_group_share_the_stream() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = InMemoryStore::new();
    let producer = QueueProducer::new(broker.clone(), "logs");

    let mut first = settings("worker-1");
    first.batch_size = 2;
    let mut second = settings("worker-2");
    second.batch_size = 2;
    let first = QueueConsumer::new(broker.clone(), store.clone(), first);
    let second = QueueConsumer::new(broker.clone(), store.clone(), second);
    first.setup().await.unwrap();
    second.setup().await.unwrap();
    enqueue(&producer, &["1", "2", "3", "4"]).await;

    process_new(&first).await;
    process_new(&second).await;

    assert_eq!(first.stats().processed, 2);
    assert_eq!(second.stats().processed, 2);
    let mut messages: Vec<String> = store.rows().into_iter().map(|r| r.record.message).collect();
    messages.sort();
    assert_eq!(messages, vec!["1", "2", "3", "4"]);
}

#[tokio::test]
async fn test_consumer_waits_out_broker_outage() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = InMemoryStore::new();
    let producer = QueueProducer::new(broker.clone(), "logs");
    enqueue(&producer, &["queued before outage"]).await;
    broker.set_unavailable(true);

    let consumer = Arc::new(QueueConsumer::new(broker.clone(), store.clone(), settings("worker-1")));
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let consumer = consumer.clone();
        let shutdown = shutdown.clone();
        async move { consumer.run(shutdown).await }
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(store.rows().is_empty());
    broker.set_unavailable(false);

    for _ in 0..200 {
        if !store.rows().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    shutdown.cancel();
    let stats = handle.await.unwrap().unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(store.rows()[0].record.message, "queued before outage");
}

#[tokio::test]
async fn test_stream_info_reports_entry_ids() {
    let broker = Arc::new(InMemoryBroker::new());
    let producer = QueueProducer::new(broker.clone(), "logs");

    assert_eq!(producer.stream_info().await.unwrap().length, 0);

    let first = producer.enqueue(&record("first")).await.unwrap();
    let last = producer.enqueue(&record("last")).await.unwrap();
    let info = producer.stream_info().await.unwrap();

    assert_eq!(info.length, 2);
    assert_eq!(info.first_entry_id, Some(first));
    assert_eq!(info.last_entry_id, Some(last));
    assert_eq!(producer.messages_sent(), 2);
}

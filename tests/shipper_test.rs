use rask_log_pipeline::broadcast::Broadcaster;
use rask_log_pipeline::domain::{LogLevel, LogRecord};
use rask_log_pipeline::ingest::{self, IngestState};
use rask_log_pipeline::parser::ParserRegistry;
use rask_log_pipeline::queue::QueueProducer;
use rask_log_pipeline::shipper::{
    BatchTransport, HttpBatchTransport, HttpTransportSettings, Shipper, ShipperSettings,
    ShipperStatsSnapshot, TransportError,
};
use rask_log_pipeline::test_support::InMemoryBroker;
use serde_json::{Value, json};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport_for(api_url: String) -> HttpBatchTransport {
    HttpBatchTransport::new(HttpTransportSettings {
        api_url,
        timeout: Duration::from_secs(2),
        max_retries: 1,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        ..HttpTransportSettings::default()
    })
    .unwrap()
}

fn line(n: usize) -> String {
    format!("2025-11-11T16:00:{n:02}Z [ERROR] web-{n}:checkout - failure number {n}\n")
}

fn settings(dir: &TempDir) -> ShipperSettings {
    ShipperSettings {
        batch_size: 2,
        batch_timeout: Duration::from_millis(50),
        save_interval: 1,
        poll_interval: Duration::from_millis(5),
        ..ShipperSettings::new(dir.path().join("app.log"))
    }
}

async fn run_until<F>(shipper: Arc<Shipper>, done: F) -> ShipperStatsSnapshot
where
    F: Fn(&ShipperStatsSnapshot) -> bool,
{
    let shutdown = CancellationToken::new();
    let task = tokio::spawn({
        let shipper = shipper.clone();
        let shutdown = shutdown.clone();
        async move { shipper.run(shutdown).await }
    });
    for _ in 0..400 {
        if done(&shipper.stats()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    shutdown.cancel();
    task.await.unwrap().unwrap()
}

#[tokio::test]
async fn test_http_transport_posts_to_batch_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs/batch"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "status": "queued",
            "count": 2,
            "message": "2 logs queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(format!("{}/logs/", server.uri()));
    let records = vec![
        LogRecord::new(chrono::Utc::now(), LogLevel::Info, "a", "app", "one"),
        LogRecord::new(chrono::Utc::now(), LogLevel::Warn, "b", "app", "two"),
    ];

    let accepted = transport.send_batch(&records).await.unwrap();

    assert_eq!(accepted, 2);
    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[1]["level"], "WARN");
}

#[tokio::test]
async fn test_http_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs/batch"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(format!("{}/logs", server.uri()));
    let records = vec![LogRecord::new(
        chrono::Utc::now(),
        LogLevel::Info,
        "a",
        "app",
        "one",
    )];

    let result = transport.send_batch(&records).await;

    assert!(matches!(
        result,
        Err(TransportError::HttpError { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_refused_connection_is_retried_then_reported() {
    // Nothing listens on the port once the listener is dropped.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let transport = transport_for(format!("http://127.0.0.1:{port}/logs"));
    let records = vec![LogRecord::new(
        chrono::Utc::now(),
        LogLevel::Info,
        "a",
        "app",
        "one",
    )];

    let result = transport.send_batch(&records).await;

    assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
}

#[tokio::test]
async fn test_restart_resumes_from_saved_offset() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs/batch"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"count": 2})))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("app.log");
    std::fs::write(&log_path, (1..=2).map(line).collect::<String>()).unwrap();

    let transport = Arc::new(transport_for(format!("{}/logs", server.uri())));
    let first = Arc::new(Shipper::new(settings(&dir), transport.clone()));
    let stats = run_until(first, |s| s.lines_sent == 2).await;
    assert_eq!(stats.lines_sent, 2);

    let mut file = std::fs::OpenOptions::new().append(true).open(&log_path).unwrap();
    file.write_all((3..=4).map(line).collect::<String>().as_bytes())
        .unwrap();
    drop(file);

    let second = Arc::new(Shipper::new(settings(&dir), transport));
    let stats = run_until(second, |s| s.lines_sent == 2).await;
    assert_eq!(stats.lines_processed, 2);

    let requests = server.received_requests().await.unwrap();
    let messages: Vec<String> = requests
        .iter()
        .flat_map(|r| serde_json::from_slice::<Vec<Value>>(&r.body).unwrap())
        .map(|record| record["message"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        messages,
        vec![
            "failure number 1",
            "failure number 2",
            "failure number 3",
            "failure number 4"
        ]
    );
}

#[tokio::test]
async fn test_shipped_lines_are_queued_by_ingestion_endpoint() {
    let broker = Arc::new(InMemoryBroker::new());
    let state = Arc::new(IngestState {
        registry: Arc::new(ParserRegistry::with_builtins()),
        producer: Arc::new(QueueProducer::new(broker.clone(), "logs")),
        broadcaster: Broadcaster::new(broker.clone(), "new_logs", 16),
        max_batch: 100,
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, ingest::router(state)).await;
    });

    let dir = TempDir::new().unwrap();
    let content = format!("{}not a shipper line\n{}{}", line(1), line(2), line(3));
    std::fs::write(dir.path().join("app.log"), content).unwrap();

    let transport = Arc::new(transport_for(format!("http://{address}/logs")));
    let shipper = Arc::new(Shipper::new(settings(&dir), transport));
    let stats = run_until(shipper, |s| s.lines_sent == 3).await;

    assert_eq!(stats.lines_sent, 3);
    assert_eq!(stats.lines_skipped, 1);
    assert_eq!(broker.stream_len("logs"), 3);
}

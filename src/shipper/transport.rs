//! Delivery of shipper batches to the ingestion entry point.

use crate::domain::LogRecord;
use crate::port::PortFuture;
use rand::Rng;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout: {0}")]
    RequestTimeout(String),

    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Sends one batch and reports how many records the receiver accepted.
pub trait BatchTransport: Send + Sync {
    fn send_batch<'a>(&'a self, records: &'a [LogRecord]) -> PortFuture<'a, Result<usize, TransportError>>;
}

#[derive(Debug, Clone)]
pub struct HttpTransportSettings {
    /// Ingestion base URL, e.g. `http://localhost:5000/logs`.
    pub api_url: String,
    pub timeout: Duration,
    pub max_idle_per_host: usize,
    /// Retries after the first attempt, on connection errors and timeouts only.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for HttpTransportSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000/logs".to_string(),
            timeout: Duration::from_secs(10),
            max_idle_per_host: 10,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BatchAccepted {
    count: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct HttpBatchTransport {
    client: Client,
    batch_url: Url,
    settings: HttpTransportSettings,
}

impl HttpBatchTransport {
    pub fn new(settings: HttpTransportSettings) -> Result<Self, TransportError> {
        let batch_url = batch_url(&settings.api_url)?;
        let client = ClientBuilder::new()
            .timeout(settings.timeout)
            .pool_max_idle_per_host(settings.max_idle_per_host)
            .user_agent(concat!("rask-log-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            batch_url,
            settings,
        })
    }

    pub fn batch_url(&self) -> &Url {
        &self.batch_url
    }

    /// Exponential backoff with ±50% jitter, capped at `max_delay`.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .settings
            .base_delay
            .saturating_mul(2_u32.saturating_pow(attempt));
        let capped = exponential.min(self.settings.max_delay);
        let jitter = rand::rng().random_range(0.5..1.5);
        capped.mul_f64(jitter)
    }

    async fn post_once(&self, records: &[LogRecord]) -> Result<usize, TransportError> {
        let response = self
            .client
            .post(self.batch_url.clone())
            .json(records)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::HttpError {
                status: status.as_u16(),
                message,
            });
        }

        let accepted = response
            .json::<BatchAccepted>()
            .await
            .ok()
            .and_then(|body| body.count)
            .unwrap_or(records.len());
        Ok(accepted)
    }
}

/// `<api_url without trailing slash>/batch`.
fn batch_url(api_url: &str) -> Result<Url, TransportError> {
    let joined = format!("{}/batch", api_url.trim_end_matches('/'));
    Url::parse(&joined)
        .map_err(|e| TransportError::InvalidConfiguration(format!("Invalid API URL {api_url}: {e}")))
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::RequestTimeout(error.to_string())
    } else if error.is_connect() {
        TransportError::ConnectionFailed(error.to_string())
    } else {
        TransportError::NetworkError(error)
    }
}

fn is_retryable(error: &TransportError) -> bool {
    matches!(
        error,
        TransportError::ConnectionFailed(_) | TransportError::RequestTimeout(_)
    )
}

impl BatchTransport for HttpBatchTransport {
    fn send_batch<'a>(&'a self, records: &'a [LogRecord]) -> PortFuture<'a, Result<usize, TransportError>> {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                match self.post_once(records).await {
                    Ok(count) => {
                        debug!("Delivered batch of {} records", count);
                        return Ok(count);
                    }
                    Err(e) if is_retryable(&e) && attempt < self.settings.max_retries => {
                        let delay = self.retry_delay(attempt);
                        attempt += 1;
                        warn!(
                            "Batch delivery failed ({}), retry {}/{} in {:?}",
                            e, attempt, self.settings.max_retries, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

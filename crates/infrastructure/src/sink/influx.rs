use async_trait::async_trait;
use domain::DomainError;
use domain::SinkWriteError;
use domain::message::StorageRecord;
use domain::sink::TimeSeriesSink;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, instrument};

use crate::config::WriterConfig;
use crate::sink::line_protocol::encode_batch;

const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// InfluxDB v2 sink writing line protocol to `/api/v2/write`
#[derive(Clone)]
pub struct InfluxSink {
    client: Client,
    write_url: Url,
}

impl InfluxSink {
    pub fn new(config: &WriterConfig) -> Result<Self, DomainError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if !config.token.is_empty() {
            let value = reqwest::header::HeaderValue::from_str(&format!("Token {}", config.token))
                .map_err(|e| DomainError::Configuration(format!("invalid sink token: {e}")))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("text/plain; charset=utf-8"),
        );

        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(CONNECT_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| DomainError::Configuration(format!("cannot build HTTP client: {e}")))?;

        let mut write_url = Url::parse(&config.url)
            .and_then(|base| base.join("/api/v2/write"))
            .map_err(|e| DomainError::Configuration(format!("invalid sink url: {e}")))?;
        write_url
            .query_pairs_mut()
            .append_pair("org", &config.org)
            .append_pair("bucket", &config.bucket)
            .append_pair("precision", "ms");

        Ok(Self { client, write_url })
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }
}

/// 5xx and 429 are worth retrying; any other non-success status is not
pub fn classify_status(status: StatusCode, body: &str) -> Result<(), SinkWriteError> {
    if status.is_success() {
        return Ok(());
    }
    let message = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    };
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(SinkWriteError::Transient(message))
    } else {
        Err(SinkWriteError::Permanent(message))
    }
}

fn classify_transport_error(error: reqwest::Error) -> SinkWriteError {
    if error.is_builder() {
        SinkWriteError::Permanent(format!("invalid request: {error}"))
    } else {
        SinkWriteError::Transient(format!("request failed: {error}"))
    }
}

#[async_trait]
impl TimeSeriesSink for InfluxSink {
    #[instrument(skip(self, records), fields(records = records.len()))]
    async fn write_batch(&self, records: &[StorageRecord]) -> Result<(), SinkWriteError> {
        if records.is_empty() {
            return Ok(());
        }

        let body = encode_batch(records);
        let response = self
            .client
            .post(self.write_url.clone())
            .body(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            debug!("Sink accepted batch");
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        classify_status(status, text.trim())
    }
}

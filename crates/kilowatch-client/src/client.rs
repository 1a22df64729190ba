//! HTTP client for talking to Redfish management controllers
//!
//! One pooled, keep-alive client per process. Calls carry Basic auth,
//! bounded retries with jittered exponential backoff, and an optional
//! shared admission gate capping total in-flight requests.

use std::sync::Arc;
use std::time::Duration;

use kilowatch_core::{Credentials, Error, Result};
use kilowatch_metrics::InFlightGuard;
use prometheus::IntGauge;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::debug;

/// Device client tuning knobs
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection establishment deadline
    pub connect_timeout: Duration,
    /// Socket read deadline
    pub read_timeout: Duration,
    /// Whole-call deadline, connect and body included
    pub total_timeout: Duration,
    /// Additional attempts after the first
    pub max_retries: u32,
    /// First backoff step; doubles per attempt
    pub backoff_base: Duration,
    /// Verify device TLS certificates
    pub tls_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(4),
            total_timeout: Duration::from_secs(5),
            max_retries: 2,
            backoff_base: Duration::from_millis(200),
            tls_verify: false,
        }
    }
}

/// What a fetch produced, short of an error
#[derive(Debug)]
pub enum FetchOutcome {
    /// 2xx with a parseable JSON body
    Payload(Value),
    /// HTTP 404: the resource legitimately does not exist
    Absent,
}

/// HTTP client for Redfish device requests
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    config: ClientConfig,
    gate: Option<Arc<Semaphore>>,
    in_flight: Option<IntGauge>,
}

impl DeviceClient {
    /// Create a new device client with a pooled connection
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // PDUs and BMCs ship self-signed certificates almost universally,
        // so verification is opt-in rather than opt-out.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .danger_accept_invalid_certs(!config.tls_verify)
            .default_headers(headers)
            .user_agent(concat!("kilowatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Runtime(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            config,
            gate: None,
            in_flight: None,
        })
    }

    /// Cap total in-flight requests across every caller sharing `gate`
    pub fn with_admission_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Track in-flight requests on `gauge` while an admission slot is held
    pub fn with_in_flight_gauge(mut self, gauge: IntGauge) -> Self {
        self.in_flight = Some(gauge);
        self
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// GET `url` with Basic auth and retries.
    ///
    /// Returns `Absent` for 404 without retrying. All other failures are
    /// retried up to `max_retries` additional attempts with backoff; the
    /// last error is returned once attempts are exhausted.
    pub async fn fetch_json(&self, url: &str, credentials: &Credentials) -> Result<FetchOutcome> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url, credentials).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if attempt < self.config.max_retries && err.is_retryable() => {
                    let delay = self.backoff_delay(attempt);
                    debug!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "device request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One attempt. The admission slot and the in-flight gauge are held for
    /// exactly the duration of the request, released on every exit path.
    async fn fetch_once(&self, url: &str, credentials: &Credentials) -> Result<FetchOutcome> {
        let _permit = match &self.gate {
            Some(gate) => Some(
                Arc::clone(gate)
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::Runtime("admission gate closed".to_string()))?,
            ),
            None => None,
        };
        let _in_flight = self
            .in_flight
            .as_ref()
            .map(|gauge| InFlightGuard::new(gauge.clone()));

        let response = self
            .http
            .get(url)
            .basic_auth(&credentials.user, Some(&credentials.password))
            .timeout(self.config.total_timeout)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(&e))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| self.classify_transport_error(&e))?;
            return parse_body(&body).map(FetchOutcome::Payload);
        }

        match status.as_u16() {
            401 | 403 => Err(Error::Auth {
                status: status.as_u16(),
            }),
            404 => Ok(FetchOutcome::Absent),
            code => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Status {
                    status: code,
                    snippet: safe_snippet(&body),
                })
            }
        }
    }

    fn classify_transport_error(&self, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.config.total_timeout)
        } else {
            Error::Connect(err.to_string())
        }
    }

    /// `base * 2^attempt` plus uniform jitter up to half of that, so many
    /// targets failing at once do not retry in lockstep.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base.as_secs_f64() * 2f64.powi(attempt as i32);
        let jitter = rand::thread_rng().gen_range(0.0..=base * 0.5);
        Duration::from_secs_f64(base + jitter)
    }
}

/// Parse a 2xx body as JSON. Strict parse first; on failure retry after
/// stripping a BOM and NUL padding, which some firmware appends.
fn parse_body(body: &str) -> Result<Value> {
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(_) => {
            let cleaned = body
                .trim_start_matches('\u{feff}')
                .trim_matches(|c: char| c.is_whitespace() || c == '\0');
            serde_json::from_str(cleaned)
                .map_err(|_| Error::MalformedPayload(safe_snippet(body)))
        }
    }
}

/// First 200 characters of a body, newlines flattened to spaces
pub(crate) fn safe_snippet(body: &str) -> String {
    if body.is_empty() {
        return "<no body>".to_string();
    }
    body.chars()
        .take(200)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

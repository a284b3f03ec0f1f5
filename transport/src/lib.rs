//! Streaming transport for the copilot backend.
//!
//! # Architecture
//!
//! - [`StreamTransport`] - the seam the session controller spawns requests through
//! - [`HttpTransport`] - POSTs a [`StreamRequest`] and decodes the SSE response body
//! - [`catalog`] - ad and account lookups used to seed a session
//!
//! Events are delivered through a [`tokio::sync::mpsc::Sender<StreamEvent>`] channel in
//! the order the backend sent them. Nothing is sent after a terminal event.
//!
//! # Error Handling
//!
//! Network, HTTP and decode failures never surface as `Err` to the caller of
//! [`StreamTransport::open`]. Each becomes a single transport-origin
//! [`StreamEvent::Error`], so partial output received before the failure stays
//! visible. There is no automatic retry.

pub mod catalog;
mod decoder;
mod sse;

pub(crate) use anyhow::Result;
pub use canvas_types;
use canvas_types::{StreamEvent, StreamRequest};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
pub(crate) use tokio::sync::mpsc;

use decoder::{EventDecoder, SseParseAction};
use sse::{Frame, SseFramer};

const CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 300;

const TCP_KEEPALIVE_SECS: u64 = 60;

const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_SSE_PARSE_ERRORS: usize = 3;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Opens one streaming exchange with the backend.
///
/// The returned future runs until the stream terminates and reports every outcome,
/// including failures, as events on `tx`. Dropping or aborting the future abandons
/// the stream.
pub trait StreamTransport: Send + Sync {
    fn open(&self, request: StreamRequest, tx: mpsc::Sender<StreamEvent>) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Error)]
pub enum TransportConfigError {
    #[error("invalid endpoint URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Endpoint and credentials for [`HttpTransport`].
#[derive(Clone)]
pub struct TransportConfig {
    endpoint: String,
    api_key: Option<String>,
    idle_timeout: Option<Duration>,
}

// Manual Debug impl to prevent leaking the API key in logs.
impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("endpoint", &self.endpoint)
            .field(
                "api_key",
                &if self.api_key.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl TransportConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            idle_timeout: Some(Duration::from_secs(DEFAULT_STREAM_IDLE_TIMEOUT_SECS)),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// `None` (or a zero duration) waits on a silent stream forever.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout.filter(|timeout| !timeout.is_zero());
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }
}

/// Hardened client for `url`. Plain HTTP is only accepted for loopback hosts.
pub fn http_client_for(url: &str) -> Result<reqwest::Client, TransportConfigError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| TransportConfigError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let loopback = matches!(
        parsed.host_str(),
        Some("localhost" | "127.0.0.1" | "[::1]")
    );

    Ok(base_client_builder().https_only(!loopback).build()?)
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

/// SSE-over-HTTP transport to the copilot backend.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: Arc<TransportConfig>,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportConfigError> {
        let client = http_client_for(config.endpoint())?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl StreamTransport for HttpTransport {
    fn open(&self, request: StreamRequest, tx: mpsc::Sender<StreamEvent>) -> BoxFuture<'static, ()> {
        let client = self.client.clone();
        let config = Arc::clone(&self.config);
        Box::pin(async move {
            if let Err(e) = stream_request(&client, &config, &request, &tx).await {
                tracing::warn!("Copilot stream failed: {e}");
                let _ = send_event(&tx, StreamEvent::transport_error(e.to_string())).await;
            }
        })
    }
}

async fn stream_request(
    client: &reqwest::Client,
    config: &TransportConfig,
    request: &StreamRequest,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<()> {
    use reqwest::header::ACCEPT;

    let mut builder = client
        .post(config.endpoint())
        .header(ACCEPT, "text/event-stream")
        .json(request);
    if let Some(api_key) = config.api_key.as_deref() {
        builder = builder.bearer_auth(api_key);
    }

    tracing::debug!(
        thread_id = %request.thread_id,
        session_id = %request.session_id,
        has_context = request.frontend_context.is_some(),
        has_brief = request.brief_data.is_some(),
        "Opening copilot stream"
    );

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            let _ = send_event(tx, StreamEvent::transport_error(format!("Request failed: {e}")))
                .await;
            return Ok(());
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let error_text = read_capped_error_body(response).await;
        let _ = send_event(
            tx,
            StreamEvent::transport_error(format!("API error {status}: {error_text}")),
        )
        .await;
        return Ok(());
    }

    let mut decoder = EventDecoder::default();
    process_sse_stream(response, &mut decoder, tx, config.idle_timeout()).await
}

pub(crate) async fn send_event(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

/// Decode an SSE body into stream events.
///
/// Ends the exchange on the first terminal event, `[DONE]`, idle timeout or
/// after [`MAX_SSE_PARSE_ERRORS`] consecutive undecodable payloads.
async fn process_sse_stream(
    response: reqwest::Response,
    decoder: &mut EventDecoder,
    tx: &mpsc::Sender<StreamEvent>,
    idle_timeout: Option<Duration>,
) -> Result<()> {
    use futures_util::StreamExt;

    let mut body = response.bytes_stream();
    let mut framer = SseFramer::default();
    let mut parse_errors = 0usize;

    loop {
        let next = match idle_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, body.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let _ =
                        send_event(tx, StreamEvent::transport_error("Stream idle timeout")).await;
                    return Ok(());
                }
            },
            None => body.next().await,
        };
        let Some(chunk) = next else { break };

        if let Err(e) = framer.push(&chunk?) {
            let _ = send_event(tx, StreamEvent::transport_error(e.to_string())).await;
            return Ok(());
        }

        while let Some(frame) = framer.next_frame() {
            let data = match frame {
                Ok(Frame::Data(data)) => data,
                Ok(Frame::Empty) => continue,
                Ok(Frame::Done) => {
                    let done = StreamEvent::Complete {
                        follow_up_suggestions: Vec::new(),
                    };
                    let _ = send_event(tx, done).await;
                    return Ok(());
                }
                Err(e) => {
                    let _ = send_event(tx, StreamEvent::transport_error(e.to_string())).await;
                    return Ok(());
                }
            };

            let json = match serde_json::from_str::<serde_json::Value>(&data) {
                Ok(json) => json,
                Err(e) => {
                    parse_errors = parse_errors.saturating_add(1);
                    tracing::warn!(%e, bytes = data.len(), "Undecodable stream payload");
                    if parse_errors >= MAX_SSE_PARSE_ERRORS {
                        let _ = send_event(
                            tx,
                            StreamEvent::transport_error(format!("Invalid stream payload: {e}")),
                        )
                        .await;
                        return Ok(());
                    }
                    continue;
                }
            };
            parse_errors = 0;

            if let SseParseAction::Emit(event) = decoder.decode(json) {
                let terminal = event.is_terminal();
                if !send_event(tx, event).await || terminal {
                    return Ok(());
                }
            }
        }
    }

    // Body ended without `complete`, `error` or `[DONE]`.
    let _ = send_event(
        tx,
        StreamEvent::transport_error("Connection closed before stream completed"),
    )
    .await;
    Ok(())
}

pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

//! HTTP Backend Implementation
//!
//! [`QueryBackend`] over the RAG service's REST API.
//!
//! # Endpoints
//!
//! - `POST /domains/{name}/query` - Query one domain (SSE or JSON)
//! - `POST /domains/query` - Query several domains at once (SSE or JSON)
//! - `GET /domains` - List domains
//! - `GET /domains/{name}/documents` - List a domain's documents
//! - `GET /health` - Liveness
//!
//! Streaming requests only carry a connect timeout; the body is read for as
//! long as the server keeps it open.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use super::traits::{
    DispatchError, DocumentInfo, DomainInfo, QueryAnswer, QueryBackend, QueryRequest,
};
use crate::config::ClientConfig;
use crate::messages::DomainId;
use crate::streaming::{forward_events, StreamEvent};

const EVENT_STREAM: &str = "text/event-stream";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// RAG service client
#[derive(Clone, Debug)]
pub struct HttpBackend {
    /// Service root; endpoint paths are appended to it
    base_url: Url,
    /// HTTP client
    http_client: reqwest::Client,
    /// Timeout for non-streaming requests
    request_timeout: Duration,
    /// Events buffered per open stream
    channel_capacity: usize,
}

impl HttpBackend {
    /// Create a backend for the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidBaseUrl`] if the URL does not parse or
    /// cannot take path segments, and [`DispatchError::Transport`] if the
    /// HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
        channel_capacity: usize,
    ) -> Result<Self, DispatchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DispatchError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(DispatchError::InvalidBaseUrl(base_url.to_string()));
        }

        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            base_url,
            http_client,
            request_timeout,
            channel_capacity: channel_capacity.max(1),
        })
    }

    /// Create from a resolved [`ClientConfig`]
    ///
    /// # Errors
    ///
    /// See [`HttpBackend::new`].
    pub fn from_config(config: &ClientConfig) -> Result<Self, DispatchError> {
        Self::new(
            &config.base_url,
            config.connect_timeout,
            config.request_timeout,
            config.stream_buffer,
        )
    }

    /// The service root
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append escaped path segments to the base URL
    fn endpoint(&self, segments: &[&str]) -> Result<Url, DispatchError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| DispatchError::InvalidBaseUrl(self.base_url.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// GET a JSON document with the request timeout
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, DispatchError> {
        let response = self
            .http_client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| DispatchError::Decode(e.to_string()))
    }
}

/// Pass success responses through; turn anything else into a status error
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DispatchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(status, &body);
    tracing::warn!(status = status.as_u16(), detail = %detail, "Request rejected");
    Err(DispatchError::Status {
        status: status.as_u16(),
        detail,
    })
}

/// Extract the service's error message from a failed response body
///
/// The service reports errors as `{"detail": ...}`; a non-string detail
/// (such as a validation error list) is rendered as JSON.
fn error_detail(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("detail").cloned());

    match detail {
        Some(serde_json::Value::String(message)) => message,
        Some(serde_json::Value::Null) | None => format!("Request failed with status {status}"),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl QueryBackend for HttpBackend {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn health_check(&self) -> bool {
        let Ok(url) = self.endpoint(&["health"]) else {
            return false;
        };
        match self
            .http_client
            .get(url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    async fn open_stream(
        &self,
        request: &QueryRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, DispatchError> {
        let target = request.target()?;
        let url = self.endpoint(&target.path_segments())?;

        tracing::debug!(url = %url, domains = ?request.domains, "Opening query stream");

        let response = self
            .http_client
            .post(url)
            .header(ACCEPT, HeaderValue::from_static(EVENT_STREAM))
            .json(&target.body(&request.question, true))
            .send()
            .await?;
        let response = check_status(response).await?;

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        tokio::spawn(forward_events(response.bytes_stream(), tx));

        Ok(rx)
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryAnswer, DispatchError> {
        let target = request.target()?;
        let url = self.endpoint(&target.path_segments())?;

        let response = self
            .http_client
            .post(url)
            .timeout(self.request_timeout)
            .json(&target.body(&request.question, false))
            .send()
            .await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| DispatchError::Decode(e.to_string()))
    }

    async fn list_domains(&self) -> Result<Vec<DomainInfo>, DispatchError> {
        let url = self.endpoint(&["domains"])?;
        self.get_json(url).await
    }

    async fn list_documents(&self, domain: &DomainId) -> Result<Vec<DocumentInfo>, DispatchError> {
        let url = self.endpoint(&["domains", domain.as_str(), "documents"])?;
        self.get_json(url).await
    }
}

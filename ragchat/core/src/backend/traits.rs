//! Query Backend Traits
//!
//! Trait and request types for the service a chat session queries. The
//! session only talks to [`QueryBackend`], so tests can drive it with a mock
//! and the HTTP details stay in one implementation.
//!
//! # Routing
//!
//! A request against exactly one domain goes to that domain's own query
//! endpoint; a request against several goes to the multi-domain endpoint,
//! which fans out and merges on the server. See [`QueryTarget`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::messages::{DomainId, SourceChunk};
use crate::streaming::StreamEvent;

/// Errors opening a stream or calling a catalog endpoint
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A query needs at least one domain
    #[error("At least one domain is required")]
    NoDomains,

    /// The configured base URL cannot carry path segments
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// The server answered with a non-success status
    #[error("{detail}")]
    Status {
        /// HTTP status code
        status: u16,
        /// The server's error detail, or a generic message
        detail: String,
    },

    /// Network failure before a response arrived
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A success response whose body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl DispatchError {
    /// HTTP status, when the server produced one
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A question against a fixed set of domains
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRequest {
    /// The question, already trimmed
    pub question: String,
    /// Domains in selection order
    pub domains: Vec<DomainId>,
}

impl QueryRequest {
    /// Create a request
    pub fn new(question: impl Into<String>, domains: Vec<DomainId>) -> Self {
        Self {
            question: question.into(),
            domains,
        }
    }

    /// Decide which endpoint serves this request
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoDomains`] for an empty domain list.
    pub fn target(&self) -> Result<QueryTarget<'_>, DispatchError> {
        match self.domains.as_slice() {
            [] => Err(DispatchError::NoDomains),
            [single] => Ok(QueryTarget::SingleDomain(single)),
            many => Ok(QueryTarget::MultiDomain(many)),
        }
    }
}

/// Endpoint selection for a query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryTarget<'a> {
    /// `POST /domains/{domain}/query`
    SingleDomain(&'a DomainId),
    /// `POST /domains/query`
    MultiDomain(&'a [DomainId]),
}

impl QueryTarget<'_> {
    /// URL path segments below the base URL
    #[must_use]
    pub fn path_segments(&self) -> Vec<&str> {
        match self {
            Self::SingleDomain(domain) => vec!["domains", domain.as_str(), "query"],
            Self::MultiDomain(_) => vec!["domains", "query"],
        }
    }

    /// JSON request body
    #[must_use]
    pub fn body(&self, question: &str, streaming: bool) -> serde_json::Value {
        match self {
            Self::SingleDomain(_) => serde_json::json!({
                "question": question,
                "streaming": streaming,
            }),
            Self::MultiDomain(domains) => serde_json::json!({
                "question": question,
                "domains": domains,
                "streaming": streaming,
            }),
        }
    }
}

/// Non-streaming answer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryAnswer {
    /// Full answer text
    pub answer: String,
    /// Citations backing the answer
    #[serde(default)]
    pub sources: Vec<SourceChunk>,
    /// Echo of the question
    pub question: String,
    /// Set by the single-domain endpoint
    #[serde(default)]
    pub domain: Option<String>,
    /// Set by the multi-domain endpoint
    #[serde(default)]
    pub domains: Vec<String>,
}

/// A domain as listed by the catalog endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainInfo {
    /// Domain name (the [`DomainId`] used for queries)
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Creation time as reported by the server (ISO 8601)
    pub created_at: String,
    /// Number of ingested page documents
    pub doc_count: u32,
}

/// A document inside a domain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Document identifier
    pub doc_id: String,
    /// Original file name
    pub filename: String,
    /// Number of indexed chunks
    pub num_chunks: u32,
}

/// Query backend trait
///
/// Implement this to point a chat session at a different transport.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Check if the service is reachable
    async fn health_check(&self) -> bool;

    /// Open a streaming query
    ///
    /// Returns a channel receiver that yields events as they arrive. The
    /// last event on a healthy stream is terminal; dropping the receiver
    /// abandons the response.
    async fn open_stream(
        &self,
        request: &QueryRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, DispatchError>;

    /// Ask a question and wait for the complete answer
    async fn query(&self, request: &QueryRequest) -> Result<QueryAnswer, DispatchError>;

    /// List domains known to the service
    async fn list_domains(&self) -> Result<Vec<DomainInfo>, DispatchError>;

    /// List the documents ingested into a domain
    async fn list_documents(&self, domain: &DomainId) -> Result<Vec<DocumentInfo>, DispatchError>;

    /// Check if a specific domain exists
    async fn has_domain(&self, domain: &DomainId) -> Result<bool, DispatchError> {
        let domains = self.list_domains().await?;
        Ok(domains.iter().any(|d| d.name == domain.as_str()))
    }
}

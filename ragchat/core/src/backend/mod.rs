//! Query Dispatcher
//!
//! Abstracted access to the RAG service through a common trait, so the chat
//! session can be driven by the HTTP client or by a test double.
//!
//! # Usage
//!
//! ```ignore
//! use ragchat_core::backend::{HttpBackend, QueryBackend, QueryRequest};
//!
//! let backend = HttpBackend::from_config(&config)?;
//! let request = QueryRequest::new("What is the notice period?", vec!["legal".into()]);
//! let mut rx = backend.open_stream(&request).await?;
//! while let Some(event) = rx.recv().await { /* ... */ }
//! ```

mod http;
mod traits;

pub use http::HttpBackend;
pub use traits::{
    DispatchError, DocumentInfo, DomainInfo, QueryAnswer, QueryBackend, QueryRequest, QueryTarget,
};

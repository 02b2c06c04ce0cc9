//! ragchat Core - Headless Streaming Client for a Domain RAG Service
//!
//! This crate holds everything needed to ask questions of a multi-domain
//! retrieval-augmented-generation service and watch the answer stream in,
//! independent of any terminal or UI framework.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    Presentation (CLI, TUI, ...)                   │
//! │            submit / select domains        ▲ SessionSnapshot       │
//! └──────────────────────┬────────────────────┼──────────────────────┘
//!                        │                    │ (watch)
//! ┌──────────────────────▼────────────────────┴──────────────────────┐
//! │                          ChatSession                              │
//! │     history · pending text · phase · single active stream         │
//! └──────────────┬───────────────────────────────▲───────────────────┘
//!                │ QueryRequest                  │ StreamEvent (mpsc)
//! ┌──────────────▼──────────────┐   ┌────────────┴───────────────────┐
//! │  QueryBackend (HttpBackend) │   │  FrameDecoder ─▶ EventRouter   │
//! │  routes single/multi domain │──▶│  (spawned pump per response)   │
//! └─────────────────────────────┘   └────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatSession`]: Conversation state machine driving one stream at a time
//! - [`QueryBackend`]: Trait for the service a session talks to
//! - [`HttpBackend`]: reqwest implementation of [`QueryBackend`]
//! - [`StreamEvent`]: Typed events decoded from a streaming answer
//! - [`ClientConfig`]: Resolved configuration (file, environment, CLI)
//!
//! # Quick Start
//!
//! ```ignore
//! use ragchat_core::{config, ChatSession, HttpBackend};
//!
//! let config = config::load_config()?;
//! let backend = HttpBackend::from_config(&config)?;
//! let mut session = ChatSession::new(backend);
//! session.set_selected_domains(config.default_domains.clone());
//!
//! session.submit("What is the notice period?").await?;
//! while let Some(event) = session.next_event().await {
//!     // Render tokens as they arrive
//! }
//! println!("{}", session.history().last().unwrap().content);
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Query dispatch (trait, HTTP implementation, catalog reads)
//! - [`config`]: TOML configuration with environment and CLI overrides
//! - [`messages`]: Chat messages, source citations, identifiers
//! - [`session`]: The chat session state machine
//! - [`streaming`]: Frame decoding and event routing for streamed answers

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod messages;
pub mod session;
pub mod streaming;

// Re-exports for convenience
pub use backend::{
    DispatchError, DocumentInfo, DomainInfo, HttpBackend, QueryAnswer, QueryBackend,
    QueryRequest, QueryTarget,
};
pub use config::{ClientConfig, ConfigError, ConfigOverrides, ConfigSource};
pub use messages::{ChatMessage, DomainId, MessageId, MessageRole, SourceChunk};
pub use session::{ChatSession, SessionPhase, SessionSnapshot, SubmitRejected};
pub use streaming::{forward_events, payload_stream, EventRouter, FrameDecoder, StreamEvent};

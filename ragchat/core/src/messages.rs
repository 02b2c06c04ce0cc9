//! Chat Messages
//!
//! Value types shared by the session, the dispatcher and any presentation
//! layer: message identifiers, roles, finalized chat messages, the source
//! citations the server attaches to answers, and the opaque domain key.
//!
//! # Design Philosophy
//!
//! Everything here is plain data. A [`ChatMessage`] only exists once it is
//! fully formed; the in-progress answer lives in the session as pending text
//! and is never represented as a message.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque key naming an isolated retrieval namespace on the server
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(String);

impl DomainId {
    /// Wrap a domain name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The domain name as sent on the wire
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DomainId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for DomainId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for DomainId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Message identifier, unique within one chat session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Create an ID from a raw counter value
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The person asking questions
    User,
    /// The RAG service's answer
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// A retrieved passage backing an answer
///
/// Produced only by the server. `score` is the retriever's similarity in
/// `[0, 1]` when the retriever scored the passage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceChunk {
    /// Server-side node identifier
    pub doc_id: String,
    /// Originating file; prefixed with `domain/` for multi-domain answers
    pub filename: String,
    /// Page label inside the file, when known
    #[serde(default)]
    pub page_label: Option<String>,
    /// Similarity score, absent when unscored
    #[serde(default)]
    pub score: Option<f64>,
    /// The passage text
    pub text: String,
}

/// A finalized message in the conversation history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// Citations; only ever set on assistant messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceChunk>>,
}

impl ChatMessage {
    /// A user question
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: MessageRole::User,
            content: content.into(),
            sources: None,
        }
    }

    /// A completed answer with whatever sources arrived during the turn
    pub fn assistant(
        id: MessageId,
        content: impl Into<String>,
        sources: Option<Vec<SourceChunk>>,
    ) -> Self {
        Self {
            id,
            role: MessageRole::Assistant,
            content: content.into(),
            sources,
        }
    }

    /// Number of attached sources (0 when none arrived)
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.as_ref().map_or(0, Vec::len)
    }
}

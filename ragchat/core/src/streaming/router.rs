//! Event Router
//!
//! Interprets one decoded payload: the `[DONE]` sentinel, or a JSON record
//! discriminated by `type`. Malformed payloads and unknown types are dropped
//! here and never reach the session.

use serde::Deserialize;

use crate::messages::SourceChunk;

use super::StreamEvent;

/// Terminal payload; not JSON
pub const DONE_SENTINEL: &str = "[DONE]";

/// Payload shapes the server sends, keyed by `type`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireFrame {
    Token {
        text: String,
    },
    Sources {
        sources: Vec<SourceChunk>,
    },
    Error {
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// Routes payloads of a single stream to [`StreamEvent`]s
///
/// Once a terminal event (Done or an error frame) has been produced the
/// router is finished and ignores everything after it.
#[derive(Debug, Default)]
pub struct EventRouter {
    finished: bool,
    dropped: u32,
}

impl EventRouter {
    /// Create a router for a fresh stream
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one payload, returning the event it carries (if any)
    pub fn route(&mut self, payload: &str) -> Option<StreamEvent> {
        if self.finished {
            tracing::trace!("Ignoring payload after terminal event");
            return None;
        }

        if payload == DONE_SENTINEL {
            self.finished = true;
            return Some(StreamEvent::Done);
        }

        let frame = match serde_json::from_str::<WireFrame>(payload) {
            Ok(frame) => frame,
            Err(e) => {
                self.dropped += 1;
                tracing::debug!(error = %e, "Dropping malformed frame");
                return None;
            }
        };

        match frame {
            WireFrame::Token { text } => Some(StreamEvent::Token(text)),
            WireFrame::Sources { sources } => Some(StreamEvent::Sources(sources)),
            WireFrame::Error { message } => {
                self.finished = true;
                Some(StreamEvent::ErrorFrame(message))
            }
            WireFrame::Unknown => {
                self.dropped += 1;
                tracing::trace!("Ignoring frame with unrecognized type");
                None
            }
        }
    }

    /// Whether a terminal event has been produced
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Payloads dropped as malformed or unrecognized
    #[must_use]
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

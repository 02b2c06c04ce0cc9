//! Chat Session
//!
//! The state machine behind one conversation: domain selection, history,
//! the in-flight answer, and the single active stream.
//!
//! # Design Philosophy
//!
//! The session is driven through `&mut self` from one task. It never holds a
//! lock; the single-flight rule is enforced by the `submit` guard alone.
//!
//! ```text
//!            submit (accepted)
//!   ┌──────┐ ─────────────────▶ ┌───────────┐  Token / Sources
//!   │ Idle │                    │ Streaming │ ◀──────────────┐
//!   └──────┘ ◀───────────────── └───────────┘ ───────────────┘
//!      ▲      Done / Closed        │
//!      │                           │ ErrorFrame / TransportFailure
//!      │  clear()             ┌────▼────┐
//!      └───────────────────── │  Error  │ ── submit (accepted) ──▶ Streaming
//!                             └─────────┘
//! ```
//!
//! The partial answer is kept as pending text and only becomes a
//! [`ChatMessage`] at finalization, so history never holds half an answer.
//! When a turn ends or is abandoned its receiver is dropped, which stops the
//! pump task; events that still arrive while not Streaming are ignored.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::backend::{QueryBackend, QueryRequest};
use crate::messages::{ChatMessage, DomainId, MessageId, SourceChunk};
use crate::streaming::StreamEvent;

/// Lifecycle phase of a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Ready for a question
    #[default]
    Idle,
    /// A stream is open and the answer is accumulating
    Streaming,
    /// The last turn failed; see [`ChatSession::last_error`]
    Error,
}

/// Why `submit` turned a question away
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SubmitRejected {
    /// Question was empty after trimming
    #[error("Question is empty")]
    EmptyQuestion,

    /// No domain is selected
    #[error("Select at least one domain first")]
    NoDomainSelected,

    /// A turn is already streaming
    #[error("An answer is still streaming")]
    AlreadyStreaming,
}

/// Read-only view of the session, published after every transition
///
/// `history` is shared between snapshots and only rebuilt when a message is
/// added or the conversation is cleared, so per-token snapshots stay cheap.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Current phase
    pub phase: SessionPhase,
    /// Selected domains, in selection order
    pub selected_domains: Vec<DomainId>,
    /// Finalized messages
    pub history: Arc<[ChatMessage]>,
    /// Answer text received so far in the active turn
    pub pending_text: String,
    /// Latest sources received in the active turn
    pub pending_sources: Option<Vec<SourceChunk>>,
    /// Message of the last failure, set only in the Error phase
    pub last_error: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            selected_domains: Vec::new(),
            history: Arc::from(Vec::new()),
            pending_text: String::new(),
            pending_sources: None,
            last_error: None,
        }
    }
}

/// The stream and bookkeeping of the turn in flight
struct ActiveTurn {
    rx: mpsc::Receiver<StreamEvent>,
    domains: Vec<DomainId>,
    started: Instant,
    tokens: u32,
}

/// One conversation with the RAG service
pub struct ChatSession<B: QueryBackend> {
    backend: Arc<B>,
    selected: Vec<DomainId>,
    history: Vec<ChatMessage>,
    shared_history: Arc<[ChatMessage]>,
    pending_text: String,
    pending_sources: Option<Vec<SourceChunk>>,
    phase: SessionPhase,
    last_error: Option<String>,
    turn: Option<ActiveTurn>,
    next_id: u64,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl<B: QueryBackend> ChatSession<B> {
    /// Create a session that owns its backend
    pub fn new(backend: B) -> Self {
        Self::with_backend(Arc::new(backend))
    }

    /// Create a session over a shared backend
    pub fn with_backend(backend: Arc<B>) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            backend,
            selected: Vec::new(),
            history: Vec::new(),
            shared_history: Arc::from(Vec::new()),
            pending_text: String::new(),
            pending_sources: None,
            phase: SessionPhase::Idle,
            last_error: None,
            turn: None,
            next_id: 1,
            snapshot_tx,
        }
    }

    /// The backend this session dispatches to
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    // ========================================================================
    // Domain selection
    // ========================================================================

    /// Add a domain to the selection; returns false if already selected
    pub fn select_domain(&mut self, domain: impl Into<DomainId>) -> bool {
        let domain = domain.into();
        if self.selected.contains(&domain) {
            return false;
        }
        self.selected.push(domain);
        self.publish();
        true
    }

    /// Remove a domain from the selection; returns false if it was not selected
    pub fn deselect_domain(&mut self, domain: &DomainId) -> bool {
        let before = self.selected.len();
        self.selected.retain(|d| d != domain);
        let removed = self.selected.len() != before;
        if removed {
            self.publish();
        }
        removed
    }

    /// Flip a domain's selection; returns whether it is now selected
    pub fn toggle_domain(&mut self, domain: impl Into<DomainId>) -> bool {
        let domain = domain.into();
        if self.deselect_domain(&domain) {
            false
        } else {
            self.select_domain(domain)
        }
    }

    /// Replace the whole selection, keeping first occurrences in order
    pub fn set_selected_domains<I>(&mut self, domains: I)
    where
        I: IntoIterator,
        I::Item: Into<DomainId>,
    {
        self.selected.clear();
        for domain in domains {
            let domain = domain.into();
            if !self.selected.contains(&domain) {
                self.selected.push(domain);
            }
        }
        self.publish();
    }

    /// Selected domains, in selection order
    #[must_use]
    pub fn selected_domains(&self) -> &[DomainId] {
        &self.selected
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Ask a question against the current selection
    ///
    /// On acceptance the question is appended to history and the stream is
    /// opened with the selection as it is right now. A dispatch failure is
    /// not a rejection: the turn moves to [`SessionPhase::Error`] and the
    /// question stays in history.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitRejected`] without touching any state when a turn is
    /// already streaming, the question is blank, or nothing is selected.
    pub async fn submit(&mut self, question: &str) -> Result<MessageId, SubmitRejected> {
        if self.phase == SessionPhase::Streaming {
            tracing::debug!("Submit ignored, answer still streaming");
            return Err(SubmitRejected::AlreadyStreaming);
        }
        let question = question.trim();
        if question.is_empty() {
            return Err(SubmitRejected::EmptyQuestion);
        }
        if self.selected.is_empty() {
            return Err(SubmitRejected::NoDomainSelected);
        }

        let id = self.allocate_id();
        self.push_history(ChatMessage::user(id, question));
        self.last_error = None;
        self.pending_text.clear();
        self.pending_sources = None;
        self.phase = SessionPhase::Streaming;
        self.publish();

        let domains = self.selected.clone();
        let request = QueryRequest::new(question, domains.clone());

        tracing::debug!(
            backend = self.backend.name(),
            domains = ?domains,
            "Submitting question"
        );

        match self.backend.open_stream(&request).await {
            Ok(rx) => {
                self.turn = Some(ActiveTurn {
                    rx,
                    domains,
                    started: Instant::now(),
                    tokens: 0,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, domains = ?domains, "Failed to open query stream");
                self.fail(e.to_string());
            }
        }

        Ok(id)
    }

    /// Apply every event already waiting on the active stream
    ///
    /// Never waits. Returns true if anything was applied.
    pub fn poll_streaming(&mut self) -> bool {
        // Collect first so the receiver borrow ends before state changes
        let events: Vec<StreamEvent> = {
            let Some(turn) = self.turn.as_mut() else {
                return false;
            };

            let mut collected = Vec::new();
            loop {
                match turn.rx.try_recv() {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        collected.push(event);
                        if terminal {
                            break;
                        }
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        collected.push(pump_vanished());
                        break;
                    }
                }
            }
            collected
        };

        if events.is_empty() {
            return false;
        }
        for event in events {
            self.apply(event);
        }
        true
    }

    /// Wait for the next event of the active stream and apply it
    ///
    /// Returns the applied event, or `None` when no turn is active.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let turn = self.turn.as_mut()?;
        let event = turn.rx.recv().await.unwrap_or_else(pump_vanished);
        self.apply(event.clone());
        Some(event)
    }

    /// Drive the active turn until it ends
    pub async fn run_to_completion(&mut self) -> SessionPhase {
        while self.next_event().await.is_some() {}
        self.phase
    }

    /// Drop all history and abandon any active turn
    pub fn clear(&mut self) {
        if let Some(turn) = self.turn.take() {
            tracing::debug!(tokens = turn.tokens, "Abandoning active turn");
        }
        self.history.clear();
        self.shared_history = Arc::from(Vec::new());
        self.pending_text.clear();
        self.pending_sources = None;
        self.last_error = None;
        self.phase = SessionPhase::Idle;
        self.publish();
    }

    fn apply(&mut self, event: StreamEvent) {
        if self.phase != SessionPhase::Streaming {
            tracing::trace!(?event, "Ignoring event outside an active turn");
            return;
        }

        match event {
            StreamEvent::Token(text) => {
                self.pending_text.push_str(&text);
                if let Some(turn) = self.turn.as_mut() {
                    turn.tokens += 1;
                }
            }
            StreamEvent::Sources(sources) => {
                tracing::trace!(count = sources.len(), "Sources received");
                self.pending_sources = Some(sources);
            }
            StreamEvent::Done | StreamEvent::Closed => self.finalize(),
            StreamEvent::ErrorFrame(message) => {
                tracing::warn!(message = %message, "Server reported an error");
                self.fail(message);
            }
            StreamEvent::TransportFailure(message) => {
                tracing::warn!(message = %message, "Stream failed");
                self.fail(message);
            }
        }

        self.publish();
    }

    fn finalize(&mut self) {
        let id = self.allocate_id();
        let content = std::mem::take(&mut self.pending_text);
        let message = ChatMessage::assistant(id, content, self.pending_sources.take());

        if let Some(turn) = self.turn.take() {
            tracing::info!(
                tokens = turn.tokens,
                elapsed_ms = u64::try_from(turn.started.elapsed().as_millis()).unwrap_or(u64::MAX),
                sources = message.source_count(),
                domains = ?turn.domains,
                "Answer complete"
            );
        }

        self.push_history(message);
        self.phase = SessionPhase::Idle;
    }

    fn fail(&mut self, message: String) {
        self.turn = None;
        self.pending_text.clear();
        self.pending_sources = None;
        self.last_error = Some(message);
        self.phase = SessionPhase::Error;
        self.publish();
    }

    fn push_history(&mut self, message: ChatMessage) {
        self.history.push(message);
        self.shared_history = Arc::from(self.history.as_slice());
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId::from_raw(self.next_id);
        self.next_id += 1;
        id
    }

    // ========================================================================
    // Read side
    // ========================================================================

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether a turn is in flight
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.phase == SessionPhase::Streaming
    }

    /// Finalized messages, oldest first
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Answer text received so far in the active turn
    #[must_use]
    pub fn pending_text(&self) -> &str {
        &self.pending_text
    }

    /// Latest sources received in the active turn
    #[must_use]
    pub fn pending_sources(&self) -> Option<&[SourceChunk]> {
        self.pending_sources.as_deref()
    }

    /// Message of the last failure (Error phase only)
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Domains the active turn was dispatched with
    #[must_use]
    pub fn active_domains(&self) -> Option<&[DomainId]> {
        self.turn.as_ref().map(|t| t.domains.as_slice())
    }

    /// Build a snapshot of the current state
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            selected_domains: self.selected.clone(),
            history: Arc::clone(&self.shared_history),
            pending_text: self.pending_text.clone(),
            pending_sources: self.pending_sources.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Subscribe to snapshots published after every transition
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

/// Stand-in event for a stream whose sender went away without a terminal event
fn pump_vanished() -> StreamEvent {
    StreamEvent::TransportFailure("Stream closed unexpectedly".to_string())
}

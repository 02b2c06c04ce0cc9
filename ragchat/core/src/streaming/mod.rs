//! Streaming Query Pipeline
//!
//! Everything between the HTTP response body and the chat session:
//!
//! ```text
//! ┌──────────────┐  byte chunks  ┌──────────────┐  payloads  ┌─────────────┐
//! │ bytes_stream │ ────────────▶ │ FrameDecoder │ ─────────▶ │ EventRouter │
//! └──────────────┘               └──────────────┘            └──────┬──────┘
//!                                                                   │ StreamEvent
//!                                                                   ▼
//!                                                      mpsc::Sender (one turn)
//! ```
//!
//! [`forward_events`] runs the pipeline for one response and forwards events
//! over a bounded channel. It stops at the first terminal event, at a read
//! error, or as soon as the receiving session drops its end.

mod decoder;
mod router;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::messages::SourceChunk;

pub use decoder::{payload_stream, FrameDecoder, Utf8Decoder, DATA_PREFIX, FRAME_DELIMITER};
pub use router::{EventRouter, DONE_SENTINEL};

/// One event of a streaming answer
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// A fragment of answer text
    Token(String),
    /// The citations backing the answer
    Sources(Vec<SourceChunk>),
    /// Explicit end of stream (`[DONE]`)
    Done,
    /// Server-reported failure; ends the turn
    ErrorFrame(String),
    /// The body could not be read to completion
    TransportFailure(String),
    /// The body ended without `[DONE]` or an error frame
    Closed,
}

impl StreamEvent {
    /// Whether this event ends the turn
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token(_) | Self::Sources(_))
    }
}

/// Decode and route a response body, forwarding events to `tx`
///
/// Returns once a terminal event has been sent or the receiver is gone. A
/// dropped receiver is noticed even while the body is idle.
pub async fn forward_events<S, B, E>(bytes: S, tx: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut payloads = Box::pin(payload_stream(bytes));
    let mut router = EventRouter::new();

    loop {
        let next = tokio::select! {
            next = payloads.next() => next,
            () = tx.closed() => {
                tracing::debug!("Stream receiver dropped, abandoning response");
                return;
            }
        };
        let Some(item) = next else {
            break;
        };

        let payload = match item {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Response body read failed");
                let _ = tx.send(StreamEvent::TransportFailure(e.to_string())).await;
                return;
            }
        };

        if let Some(event) = router.route(&payload) {
            if tx.send(event).await.is_err() {
                // Receiver dropped, stop streaming
                tracing::debug!("Stream receiver dropped, abandoning response");
                return;
            }
        }

        if router.is_finished() {
            return;
        }
    }

    tracing::debug!(dropped = router.dropped(), "Response ended without [DONE]");
    let _ = tx.send(StreamEvent::Closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn collect(chunks: Vec<Result<&'static [u8], String>>) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(32);
        forward_events(futures::stream::iter(chunks), tx).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_forwards_until_done() {
        let events = collect(vec![
            Ok(b"data: {\"type\":\"token\",\"text\":\"A\"}\n\ndata: {\"type\":\"tok".as_slice()),
            Ok(b"en\",\"text\":\"B\"}\n\ndata: [DONE]\n\ndata: {\"type\":\"token\",\"text\":\"C\"}\n\n"
                .as_slice()),
        ])
        .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("A".to_string()),
                StreamEvent::Token("B".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_error_frame_stops_forwarding() {
        let events = collect(vec![Ok(
            b"data: {\"type\":\"error\",\"message\":\"rate limited\"}\n\ndata: [DONE]\n\n".as_slice(),
        )])
        .await;
        assert_eq!(
            events,
            vec![StreamEvent::ErrorFrame("rate limited".to_string())]
        );
    }

    #[tokio::test]
    async fn test_missing_done_signals_closed() {
        let events = collect(vec![Ok(
            b"data: {\"type\":\"token\",\"text\":\"partial\"}\n\ndata: {\"type\"".as_slice(),
        )])
        .await;
        assert_eq!(
            events,
            vec![StreamEvent::Token("partial".to_string()), StreamEvent::Closed]
        );
    }

    #[tokio::test]
    async fn test_read_error_becomes_transport_failure() {
        let events = collect(vec![
            Ok(b"data: {\"type\":\"token\",\"text\":\"x\"}\n\n".as_slice()),
            Err("connection reset by peer".to_string()),
        ])
        .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("x".to_string()),
                StreamEvent::TransportFailure("connection reset by peer".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        // Would loop forever on a pending stream if the closed channel were ignored
        let endless = futures::stream::repeat(Ok::<_, String>(
            b"data: {\"type\":\"token\",\"text\":\"t\"}\n\n".as_slice(),
        ));
        forward_events(endless, tx).await;
    }

    #[tokio::test]
    async fn test_stops_on_idle_body_once_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        // Keepalive comments produce no events, then the body stalls forever
        let stalled = futures::stream::iter(vec![Ok::<_, String>(b": keepalive\n\n".as_slice())])
            .chain(futures::stream::pending());
        let finished =
            tokio::time::timeout(std::time::Duration::from_millis(300), forward_events(stalled, tx))
                .await;
        assert!(finished.is_ok(), "pump kept running after the receiver was dropped");
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped_mid_stall() {
        let (tx, mut rx) = mpsc::channel(4);
        let stalled = futures::stream::iter(vec![Ok::<_, String>(
            b"data: {\"type\":\"token\",\"text\":\"t\"}\n\n".as_slice(),
        )])
        .chain(futures::stream::pending());
        let pump = tokio::spawn(forward_events(stalled, tx));

        assert_eq!(rx.recv().await, Some(StreamEvent::Token("t".to_string())));
        drop(rx);

        let joined = tokio::time::timeout(std::time::Duration::from_millis(300), pump).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[test]
    fn test_terminal_classification() {
        assert!(!StreamEvent::Token(String::new()).is_terminal());
        assert!(!StreamEvent::Sources(Vec::new()).is_terminal());
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::Closed.is_terminal());
        assert!(StreamEvent::ErrorFrame(String::new()).is_terminal());
        assert!(StreamEvent::TransportFailure(String::new()).is_terminal());
    }
}

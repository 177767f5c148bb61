//! Per-session event channel and the text buffer it feeds.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use super::error::TransportError;

/// Something a transport reports about its in-flight request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One relayed event line, e.g. `data: {...}` or `data: [DONE]`.
    Frame(String),
    /// The request failed.
    Failed(TransportError),
    /// The request has resolved; nothing more will be sent.
    Closed,
}

/// Transport-side end of a session's channel.
///
/// Clones may be moved to other threads. Every send returns false once the
/// session has been superseded or aborted, which a transport can use to stop
/// early.
#[derive(Debug, Clone)]
pub struct StreamSender {
    session: u64,
    tx: Sender<StreamEvent>,
}

impl StreamSender {
    /// Session this sender belongs to.
    pub const fn session(&self) -> u64 {
        self.session
    }

    /// Relay one upstream event line.
    pub fn frame(&self, payload: impl Into<String>) -> bool {
        self.send(StreamEvent::Frame(payload.into()))
    }

    /// Report that the request failed.
    pub fn fail(&self, error: TransportError) -> bool {
        self.send(StreamEvent::Failed(error))
    }

    /// Report that the request resolved.
    pub fn close(&self) -> bool {
        self.send(StreamEvent::Closed)
    }

    fn send(&self, event: StreamEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Aggregator-side end of a session's channel.
#[derive(Debug)]
pub struct Subscription {
    session: u64,
    rx: Receiver<StreamEvent>,
}

impl Subscription {
    /// Session this subscription belongs to.
    pub const fn session(&self) -> u64 {
        self.session
    }

    /// Next queued event, without blocking.
    ///
    /// Once every sender is gone this reports [`StreamEvent::Closed`].
    pub fn try_next(&self) -> Option<StreamEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(StreamEvent::Closed),
        }
    }

    /// Detach from the session. Later sends on its senders fail.
    pub fn dispose(self) {
        tracing::trace!(session = self.session, "stream subscription disposed");
    }
}

/// Open the channel for session `session`.
pub fn subscription(session: u64) -> (StreamSender, Subscription) {
    let (tx, rx) = mpsc::channel();
    (StreamSender { session, tx }, Subscription { session, rx })
}

/// Text received so far, split into the visible part and the part waiting
/// for the next flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamBuffer {
    accumulated: String,
    pending: String,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible text.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Received but not yet flushed.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn push(&mut self, piece: &str) {
        self.pending.push_str(piece);
    }

    /// Move pending text to the visible text. Returns true if anything moved.
    pub fn flush(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.accumulated.push_str(&self.pending);
        self.pending.clear();
        true
    }

    /// Show `text` if nothing is visible yet. Returns true if it was shown.
    pub fn fill_if_empty(&mut self, text: impl Into<String>) -> bool {
        if !self.accumulated.is_empty() {
            return false;
        }
        self.accumulated = text.into();
        true
    }

    pub fn reset(&mut self) {
        self.accumulated.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_flush_preserves_order() {
        let mut buffer = StreamBuffer::new();
        buffer.push("Hello");
        buffer.push(" ");
        assert_eq!(buffer.accumulated(), "");
        assert!(buffer.flush());
        buffer.push("World");
        assert!(buffer.flush());
        assert_eq!(buffer.accumulated(), "Hello World");
        assert!(!buffer.flush());
    }

    #[test]
    fn test_fill_if_empty_keeps_partial_output() {
        let mut buffer = StreamBuffer::new();
        assert!(buffer.fill_if_empty("Error: boom"));
        buffer.reset();
        buffer.push("partial");
        buffer.flush();
        assert!(!buffer.fill_if_empty("Error: boom"));
        assert_eq!(buffer.accumulated(), "partial");
    }

    #[test]
    fn test_sender_fails_after_dispose() {
        let (sender, subscription) = subscription(1);
        assert!(sender.frame("data: a"));
        assert_eq!(
            subscription.try_next(),
            Some(StreamEvent::Frame("data: a".to_string()))
        );
        subscription.dispose();
        assert!(!sender.frame("data: b"));
        assert!(!sender.close());
    }

    #[test]
    fn test_dropped_senders_read_as_closed() {
        let (sender, subscription) = subscription(2);
        assert_eq!(subscription.try_next(), None);
        drop(sender);
        assert_eq!(subscription.try_next(), Some(StreamEvent::Closed));
    }

    #[test]
    fn test_sender_works_from_another_thread() {
        let (sender, subscription) = subscription(3);
        let handle = std::thread::spawn(move || {
            sender.frame("data: x");
            sender.close();
        });
        handle.join().expect("sender thread");
        assert_eq!(
            subscription.try_next(),
            Some(StreamEvent::Frame("data: x".to_string()))
        );
        assert_eq!(subscription.try_next(), Some(StreamEvent::Closed));
    }
}

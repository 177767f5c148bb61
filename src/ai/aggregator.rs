//! Single-flight aggregation of streamed completion text.

use super::envelope::{Frame, parse_frame};
use super::error::{AiError, TransportError};
use super::provider::{AiConfig, CompletionRequest};
use super::stream::{StreamBuffer, StreamEvent, Subscription, subscription};
use super::throttle::FlushThrottle;
use super::transport::CompletionTransport;

/// Tuning for [`StreamAggregator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Delay between the first unflushed piece and its flush
    pub flush_delay_ms: u64,
    /// Give up on a session still loading after this long (`None` waits forever)
    pub timeout_ms: Option<u64>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            flush_delay_ms: 60,
            timeout_ms: None,
        }
    }
}

/// What the UI renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamView<'a> {
    /// A request is in flight
    pub loading: bool,
    /// Text flushed so far, or the error message
    pub result_text: &'a str,
    /// Duration of the last finished session, 0 until one finishes
    pub elapsed_ms: u64,
}

#[derive(Debug)]
struct Session {
    id: u64,
    subscription: Option<Subscription>,
    started_ms: u64,
    timeout_due: Option<u64>,
    aborted: bool,
    finished: bool,
}

impl Session {
    fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.dispose();
        }
    }
}

/// Turns one streaming completion at a time into a growing result string.
///
/// The host calls [`invoke`](Self::invoke) to start a request and
/// [`poll`](Self::poll) from its event loop; poll drains the transport's
/// events, fires the flush timer, and reports whether [`view`](Self::view)
/// changed. Starting a request detaches the previous one first, so text
/// from two requests never mixes.
pub struct StreamAggregator<T> {
    transport: T,
    config: StreamConfig,
    buffer: StreamBuffer,
    throttle: FlushThrottle,
    session: Option<Session>,
    sessions_started: u64,
    loading: bool,
    elapsed_ms: Option<u64>,
    last_request: Option<(String, AiConfig)>,
}

impl<T: CompletionTransport> StreamAggregator<T> {
    /// Create an idle aggregator driving `transport`.
    pub fn new(transport: T, config: StreamConfig) -> Self {
        Self {
            transport,
            config,
            buffer: StreamBuffer::new(),
            throttle: FlushThrottle::new(config.flush_delay_ms),
            session: None,
            sessions_started: 0,
            loading: false,
            elapsed_ms: None,
            last_request: None,
        }
    }

    /// Current configuration.
    pub const fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport, e.g. to feed a test double.
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Snapshot for rendering.
    pub fn view(&self) -> StreamView<'_> {
        StreamView {
            loading: self.loading,
            result_text: self.buffer.accumulated(),
            elapsed_ms: self.elapsed_ms.unwrap_or(0),
        }
    }

    /// Returns true while a request is in flight.
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// Visible text.
    pub fn result_text(&self) -> &str {
        self.buffer.accumulated()
    }

    /// Text received but not yet visible.
    pub fn pending_text(&self) -> &str {
        self.buffer.pending()
    }

    /// Prompt of the most recent request.
    pub fn last_prompt(&self) -> Option<&str> {
        self.last_request.as_ref().map(|(prompt, _)| prompt.as_str())
    }

    /// Id of the current session, if one was started.
    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Returns true if the current session was aborted.
    pub fn is_aborted(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.aborted)
    }

    /// Start a completion for `prompt`, superseding any request in flight.
    ///
    /// A transport that fails to start is reported through the view, not
    /// the return value.
    ///
    /// # Errors
    /// Returns [`AiError::MissingCredential`] without calling the transport
    /// if the provider needs a key and none is configured.
    pub fn invoke(
        &mut self,
        prompt: impl Into<String>,
        config: &AiConfig,
        now_ms: u64,
    ) -> Result<(), AiError> {
        config.validate()?;
        let prompt = prompt.into();

        if let Some(mut previous) = self.session.take() {
            if !previous.finished && !previous.aborted {
                tracing::debug!(session = previous.id, "superseding in-flight completion");
            }
            previous.detach();
        }
        self.buffer.reset();
        self.throttle.cancel();
        self.loading = true;
        self.elapsed_ms = None;

        self.sessions_started += 1;
        let id = self.sessions_started;
        let (sender, subscription) = subscription(id);
        self.session = Some(Session {
            id,
            subscription: Some(subscription),
            started_ms: now_ms,
            timeout_due: self.config.timeout_ms.map(|t| now_ms.saturating_add(t)),
            aborted: false,
            finished: false,
        });

        let request = CompletionRequest::new(prompt.as_str(), config);
        tracing::debug!(
            session = id,
            provider = %config.provider,
            model = request.model(),
            "completion started"
        );
        crate::perf::log_event(
            "ai.invoke",
            format!(
                "session={id} provider={} prompt_len={}",
                config.provider,
                prompt.len()
            ),
        );
        self.last_request = Some((prompt, config.clone()));

        if let Err(err) = self.transport.start(request, sender) {
            self.fail(&err, now_ms);
        }
        Ok(())
    }

    /// Run the last prompt again with the settings it was sent with.
    ///
    /// Returns false if nothing has been sent yet.
    ///
    /// # Errors
    /// As for [`invoke`](Self::invoke).
    pub fn regenerate(&mut self, now_ms: u64) -> Result<bool, AiError> {
        let Some((prompt, config)) = self.last_request.clone() else {
            return Ok(false);
        };
        self.invoke(prompt, &config, now_ms)?;
        Ok(true)
    }

    /// Stop showing the current session's output.
    ///
    /// Text already received becomes visible; anything arriving later is
    /// dropped. The underlying request is not cancelled, but its sender
    /// starts reporting failed sends. Returns false if nothing was running.
    pub fn abort(&mut self, now_ms: u64) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.aborted || session.finished {
            return false;
        }
        session.aborted = true;
        session.detach();
        let elapsed = now_ms.saturating_sub(session.started_ms);
        tracing::debug!(session = session.id, "completion aborted");

        self.buffer.flush();
        self.throttle.cancel();
        self.loading = false;
        self.elapsed_ms.get_or_insert(elapsed);
        true
    }

    /// Process queued transport events and due timers.
    ///
    /// Returns true if the view changed.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        let mut changed = false;
        while let Some(event) = self.next_event() {
            changed |= self.handle(event, now_ms);
        }
        if self.throttle.take_ready(now_ms) && self.buffer.flush() {
            crate::perf::log_event(
                "ai.flush",
                format!("visible_len={}", self.buffer.accumulated().len()),
            );
            changed = true;
        }
        if let Some(timeout_ms) = self.config.timeout_ms
            && self.timeout_due(now_ms)
        {
            changed |= self.fail(&TransportError::timed_out(timeout_ms), now_ms);
        }
        changed
    }

    /// Detach from the current session and stop loading, e.g. when the
    /// result panel is torn down.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.detach();
        }
        self.throttle.cancel();
        self.loading = false;
    }

    /// When [`poll`](Self::poll) next has timer work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        let timeout = self
            .session
            .as_ref()
            .filter(|_| self.loading)
            .and_then(|s| s.timeout_due);
        match (self.throttle.deadline(), timeout) {
            (Some(flush), Some(timeout)) => Some(flush.min(timeout)),
            (flush, timeout) => flush.or(timeout),
        }
    }

    /// # Errors
    /// Returns [`AiError::Transport`] if the service is unreachable.
    pub fn test_connection(&mut self, config: &AiConfig) -> Result<String, AiError> {
        Ok(self.transport.test_connection(config)?)
    }

    /// # Errors
    /// Returns [`AiError::Transport`] if the listing cannot be fetched.
    pub fn list_models(&mut self, config: &AiConfig) -> Result<Vec<String>, AiError> {
        Ok(self.transport.list_models(config)?)
    }

    fn next_event(&self) -> Option<StreamEvent> {
        self.session.as_ref()?.subscription.as_ref()?.try_next()
    }

    fn handle(&mut self, event: StreamEvent, now_ms: u64) -> bool {
        match event {
            StreamEvent::Frame(payload) => match parse_frame(&payload) {
                Frame::Piece(piece) => {
                    self.buffer.push(&piece);
                    self.throttle.schedule(now_ms);
                    false
                }
                Frame::Done => self.settle(now_ms),
                Frame::Skip => {
                    tracing::trace!(payload = %payload, "stream frame skipped");
                    false
                }
            },
            StreamEvent::Failed(err) => self.fail(&err, now_ms),
            StreamEvent::Closed => self.settle(now_ms),
        }
    }

    fn timeout_due(&self, now_ms: u64) -> bool {
        self.loading
            && self
                .session
                .as_ref()
                .and_then(|s| s.timeout_due)
                .is_some_and(|due| due <= now_ms)
    }

    /// Terminal marker or resolved request: final flush, stop loading.
    fn settle(&mut self, now_ms: u64) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.finished {
            return false;
        }
        session.finished = true;
        session.detach();
        let elapsed = now_ms.saturating_sub(session.started_ms);
        tracing::debug!(session = session.id, elapsed_ms = elapsed, "completion finished");

        self.buffer.flush();
        self.throttle.cancel();
        self.loading = false;
        self.elapsed_ms.get_or_insert(elapsed);
        true
    }

    fn fail(&mut self, err: &TransportError, now_ms: u64) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.finished {
            return false;
        }
        session.finished = true;
        session.detach();
        let aborted = session.aborted;
        let elapsed = now_ms.saturating_sub(session.started_ms);
        tracing::warn!(session = session.id, error = %err, "completion failed");

        self.buffer.flush();
        self.throttle.cancel();
        if !aborted {
            self.buffer.fill_if_empty(format!("Error: {err}"));
        }
        self.loading = false;
        self.elapsed_ms.get_or_insert(elapsed);
        true
    }
}

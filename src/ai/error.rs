//! Errors surfaced by the AI module.

use thiserror::Error;

use super::provider::Provider;

/// Failures that reach the caller of the AI operations.
///
/// Frame parse failures never show up here; they are skipped inside the
/// aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiError {
    /// The provider needs an API key and none is configured.
    #[error("no API key configured for {provider}; add one in the AI settings")]
    MissingCredential { provider: Provider },

    /// A selection-scoped action was run with nothing selected.
    #[error("select the text to process before running this action")]
    EmptySelection,

    /// The completion service could not be reached or rejected the call.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A network or service failure reported by a completion transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error a session gets when it outlives its timeout.
    pub fn timed_out(timeout_ms: u64) -> Self {
        Self::new(format!("request timed out after {timeout_ms} ms"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

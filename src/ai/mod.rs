//! Streaming AI completion.
//!
//! A [`CompletionTransport`] talks to the completion service and relays the
//! upstream event stream over a per-session channel. The
//! [`StreamAggregator`] consumes that channel, decodes each event with
//! [`parse_frame`], and coalesces pieces through a [`FlushThrottle`] so the
//! UI updates at a bounded rate however fast the network is.
//!
//! ```
//! use marksync::ai::{
//!     AiConfig, CompletionRequest, CompletionTransport, Provider, StreamAggregator,
//!     StreamConfig, StreamSender, TransportError,
//! };
//!
//! /// Replies with a canned answer.
//! struct Canned;
//!
//! impl CompletionTransport for Canned {
//!     fn start(&mut self, _: CompletionRequest, tx: StreamSender) -> Result<(), TransportError> {
//!         tx.frame(r#"data: {"choices":[{"delta":{"content":"Hi there"}}]}"#);
//!         tx.frame("data: [DONE]");
//!         Ok(())
//!     }
//!     fn test_connection(&mut self, _: &AiConfig) -> Result<String, TransportError> {
//!         Ok("ok".into())
//!     }
//!     fn list_models(&mut self, _: &AiConfig) -> Result<Vec<String>, TransportError> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! let mut ai = StreamAggregator::new(Canned, StreamConfig::default());
//! ai.invoke("Say hi", &AiConfig::for_provider(Provider::Ollama), 0).unwrap();
//! ai.poll(5);
//! assert_eq!(ai.view().result_text, "Hi there");
//! assert!(!ai.view().loading);
//! ```

mod aggregator;
mod envelope;
mod error;
mod prompt;
mod provider;
mod sse;
mod stream;
mod throttle;
mod transport;

pub use aggregator::{StreamAggregator, StreamConfig, StreamView};
pub use envelope::{DATA_PREFIX, DONE_MARKER, Envelope, Frame, parse_frame};
pub use error::{AiError, TransportError};
pub use prompt::{
    AiAction, CustomTemplate, Scope, SourceText, TemplateContext, TemplateVars, build_prompt,
};
pub use provider::{
    AiConfig, ChatMessage, CompletionRequest, Provider, join_base_and_v1_path, model_ids,
};
pub use sse::SseDecoder;
pub use stream::{StreamBuffer, StreamEvent, StreamSender, Subscription, subscription};
pub use throttle::{FlushState, FlushThrottle};
pub use transport::CompletionTransport;

#[cfg(test)]
mod tests;

use super::error::TransportError;
use super::provider::{AiConfig, CompletionRequest};
use super::stream::StreamSender;

/// The completion service seam.
///
/// Implementations own the network. `start` returns once the request is
/// under way (or has failed to start); progress is reported through
/// `sender`, finishing with a terminal frame and/or [`StreamSender::close`].
/// Synchronous implementations may send everything before returning.
pub trait CompletionTransport {
    /// Begin one streaming completion.
    ///
    /// # Errors
    /// Returns an error if the request could not be issued at all.
    fn start(&mut self, request: CompletionRequest, sender: StreamSender)
    -> Result<(), TransportError>;

    /// Cheap reachability check, returning a message for the user.
    ///
    /// # Errors
    /// Returns an error if the service is unreachable or rejects the key.
    fn test_connection(&mut self, config: &AiConfig) -> Result<String, TransportError>;

    /// Model ids the service offers.
    ///
    /// # Errors
    /// Returns an error if the listing cannot be fetched.
    fn list_models(&mut self, config: &AiConfig) -> Result<Vec<String>, TransportError>;
}

use std::pin::Pin;
use std::time::Duration;

use crate::errors::{ProviderError, RelayError};
use crate::model::{ConversationMessage, ModelRef, ProviderId};

/// Stream of normalized events produced by one upstream call.
pub type ProviderEventStream =
    Pin<Box<dyn futures::Stream<Item = Result<ProviderEvent, ProviderError>> + Send + 'static>>;

/// Resolved request handed to a provider adapter.
#[derive(Clone, Debug)]
pub struct ProviderRequest {
    pub request_id: uuid::Uuid,
    pub model: ModelRef,
    /// Full conversation, oldest first.
    pub messages: Vec<ConversationMessage>,
    /// Upper bound for the whole upstream call.
    pub timeout: Option<Duration>,
}

/// One normalized increment decoded from an upstream stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Incremental text. Adapters never emit empty deltas.
    TextDelta { text: String },
    /// An increment that could not be decoded and was skipped.
    Malformed { reason: String },
    /// Upstream signalled the end of the reply.
    Completed,
}

/// Open upstream stream. Dropping it closes the upstream connection.
pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
}

/// Contract every upstream vendor integration implements.
///
/// `start_stream` resolves once the upstream has accepted the call; the
/// returned stream then yields increments until completion, close, or error.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Rejects conversations this upstream is known to refuse. Runs before
    /// any connection is opened, so the caller gets an error instead of an
    /// empty stream.
    fn check_request(&self, _messages: &[ConversationMessage]) -> Result<(), RelayError> {
        Ok(())
    }

    async fn start_stream(&self, req: ProviderRequest)
    -> Result<ProviderStreamHandle, ProviderError>;
}

//! Streaming chat relay: forwards a conversation to an upstream LLM provider
//! and re-emits its incremental text as normalized `OutputEvent`s.
//!
//! Vendor-specific APIs are namespaced under `vendors::*`.
//!
//! # Usage (OpenAI)
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use muxchat_relay::prelude::*;
//! use muxchat_relay::vendors::openai::OpenAiProvider;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), RelayError> {
//! let relay = Relay::builder()
//!     .register_provider(Arc::new(OpenAiProvider::from_env()?))
//!     .build()?;
//!
//! let mut stream = relay.transcode(
//!     ChatRequest::new(vec![ConversationMessage::user("Say hello")]).model("gpt-4o"),
//! )?;
//! while let Some(event) = stream.next_event().await {
//!     match event {
//!         OutputEvent::Text { text } => print!("{text}"),
//!         OutputEvent::Done => println!(),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Public model ids and their upstream targets.
pub mod catalog;
/// Public error types used by the relay API.
pub mod errors;
/// Stream counters.
pub mod metrics;
/// Conversation, request and provider identifiers plus relay options.
pub mod model;
/// Common imports for typical usage.
pub mod prelude;
/// Provider adapter contracts used by vendor integrations.
pub mod provider;
/// Relay entry point and builder.
pub mod relay;
/// Normalized outbound events.
pub mod stream;
/// Transcoder task and the stream handed to consumers.
pub mod transcode;
/// Vendor-specific integrations.
pub mod vendors;

pub use catalog::{CatalogEntry, ModelCatalog, ModelInfo};
pub use errors::{ProviderError, RelayError, StreamFailure};
pub use metrics::{MetricsSnapshot, RelayMetrics};
pub use model::{ChatRequest, ConversationMessage, ModelRef, ProviderId, RelayOptions, Role};
pub use provider::{
    ProviderAdapter, ProviderEvent, ProviderEventStream, ProviderRequest, ProviderStreamHandle,
};
pub use relay::{Relay, RelayBuilder};
pub use stream::{DONE_MARKER, OutputEvent};
pub use transcode::{AbortHandle, TranscodeStream};

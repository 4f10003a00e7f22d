//! Common imports for typical relay usage.
pub use crate::{
    AbortHandle, ChatRequest, ConversationMessage, ModelCatalog, ModelRef, OutputEvent,
    ProviderId, Relay, RelayBuilder, RelayError, Role, TranscodeStream,
};

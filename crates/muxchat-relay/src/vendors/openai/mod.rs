//! OpenAI Chat Completions integration.
mod adapter;
mod config;
pub(crate) mod transport;

pub use adapter::OpenAiProvider;
pub use config::OpenAiClientConfig;

pub(crate) const OPENAI_PROVIDER: &str = "openai";

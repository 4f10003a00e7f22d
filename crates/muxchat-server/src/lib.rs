//! HTTP front end for the muxchat relay.
//!
//! `POST /chat` streams `data:` frames ending with `data: [DONE]`;
//! `/health`, `/models` and `/metrics` are read-only JSON endpoints.

pub mod config;
pub mod observability;
pub mod server;

pub use config::{ProviderCredentials, ServerConfig, build_relay, load_env};
pub use observability::init_observability;
pub use server::{ApiError, REQUEST_ID_HEADER, ServerError, router, serve};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use muxchat_relay::vendors::anthropic::{AnthropicClientConfig, AnthropicProvider};
use muxchat_relay::vendors::google::{GoogleClientConfig, GoogleProvider};
use muxchat_relay::vendors::openai::{OpenAiClientConfig, OpenAiProvider};
use muxchat_relay::{Relay, RelayError};
use tracing::info;

/// Load `.env` from the crate directory, then from the working directory.
pub fn load_env() {
    let _ = dotenvy::from_path(Path::new(
        format!("{}/.env", env!("CARGO_MANIFEST_DIR")).as_str(),
    ));
    dotenvy::dotenv().ok();
}

/// Listener and timeout settings, from flags or `MUXCHAT_*` variables.
#[derive(Clone, Debug, clap::Parser)]
#[command(name = "muxchat-server", version, about = "Relay chat completions as server-sent events")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "MUXCHAT_HOST", default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, env = "MUXCHAT_PORT", default_value_t = 8000)]
    pub port: u16,
    /// Upper bound on one upstream call, in seconds.
    #[arg(long, env = "MUXCHAT_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,
    /// Longest silence tolerated between upstream chunks, in seconds.
    #[arg(long, env = "MUXCHAT_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: Option<u64>,
}

/// Upstream credentials. A provider is configured only when its key is set.
#[derive(Clone, Debug, Default)]
pub struct ProviderCredentials {
    pub openai: Option<OpenAiClientConfig>,
    pub anthropic: Option<AnthropicClientConfig>,
    pub google: Option<GoogleClientConfig>,
}

impl ProviderCredentials {
    /// Reads `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GOOGLE_API_KEY` and their
    /// `*_BASE_URL` overrides.
    pub fn from_env() -> Self {
        Self {
            openai: OpenAiClientConfig::from_env().ok(),
            anthropic: AnthropicClientConfig::from_env().ok(),
            google: GoogleClientConfig::from_env().ok(),
        }
    }
}

/// Builds the relay with every configured provider registered.
pub fn build_relay(
    config: &ServerConfig,
    credentials: &ProviderCredentials,
) -> Result<Relay, RelayError> {
    let mut builder =
        Relay::builder().request_timeout(Duration::from_secs(config.request_timeout_secs));
    if let Some(secs) = config.idle_timeout_secs {
        builder = builder.idle_timeout(Duration::from_secs(secs));
    }
    if let Some(openai) = &credentials.openai {
        builder = builder.register_provider(Arc::new(OpenAiProvider::new(openai.clone())?));
    }
    if let Some(anthropic) = &credentials.anthropic {
        builder = builder.register_provider(Arc::new(AnthropicProvider::new(anthropic.clone())?));
    }
    if let Some(google) = &credentials.google {
        builder = builder.register_provider(Arc::new(GoogleProvider::new(google.clone())?));
    }
    let relay = builder.build()?;

    for provider in ["openai", "anthropic", "google"] {
        let configured = relay.has_provider(&provider.into());
        info!(provider, configured, "upstream provider");
    }
    Ok(relay)
}

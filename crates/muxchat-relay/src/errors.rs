use crate::model::ProviderId;

/// Errors returned by a provider adapter before they are folded into the
/// terminal event of a transcoded stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Provider answered with an application-level failure (HTTP status, auth, etc.).
    #[error("provider error ({provider}): {message}")]
    Provider {
        provider: ProviderId,
        message: String,
        status_code: Option<u16>,
    },
    /// Connection, DNS, TLS or stream I/O failed.
    #[error("transport error ({provider}): {message}")]
    Transport {
        provider: ProviderId,
        message: String,
    },
    /// Provider response shape or event sequencing was unusable as a whole.
    #[error("protocol error ({provider}): {message}")]
    Protocol {
        provider: ProviderId,
        message: String,
    },
    /// No data arrived within the bounded window.
    #[error("timeout ({provider}): {message}")]
    Timeout {
        provider: ProviderId,
        message: String,
    },
}

impl ProviderError {
    /// Creates a provider-level error.
    pub fn provider(
        provider: impl Into<ProviderId>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Protocol {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Timeout {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classifies a reqwest failure, keeping timeouts apart from other transport errors.
    pub fn from_reqwest(provider: impl Into<ProviderId>, context: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(provider, format!("{context}: {err}"))
        } else {
            Self::transport(provider, format!("{context}: {err}"))
        }
    }

    /// Returns the provider associated with this error.
    pub fn provider_id(&self) -> &ProviderId {
        match self {
            Self::Provider { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Protocol { provider, .. }
            | Self::Timeout { provider, .. } => provider,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Provider { message, .. }
            | Self::Transport { message, .. }
            | Self::Protocol { message, .. }
            | Self::Timeout { message, .. } => message,
        }
    }
}

/// Reason a transcoded stream ended before the upstream signalled completion.
///
/// Only observable through logs and metrics; the client always sees the
/// terminal sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFailure {
    /// Upstream could not be reached or rejected the call.
    UpstreamUnavailable,
    /// Upstream stream was unusable as a whole.
    UpstreamProtocol,
    /// Request deadline or idle window elapsed.
    UpstreamTimeout,
    /// Consumer went away or aborted the stream.
    Cancelled,
}

impl From<&ProviderError> for StreamFailure {
    fn from(err: &ProviderError) -> Self {
        match err {
            ProviderError::Provider { .. } | ProviderError::Transport { .. } => {
                Self::UpstreamUnavailable
            }
            ProviderError::Protocol { .. } => Self::UpstreamProtocol,
            ProviderError::Timeout { .. } => Self::UpstreamTimeout,
        }
    }
}

/// Top-level error type for the public relay API.
///
/// Every variant is raised before an upstream connection is opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Invalid relay/provider configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Request failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Requested model id is not in the catalog.
    #[error("unknown model: {model}")]
    UnknownModel { model: String },
    /// Model is known but none of its providers is configured.
    #[error("no configured provider for model {model}")]
    ProviderUnavailable { model: String },
}

impl RelayError {
    /// Whether the caller sent something that can never succeed as-is.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::UnknownModel { .. })
    }
}

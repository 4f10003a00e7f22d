use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::catalog::{ModelCatalog, ModelInfo};
use crate::errors::RelayError;
use crate::metrics::{MetricsSnapshot, RelayMetrics};
use crate::model::{ChatRequest, ProviderId, RelayOptions};
use crate::provider::{ProviderAdapter, ProviderRequest};
use crate::transcode::TranscodeStream;

pub(crate) struct RelayInner {
    providers: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
    catalog: ModelCatalog,
    options: RelayOptions,
    metrics: Arc<RelayMetrics>,
}

impl RelayInner {
    pub(crate) fn provider(&self, id: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(id).cloned()
    }
}

/// Entry point for transcoding chat requests.
///
/// Cheap to clone; all clones share providers, catalog and metrics.
#[derive(Clone)]
pub struct Relay {
    pub(crate) inner: Arc<RelayInner>,
}

impl Relay {
    /// Starts a builder for registering providers and creating a `Relay`.
    pub fn builder() -> RelayBuilder {
        RelayBuilder::default()
    }

    /// Validates `request`, resolves its model and starts the upstream stream.
    ///
    /// Every error is raised before an upstream connection is opened. Upstream
    /// failures after this point only end the returned stream.
    pub fn transcode(&self, request: ChatRequest) -> Result<TranscodeStream, RelayError> {
        if request.messages.is_empty() {
            return Err(RelayError::InvalidRequest(
                "messages must not be empty".into(),
            ));
        }
        let model = self
            .inner
            .catalog
            .resolve(request.model.trim(), |id| self.inner.providers.contains_key(id))?;
        let provider = self
            .inner
            .provider(&model.provider)
            .ok_or_else(|| RelayError::ProviderUnavailable {
                model: request.model.clone(),
            })?;

        provider.check_request(&request.messages)?;

        let provider_request = ProviderRequest {
            request_id: uuid::Uuid::new_v4(),
            model,
            messages: request.messages,
            timeout: Some(self.inner.options.request_timeout),
        };
        debug!(
            request_id = %provider_request.request_id,
            requested = %request.model,
            provider = %provider_request.model.provider,
            model = %provider_request.model.model,
            "resolved chat model"
        );
        Ok(TranscodeStream::spawn(
            provider,
            provider_request,
            self.inner.options.clone(),
            self.inner.metrics.clone(),
        ))
    }

    /// Lists the catalog with per-entry availability.
    pub fn models(&self) -> Vec<ModelInfo> {
        self.inner
            .catalog
            .describe(|id| self.inner.providers.contains_key(id))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn has_provider(&self, id: &ProviderId) -> bool {
        self.inner.providers.contains_key(id)
    }
}

/// Builder used to register provider adapters before creating a `Relay`.
#[derive(Default)]
pub struct RelayBuilder {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    catalog: Option<ModelCatalog>,
    options: RelayOptions,
}

impl RelayBuilder {
    /// Registers a provider adapter.
    ///
    /// Register one adapter per provider id (for example one `openai` adapter).
    pub fn register_provider(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Replaces the default model catalog.
    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn options(mut self, options: RelayOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the upper bound on one upstream call.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    /// Sets the longest silence tolerated between two upstream chunks.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.options.idle_timeout = Some(timeout);
        self
    }

    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.stream_buffer_capacity = capacity;
        self
    }

    /// Builds the relay and validates provider registration (including duplicates).
    pub fn build(self) -> Result<Relay, RelayError> {
        if self.options.stream_buffer_capacity == 0 {
            return Err(RelayError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        if self.options.request_timeout.is_zero() {
            return Err(RelayError::Config(
                "request_timeout must be greater than 0".into(),
            ));
        }
        let mut providers: HashMap<ProviderId, Arc<dyn ProviderAdapter>> = HashMap::new();
        for provider in self.providers {
            let id = provider.id();
            if providers.contains_key(&id) {
                return Err(RelayError::Config(format!(
                    "duplicate provider registration: {id}"
                )));
            }
            providers.insert(id, provider);
        }
        Ok(Relay {
            inner: Arc::new(RelayInner {
                providers,
                catalog: self.catalog.unwrap_or_default(),
                options: self.options,
                metrics: Arc::new(RelayMetrics::default()),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::model::ConversationMessage;
    use crate::provider::ProviderStreamHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        id: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ProviderAdapter for CountingProvider {
        fn id(&self) -> ProviderId {
            ProviderId::new(self.id)
        }

        async fn start_stream(
            &self,
            _req: ProviderRequest,
        ) -> Result<ProviderStreamHandle, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderStreamHandle {
                stream: Box::pin(futures::stream::empty()),
            })
        }
    }

    fn relay_with(id: &'static str, calls: Arc<AtomicUsize>) -> Relay {
        Relay::builder()
            .register_provider(Arc::new(CountingProvider { id, calls }))
            .build()
            .expect("build relay")
    }

    #[test]
    fn build_rejects_duplicate_provider_ids() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = Relay::builder()
            .register_provider(Arc::new(CountingProvider {
                id: "openai",
                calls: calls.clone(),
            }))
            .register_provider(Arc::new(CountingProvider {
                id: "openai",
                calls,
            }))
            .build();
        assert!(
            matches!(result, Err(RelayError::Config(message)) if message.contains("duplicate provider"))
        );
    }

    #[test]
    fn build_rejects_zero_buffer_capacity() {
        let result = Relay::builder().stream_buffer_capacity(0).build();
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[tokio::test]
    async fn empty_conversation_is_rejected_before_any_upstream_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let relay = relay_with("openai", calls.clone());
        let result = relay.transcode(ChatRequest::new(Vec::new()));
        assert!(matches!(result, Err(RelayError::InvalidRequest(msg)) if msg.contains("empty")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(relay.metrics().streams_started, 0);
    }

    #[tokio::test]
    async fn unknown_model_is_rejected_before_any_upstream_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let relay = relay_with("openai", calls.clone());
        let result = relay
            .transcode(ChatRequest::new(vec![ConversationMessage::user("Hi")]).model("llama-9"));
        assert!(matches!(result, Err(RelayError::UnknownModel { model }) if model == "llama-9"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_of_unconfigured_provider_is_unavailable() {
        let relay = relay_with("openai", Arc::new(AtomicUsize::new(0)));
        let result = relay.transcode(
            ChatRequest::new(vec![ConversationMessage::user("Hi")]).model("gemini-pro"),
        );
        assert!(matches!(
            result,
            Err(RelayError::ProviderUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn auto_routes_to_the_configured_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let relay = relay_with("anthropic", calls.clone());
        let stream = relay
            .transcode(ChatRequest::new(vec![ConversationMessage::user("Hi")]))
            .expect("transcode");
        assert_eq!(stream.model().provider.as_str(), "anthropic");
        assert_eq!(stream.collect_text().await, "");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn models_lists_catalog_with_availability() {
        let relay = relay_with("openai", Arc::new(AtomicUsize::new(0)));
        let models = relay.models();
        assert_eq!(models.len(), 4);
        assert!(
            models
                .iter()
                .any(|info| info.id == "gpt-4o" && info.available)
        );
        assert!(
            models
                .iter()
                .any(|info| info.id == "claude-3-5-sonnet" && !info.available)
        );
    }
}

use crate::errors::RelayError;
use crate::model::{ModelRef, ProviderId};

/// One public model id and the upstream models it may resolve to, in order
/// of preference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: String,
    pub candidates: Vec<ModelRef>,
}

/// Public view of a catalog entry, as listed to clients.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: ProviderId,
    pub model: String,
    /// Whether a provider for this entry is configured.
    pub available: bool,
}

/// Table from public model ids to upstream models.
///
/// Lookup is exact; ids not in the table are rejected rather than defaulted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelCatalog {
    entries: Vec<CatalogEntry>,
}

impl ModelCatalog {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds or replaces an entry.
    pub fn with_model(mut self, id: impl Into<String>, candidates: Vec<ModelRef>) -> Self {
        let id = id.into();
        self.entries.retain(|entry| entry.id != id);
        self.entries.push(CatalogEntry { id, candidates });
        self
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Resolves `id` to the first candidate whose provider is available.
    pub fn resolve(
        &self,
        id: &str,
        is_available: impl Fn(&ProviderId) -> bool,
    ) -> Result<ModelRef, RelayError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .ok_or_else(|| RelayError::UnknownModel {
                model: id.to_string(),
            })?;
        entry
            .candidates
            .iter()
            .find(|candidate| is_available(&candidate.provider))
            .cloned()
            .ok_or_else(|| RelayError::ProviderUnavailable {
                model: id.to_string(),
            })
    }

    /// Lists every entry with the model it currently resolves to (or its first
    /// candidate when none is available).
    pub fn describe(&self, is_available: impl Fn(&ProviderId) -> bool) -> Vec<ModelInfo> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let resolved = entry
                    .candidates
                    .iter()
                    .find(|candidate| is_available(&candidate.provider));
                let shown = resolved.or_else(|| entry.candidates.first())?;
                Some(ModelInfo {
                    id: entry.id.clone(),
                    provider: shown.provider.clone(),
                    model: shown.model.clone(),
                    available: resolved.is_some(),
                })
            })
            .collect()
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        let gpt = ModelRef::new("openai", "gpt-4o");
        let claude = ModelRef::new("anthropic", "claude-3-5-sonnet-latest");
        let gemini = ModelRef::new("google", "gemini-1.5-pro");
        Self::empty()
            .with_model("auto", vec![gpt.clone(), claude.clone(), gemini.clone()])
            .with_model("gpt-4o", vec![gpt])
            .with_model("claude-3-5-sonnet", vec![claude])
            .with_model("gemini-pro", vec![gemini])
    }
}

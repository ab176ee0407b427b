//! Backend-reported provider identification
//!
//! Metadata chunks may describe which provider, model and orchestrator
//! generate the current response. The dispatcher keeps the last descriptor
//! in a [`ProviderProfile`] and reports a change only when one of the three
//! names differs from the cached value.

use crate::config::ProviderKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Snapshot of the provider names, as shown to consumers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub provider: String,
    pub model: String,
    pub orchestrator: String,
}

impl ProviderInfo {
    pub fn is_known(&self) -> bool {
        !self.provider.is_empty()
    }
}

/// Cached provider state derived from metadata chunks
#[derive(Debug, Clone, Default)]
pub struct ProviderProfile {
    info: ProviderInfo,
    kind: ProviderKind,
}

impl ProviderProfile {
    pub fn info(&self) -> &ProviderInfo {
        &self.info
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Merge a provider descriptor, returning `true` if anything changed
    ///
    /// Recognised keys are `provider`, `model` and `orchestrator_type` (or
    /// `orchestrator`). A descriptor without a `provider` key is ignored.
    pub fn update(&mut self, descriptor: &Map<String, Value>) -> bool {
        let Some(provider) = descriptor.get("provider").and_then(Value::as_str) else {
            return false;
        };
        let model = descriptor
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let orchestrator = descriptor
            .get("orchestrator_type")
            .or_else(|| descriptor.get("orchestrator"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let next = ProviderInfo {
            provider: provider.to_string(),
            model: model.to_string(),
            orchestrator: orchestrator.to_string(),
        };
        if next == self.info {
            return false;
        }

        self.kind = ProviderKind::from_name(&next.provider);
        self.info = next;
        true
    }
}

/// Find a provider descriptor inside a metadata chunk
///
/// Backends nest it under `metadata.provider_info`, put it directly in
/// `metadata`, or send it as the chunk `data` object.
pub fn find_descriptor<'a>(
    data: &'a Value,
    metadata: &'a Map<String, Value>,
) -> Option<&'a Map<String, Value>> {
    if let Some(nested) = metadata.get("provider_info").and_then(Value::as_object) {
        return Some(nested);
    }
    if metadata.contains_key("provider") {
        return Some(metadata);
    }
    data.as_object().filter(|obj| obj.contains_key("provider"))
}

//! Upstream LLM provider adapters.
//!
//! Each adapter translates a [`GenerationRequest`] into one provider's wire
//! format and back. The orchestrator only ever sees the [`ModelAdapter`]
//! trait and a stream of plain text deltas.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod prompt;
pub mod sse;
pub mod types;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

pub use prompt::build_prompt;
pub use types::{
    GenerationOptions, GenerationRequest, GenerationResponse, Provider, RequestContext,
};

/// Errors surfaced by provider adapters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    #[error("{0} API key is required")]
    MissingKey(Provider),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("upstream returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// A finite stream of text deltas from an upstream model.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, AdapterError>> + Send>>;

/// Trait all provider adapters implement.
///
/// Async methods return boxed futures so the trait is dyn-compatible (usable
/// as `Arc<dyn ModelAdapter>`). No `async_trait` macro is needed.
pub trait ModelAdapter: Send + Sync {
    /// The provider this adapter speaks to.
    fn provider(&self) -> Provider;

    /// Blocking generation: the full output text in one response.
    fn generate(
        &self,
        req: &GenerationRequest,
        api_key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<GenerationResponse, AdapterError>> + Send + '_>>;

    /// Streaming generation: a lazy stream of text deltas. The upstream
    /// request is not issued until the returned future is awaited.
    fn generate_stream(
        &self,
        req: &GenerationRequest,
        api_key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream, AdapterError>> + Send + '_>>;
}

/// Adapter lookup keyed on the provider tag.
///
/// Defaults to the three real HTTP adapters; tests swap in mocks.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: std::collections::HashMap<Provider, Arc<dyn ModelAdapter>>,
}

impl AdapterRegistry {
    /// Registry wired to the real upstream APIs.
    pub fn with_http_adapters() -> Self {
        let client = reqwest::Client::new();
        let mut registry = Self::empty();
        registry.register(Arc::new(openai::OpenAiAdapter::new(client.clone())));
        registry.register(Arc::new(anthropic::AnthropicAdapter::new(client.clone())));
        registry.register(Arc::new(gemini::GeminiAdapter::new(client)));
        registry
    }

    pub fn empty() -> Self {
        Self {
            adapters: std::collections::HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ModelAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn adapter_for(&self, provider: Provider) -> Option<Arc<dyn ModelAdapter>> {
        self.adapters.get(&provider).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_registry_covers_all_providers() {
        let registry = AdapterRegistry::with_http_adapters();
        for provider in Provider::ALL {
            let adapter = registry.adapter_for(provider).unwrap();
            assert_eq!(adapter.provider(), provider);
        }
    }

    #[test]
    fn test_empty_registry_has_no_adapters() {
        let registry = AdapterRegistry::empty();
        assert!(registry.adapter_for(Provider::OpenAi).is_none());
    }
}

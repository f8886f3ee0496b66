//! OpenRouter driver: the generic HTTP driver pointed at openrouter.ai, with
//! per-call cost surfaced through the usage chunk.

use async_trait::async_trait;

use llm_config::ProviderConfig;

use super::{ChunkStream, HttpProvider, ProviderDriver, ProviderError, ProviderRequest};

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter chat-completions driver.
///
/// OpenRouter reports the call cost in the final usage payload; the inner
/// HTTP driver parses it into `usage.cost_usd`.
pub struct OpenRouterProvider {
    inner: HttpProvider,
}

impl OpenRouterProvider {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            inner: HttpProvider::new("openrouter", model)
                .with_base_url(OPENROUTER_BASE_URL)
                .with_api_key(api_key),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        let mut cfg = config.clone();
        if cfg.base_url.is_none() {
            cfg.base_url = Some(OPENROUTER_BASE_URL.to_string());
        }
        Self {
            inner: HttpProvider::from_config(&cfg),
        }
    }
}

#[async_trait]
impl ProviderDriver for OpenRouterProvider {
    fn provider_id(&self) -> &str {
        "openrouter"
    }

    async fn open_stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        self.inner.open_stream(request).await
    }
}

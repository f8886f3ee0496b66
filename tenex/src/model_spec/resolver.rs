//! Resolver trait: look up a model's spec by provider and model id.

use async_trait::async_trait;

use model_spec_core::ModelSpec;

/// Resolves a model's spec. `None` means the model is unknown to this source.
#[async_trait]
pub trait ModelSpecResolver: Send + Sync {
    async fn resolve(&self, provider_id: &str, model_id: &str) -> Option<ModelSpec>;
}

//! Model spec resolution: context windows and costs from models.dev or a cache.
//!
//! The service asks the resolver for the active model's [`ModelSpec`] at
//! finalization to attach the declared context window to usage. Refresh is
//! asynchronous and additive: [`CachedResolver::refresh`] merges a freshly
//! fetched map into the cache and resolution never blocks on it.

mod cached;
mod models_dev;
mod refresher;
mod resolver;

pub use cached::CachedResolver;
pub use models_dev::{HttpClient, ModelsDevResolver, ReqwestHttpClient, DEFAULT_MODELS_DEV_URL};
pub use refresher::SpecRefresher;
pub use resolver::ModelSpecResolver;

pub use model_spec_core::ModelSpec;

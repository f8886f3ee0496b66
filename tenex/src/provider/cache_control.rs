//! Explicit prompt-cache markers for backends that require them.

use crate::message::{CacheControl, Role};

use super::ProviderRequest;

/// System messages at or below this length are not worth a cache marker.
pub const CACHE_SYSTEM_PROMPT_MIN_CHARS: usize = 4096;

/// Providers whose wire protocol requires explicit cache markers.
fn requires_cache_markers(provider_id: &str) -> bool {
    matches!(provider_id, "anthropic")
}

/// Attaches an ephemeral cache marker to each system message exceeding
/// [`CACHE_SYSTEM_PROMPT_MIN_CHARS`].
///
/// Applies to providers that require explicit markers, or when the request
/// opts in via `enable_caching`. Silent no-op otherwise.
pub fn apply_cache_control(request: &mut ProviderRequest, provider_id: &str) {
    if !requires_cache_markers(provider_id) && !request.options.enable_caching {
        return;
    }
    for message in &mut request.messages {
        if message.role == Role::System
            && message.as_text().chars().count() > CACHE_SYSTEM_PROMPT_MIN_CHARS
        {
            message.cache_control = Some(CacheControl::Ephemeral);
        }
    }
}

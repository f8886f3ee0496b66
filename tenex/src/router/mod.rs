//! Router: resolve abstract config names or role defaults to a concrete
//! provider config.
//!
//! Resolution order per request: the agent's own default → the requested
//! name as a defaults key → the requested name as a direct config → the
//! first of the {agents, analyze, orchestrator} defaults → the first
//! available config (lexicographic, so resolution is deterministic).
//! The table is immutable between reloads; a reload builds the full new
//! table and swaps it atomically, so no reader observes a half-updated
//! router.

use std::sync::{Arc, RwLock};

use thiserror::Error;

use llm_config::{ProviderConfig, RouterConfig};

use crate::provider::RequestOptions;

/// Roles probed, in order, when a request names no config.
const FALLBACK_ROLES: [&str; 3] = ["agents", "analyze", "orchestrator"];

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("No LLM configuration found for key: {0}")]
    NotFound(String),
    #[error("No LLM configurations available")]
    NoConfigs,
}

/// Per-request resolution context.
#[derive(Clone, Debug, Default)]
pub struct ResolveContext {
    /// Explicit config name or role.
    pub config_name: Option<String>,
    /// Requesting agent; its defaults entry wins when present.
    pub agent_name: Option<String>,
}

impl ResolveContext {
    pub fn named(config_name: impl Into<String>) -> Self {
        Self {
            config_name: Some(config_name.into()),
            agent_name: None,
        }
    }
}

/// A resolved config: the winning key plus the provider config itself.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConfig {
    pub key: String,
    pub config: ProviderConfig,
}

/// Immutable-between-reloads config resolver.
pub struct Router {
    table: RwLock<Arc<RouterConfig>>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            table: RwLock::new(Arc::new(config)),
        }
    }

    /// Atomically replaces the whole table.
    pub fn reload(&self, config: RouterConfig) {
        let mut table = self.table.write().unwrap();
        *table = Arc::new(config);
        tracing::info!("router configuration reloaded");
    }

    /// Current table snapshot.
    pub fn snapshot(&self) -> Arc<RouterConfig> {
        Arc::clone(&self.table.read().unwrap())
    }

    /// Resolves a request context to a config. Deterministic for a given
    /// (table, context) pair.
    pub fn resolve(&self, ctx: &ResolveContext) -> Result<ResolvedConfig, RouterError> {
        let table = self.snapshot();
        if table.configs.is_empty() {
            return Err(RouterError::NoConfigs);
        }

        if let Some(agent) = &ctx.agent_name {
            if let Some(found) = lookup_default(&table, agent) {
                return Ok(found);
            }
        }

        if let Some(name) = &ctx.config_name {
            if let Some(found) = lookup_default(&table, name) {
                return Ok(found);
            }
            if let Some(config) = table.configs.get(name) {
                return Ok(ResolvedConfig {
                    key: name.clone(),
                    config: config.clone(),
                });
            }
            return Err(RouterError::NotFound(name.clone()));
        }

        for role in FALLBACK_ROLES {
            if let Some(found) = lookup_default(&table, role) {
                return Ok(found);
            }
        }

        // BTreeMap keeps this deterministic.
        let (key, config) = table
            .configs
            .iter()
            .next()
            .expect("configs checked non-empty");
        Ok(ResolvedConfig {
            key: key.clone(),
            config: config.clone(),
        })
    }

    /// Wraps this router for one agent; see [`AgentScopedRouter`].
    pub fn for_agent(self: &Arc<Self>, agent_name: impl Into<String>) -> AgentScopedRouter {
        AgentScopedRouter {
            router: Arc::clone(self),
            agent_name: agent_name.into(),
        }
    }
}

fn lookup_default(table: &RouterConfig, role: &str) -> Option<ResolvedConfig> {
    let key = table.defaults.get(role)?;
    let config = table.configs.get(key)?;
    Some(ResolvedConfig {
        key: key.clone(),
        config: config.clone(),
    })
}

/// Router wrapper that injects its agent name into every resolution and into
/// every request's options, isolating per-agent routing from the caller.
pub struct AgentScopedRouter {
    router: Arc<Router>,
    agent_name: String,
}

impl AgentScopedRouter {
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Resolves with this agent's name injected into the context.
    pub fn resolve(&self, ctx: &ResolveContext) -> Result<ResolvedConfig, RouterError> {
        let mut ctx = ctx.clone();
        ctx.agent_name = Some(self.agent_name.clone());
        self.router.resolve(&ctx)
    }

    /// Request options seeded from the config with the agent name injected.
    pub fn request_options(&self, config: &ProviderConfig) -> RequestOptions {
        let mut options = RequestOptions::from_config(config);
        options.agent_name = Some(self.agent_name.clone());
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouterConfig {
        let mut config = RouterConfig::default();
        config
            .configs
            .insert("cfgA".to_string(), ProviderConfig::new("ollama", "modelA"));
        config
            .configs
            .insert("cfgB".to_string(), ProviderConfig::new("openrouter", "modelB"));
        config
            .defaults
            .insert("analyze".to_string(), "cfgB".to_string());
        config
    }

    #[test]
    fn named_role_resolves_through_defaults() {
        let router = Router::new(table());
        let resolved = router.resolve(&ResolveContext::named("analyze")).unwrap();
        assert_eq!(resolved.key, "cfgB");
    }

    #[test]
    fn empty_context_probes_fallback_roles() {
        let router = Router::new(table());
        let resolved = router.resolve(&ResolveContext::default()).unwrap();
        assert_eq!(resolved.key, "cfgB");
    }

    #[test]
    fn empty_context_without_defaults_takes_first_config() {
        let mut config = table();
        config.defaults.clear();
        let router = Router::new(config);
        let resolved = router.resolve(&ResolveContext::default()).unwrap();
        assert_eq!(resolved.key, "cfgA");
    }

    #[test]
    fn direct_config_name_wins_when_not_a_default() {
        let router = Router::new(table());
        let resolved = router.resolve(&ResolveContext::named("cfgA")).unwrap();
        assert_eq!(resolved.key, "cfgA");
    }

    #[test]
    fn unknown_name_reports_the_key() {
        let router = Router::new(table());
        let err = router.resolve(&ResolveContext::named("missing")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No LLM configuration found for key: missing"
        );
    }

    #[test]
    fn empty_table_reports_no_configs() {
        let router = Router::new(RouterConfig::default());
        let err = router.resolve(&ResolveContext::default()).unwrap_err();
        assert_eq!(err.to_string(), "No LLM configurations available");
    }

    #[test]
    fn resolution_is_deterministic() {
        let router = Router::new(table());
        let a = router.resolve(&ResolveContext::named("analyze")).unwrap();
        let b = router.resolve(&ResolveContext::named("analyze")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn reload_swaps_the_whole_table() {
        let router = Router::new(table());
        let mut replacement = RouterConfig::default();
        replacement
            .configs
            .insert("only".to_string(), ProviderConfig::new("ollama", "m"));
        router.reload(replacement);
        let resolved = router.resolve(&ResolveContext::default()).unwrap();
        assert_eq!(resolved.key, "only");
    }

    #[test]
    fn agent_scope_injects_the_agent_default_and_options() {
        let mut config = table();
        config
            .defaults
            .insert("analyzer".to_string(), "cfgA".to_string());
        let router = Arc::new(Router::new(config));
        let scoped = router.for_agent("analyzer");

        let resolved = scoped.resolve(&ResolveContext::default()).unwrap();
        assert_eq!(resolved.key, "cfgA");

        let options = scoped.request_options(&resolved.config);
        assert_eq!(options.agent_name.as_deref(), Some("analyzer"));
    }
}

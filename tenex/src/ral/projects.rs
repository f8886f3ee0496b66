//! Cross-project resolution: known projects, active runtimes, and the
//! persistent agent store fallback.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

/// Metadata for one known project.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectInfo {
    pub pubkey: String,
    pub title: String,
    /// Agent slugs this project advertises.
    pub agents: Vec<String>,
}

/// A live project runtime with an in-memory agent map.
pub trait ProjectRuntime: Send + Sync {
    /// Pubkey of the agent with the given slug, when loaded.
    fn agent_pubkey(&self, slug: &str) -> Option<String>;
    /// Any available agent, for "any" requests.
    fn any_agent(&self) -> Option<String>;
}

/// Persistent agent records keyed by project id, used when a project's
/// runtime is not active.
pub trait AgentStore: Send + Sync {
    /// (slug, pubkey) pairs known for the project.
    fn agents_for_project(&self, project_id: &str) -> Vec<(String, String)>;
}

/// Errors while resolving a cross-project delegation target.
#[derive(Debug, Error)]
pub enum ProjectResolveError {
    #[error("unknown project: {0}")]
    UnknownProject(String),
    #[error("no agent '{slug}' in project {project_id}")]
    UnknownAgent { project_id: String, slug: String },
}

/// Daemon-scoped registry of projects and their runtimes.
#[derive(Default)]
pub struct ProjectsRegistry {
    known: DashMap<String, ProjectInfo>,
    active: DashMap<String, Arc<dyn ProjectRuntime>>,
    store: Option<Arc<dyn AgentStore>>,
}

impl ProjectsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent_store(mut self, store: Arc<dyn AgentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn add_project(&self, project_id: impl Into<String>, info: ProjectInfo) {
        self.known.insert(project_id.into(), info);
    }

    pub fn project(&self, project_id: &str) -> Option<ProjectInfo> {
        self.known.get(project_id).map(|p| p.clone())
    }

    pub fn set_runtime(&self, project_id: impl Into<String>, runtime: Arc<dyn ProjectRuntime>) {
        self.active.insert(project_id.into(), runtime);
    }

    pub fn remove_runtime(&self, project_id: &str) {
        self.active.remove(project_id);
    }

    /// Resolves an agent slug (or "any") in the target project to a pubkey.
    ///
    /// An active runtime's in-memory agent map wins; without one, the
    /// persistent agent store is consulted.
    pub fn resolve_agent(
        &self,
        project_id: &str,
        slug: &str,
    ) -> Result<String, ProjectResolveError> {
        if !self.known.contains_key(project_id) {
            return Err(ProjectResolveError::UnknownProject(project_id.to_string()));
        }

        if let Some(runtime) = self.active.get(project_id) {
            let found = if slug == "any" {
                runtime.any_agent()
            } else {
                runtime.agent_pubkey(slug)
            };
            if let Some(pubkey) = found {
                return Ok(pubkey);
            }
        }

        if let Some(store) = &self.store {
            let agents = store.agents_for_project(project_id);
            let found = if slug == "any" {
                agents.first().map(|(_, pk)| pk.clone())
            } else {
                agents
                    .iter()
                    .find(|(s, _)| s == slug)
                    .map(|(_, pk)| pk.clone())
            };
            if let Some(pubkey) = found {
                return Ok(pubkey);
            }
        }

        Err(ProjectResolveError::UnknownAgent {
            project_id: project_id.to_string(),
            slug: slug.to_string(),
        })
    }
}

/// Simple in-memory agent map, usable both as a runtime and as a store.
#[derive(Default)]
pub struct StaticAgentMap {
    agents: BTreeMap<String, String>,
}

impl StaticAgentMap {
    pub fn new(agents: BTreeMap<String, String>) -> Self {
        Self { agents }
    }
}

impl ProjectRuntime for StaticAgentMap {
    fn agent_pubkey(&self, slug: &str) -> Option<String> {
        self.agents.get(slug).cloned()
    }

    fn any_agent(&self) -> Option<String> {
        self.agents.values().next().cloned()
    }
}

//! Directory of agents, tools, and contexts.
//!
//! A [`Registry`] is the process-wide lookup surface the runtime is built
//! around: agents register themselves on construction, tools are registered
//! by whoever defines them, and contexts are created lazily the first time
//! traffic names them. All accessors are safe for concurrent use.
//!
//! The backing is chosen by [`RegistryConfig`]: purely in-process, or
//! mirrored into a shared [`KeyValueStore`] so that agent metadata, traces,
//! participants, and per-chat state are visible to every process handed the
//! same store. Tool descriptors carry executor closures and therefore always
//! stay in-process.
//!
//! # Example
//!
//! ```rust
//! use agentmesh::Registry;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = Registry::new();
//! registry.register_agent("Summarizer", "Summarizes documents").await.unwrap();
//!
//! let ctx = registry.get_or_create_context("default").await.unwrap();
//! assert_eq!(ctx.name(), "default");
//! # }
//! ```

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agentmesh::context::Context;
use crate::agentmesh::kv::{KeyValueStore, StoreError};
use crate::agentmesh::tool::Tool;

/// Selects the registry's backing.
#[derive(Clone, Default)]
pub struct RegistryConfig {
    /// When set, agent metadata and context state live in this store and are
    /// shared with every registry configured with the same store. When
    /// `None`, all state is in-process.
    pub shared_store: Option<Arc<dyn KeyValueStore>>,
}

/// Metadata describing a registered agent. Effectively immutable after
/// registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    /// Globally unique name; doubles as the agent's logical address.
    pub name: String,
    /// Human description used for agent discovery by coordinators.
    pub description: String,
    /// When the agent registered.
    pub registered_at: DateTime<Utc>,
}

/// Errors raised by registry operations.
#[derive(Debug)]
pub enum RegistryError {
    /// An agent with this name is already registered.
    DuplicateAgent(String),
    /// A tool with this name is already registered.
    DuplicateTool(String),
    /// Agent names are addresses and phase plans split on whitespace, so
    /// empty names and names containing whitespace are rejected.
    InvalidName(String),
    /// The shared store failed.
    Store(StoreError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateAgent(name) => {
                write!(f, "agent '{}' is already registered", name)
            }
            RegistryError::DuplicateTool(name) => {
                write!(f, "tool '{}' is already registered", name)
            }
            RegistryError::InvalidName(name) => {
                write!(f, "invalid agent name '{}': names must be non-empty and free of whitespace", name)
            }
            RegistryError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl Error for RegistryError {}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        RegistryError::Store(e)
    }
}

const AGENT_INDEX_KEY: &str = "agents";

fn agent_key(name: &str) -> String {
    format!("agents:{}", name)
}

/// The directory of live agents, tools, and contexts.
pub struct Registry {
    agents: StdMutex<HashMap<String, AgentMetadata>>,
    tools: StdMutex<HashMap<String, Arc<Tool>>>,
    contexts: StdMutex<HashMap<String, Arc<Context>>>,
    config: RegistryConfig,
}

impl Registry {
    /// An in-process registry.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// A registry with an explicit backing configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            agents: StdMutex::new(HashMap::new()),
            tools: StdMutex::new(HashMap::new()),
            contexts: StdMutex::new(HashMap::new()),
            config,
        }
    }

    /// The configuration this registry was built with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // -- agents -------------------------------------------------------------

    /// Register an agent. Names must be unique within the registry, non-empty
    /// and free of whitespace.
    pub async fn register_agent(
        &self,
        name: &str,
        description: &str,
    ) -> Result<(), RegistryError> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        let metadata = AgentMetadata {
            name: name.to_string(),
            description: description.to_string(),
            registered_at: Utc::now(),
        };
        {
            let mut agents = self.agents.lock().expect("registry agents poisoned");
            if agents.contains_key(name) {
                return Err(RegistryError::DuplicateAgent(name.to_string()));
            }
            agents.insert(name.to_string(), metadata.clone());
        }
        if let Some(store) = &self.config.shared_store {
            let encoded =
                serde_json::to_vec(&metadata).map_err(|e| StoreError(e.to_string()))?;
            store.set_add(AGENT_INDEX_KEY, name.as_bytes().to_vec()).await?;
            store.put(&agent_key(name), encoded).await?;
        }
        log::debug!("registered agent '{}'", name);
        Ok(())
    }

    /// Remove an agent from the directory. Unknown names are a no-op.
    pub async fn unregister_agent(&self, name: &str) -> Result<(), RegistryError> {
        self.agents
            .lock()
            .expect("registry agents poisoned")
            .remove(name);
        if let Some(store) = &self.config.shared_store {
            store.set_remove(AGENT_INDEX_KEY, name.as_bytes()).await?;
            store.delete_prefix(&agent_key(name)).await?;
        }
        log::debug!("unregistered agent '{}'", name);
        Ok(())
    }

    /// Look up one agent's metadata.
    pub async fn agent_metadata(&self, name: &str) -> Result<Option<AgentMetadata>, RegistryError> {
        if let Some(metadata) = self
            .agents
            .lock()
            .expect("registry agents poisoned")
            .get(name)
            .cloned()
        {
            return Ok(Some(metadata));
        }
        if let Some(store) = &self.config.shared_store {
            if let Some(bytes) = store.get(&agent_key(name)).await? {
                let metadata =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError(e.to_string()))?;
                return Ok(Some(metadata));
            }
        }
        Ok(None)
    }

    /// `(name, description)` pairs for every known agent, sorted by name.
    /// Coordinators use this for agent discovery.
    pub async fn agent_names_and_descriptions(
        &self,
    ) -> Result<Vec<(String, String)>, RegistryError> {
        let mut entries: HashMap<String, String> = self
            .agents
            .lock()
            .expect("registry agents poisoned")
            .values()
            .map(|m| (m.name.clone(), m.description.clone()))
            .collect();
        if let Some(store) = &self.config.shared_store {
            for raw in store.set_members(AGENT_INDEX_KEY).await? {
                let name =
                    String::from_utf8(raw).map_err(|e| StoreError(e.to_string()))?;
                if entries.contains_key(&name) {
                    continue;
                }
                if let Some(bytes) = store.get(&agent_key(&name)).await? {
                    let metadata: AgentMetadata =
                        serde_json::from_slice(&bytes).map_err(|e| StoreError(e.to_string()))?;
                    entries.insert(metadata.name, metadata.description);
                }
            }
        }
        let mut pairs: Vec<(String, String)> = entries.into_iter().collect();
        pairs.sort();
        Ok(pairs)
    }

    // -- tools --------------------------------------------------------------

    /// Register a tool descriptor. Tool names are unique.
    pub fn register_tool(&self, tool: Arc<Tool>) -> Result<(), RegistryError> {
        let mut tools = self.tools.lock().expect("registry tools poisoned");
        if tools.contains_key(tool.name()) {
            return Err(RegistryError::DuplicateTool(tool.name().to_string()));
        }
        log::debug!("registered tool '{}'", tool.name());
        tools.insert(tool.name().to_string(), tool);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get_tool(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools
            .lock()
            .expect("registry tools poisoned")
            .get(name)
            .cloned()
    }

    // -- contexts -----------------------------------------------------------

    /// Create a context. Idempotent: creating a name that already exists
    /// hands back the existing context.
    pub async fn create_context(&self, name: &str) -> Result<Arc<Context>, RegistryError> {
        self.get_or_create_context(name).await
    }

    /// Create a context, or hand back the existing one of that name.
    /// Idempotent: two calls with the same name yield the same context.
    pub async fn get_or_create_context(&self, name: &str) -> Result<Arc<Context>, RegistryError> {
        let mut contexts = self.contexts.lock().expect("registry contexts poisoned");
        if let Some(existing) = contexts.get(name) {
            return Ok(existing.clone());
        }
        let context = match &self.config.shared_store {
            Some(store) => Arc::new(Context::shared(name, store.clone())),
            None => Arc::new(Context::in_memory(name)),
        };
        contexts.insert(name.to_string(), context.clone());
        Ok(context)
    }

    /// Look up an existing context without creating it.
    pub fn get_context(&self, name: &str) -> Option<Arc<Context>> {
        self.contexts
            .lock()
            .expect("registry contexts poisoned")
            .get(name)
            .cloned()
    }

    /// Remove a context, discarding its state (including shared-store state
    /// when so configured).
    pub async fn remove_context(&self, name: &str) -> Result<(), RegistryError> {
        let removed = self
            .contexts
            .lock()
            .expect("registry contexts poisoned")
            .remove(name);
        if let Some(context) = removed {
            context.clear().await?;
        }
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentmesh::kv::InMemoryKeyValueStore;

    #[tokio::test]
    async fn register_unregister_lookup_round_trip() {
        let registry = Registry::new();
        registry.register_agent("A", "does A things").await.unwrap();
        assert!(registry.agent_metadata("A").await.unwrap().is_some());

        registry.unregister_agent("A").await.unwrap();
        assert!(registry.agent_metadata("A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_and_whitespace_names_are_rejected() {
        let registry = Registry::new();
        registry.register_agent("A", "first").await.unwrap();
        assert!(matches!(
            registry.register_agent("A", "second").await,
            Err(RegistryError::DuplicateAgent(_))
        ));
        assert!(matches!(
            registry.register_agent("two words", "desc").await,
            Err(RegistryError::InvalidName(_))
        ));
        assert!(matches!(
            registry.register_agent("", "desc").await,
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn get_or_create_context_is_idempotent() {
        let registry = Registry::new();
        let first = registry.create_context("ctx").await.unwrap();
        let second = registry.create_context("ctx").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let third = registry.get_or_create_context("ctx").await.unwrap();
        assert!(Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn tool_names_are_unique() {
        let registry = Registry::new();
        let schema = serde_json::json!({"type": "object"});
        registry
            .register_tool(Arc::new(Tool::agent_backed("t", "a tool", schema.clone())))
            .unwrap();
        let err = registry
            .register_tool(Arc::new(Tool::agent_backed("t", "again", schema)))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTool(_)));
    }

    #[tokio::test]
    async fn shared_store_makes_agent_metadata_visible_across_registries() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let here = Registry::with_config(RegistryConfig {
            shared_store: Some(store.clone()),
        });
        let there = Registry::with_config(RegistryConfig {
            shared_store: Some(store),
        });

        here.register_agent("Remote", "lives elsewhere").await.unwrap();
        let seen = there.agent_metadata("Remote").await.unwrap();
        assert_eq!(seen.unwrap().description, "lives elsewhere");

        let listed = there.agent_names_and_descriptions().await.unwrap();
        assert!(listed.iter().any(|(n, _)| n == "Remote"));
    }

    #[tokio::test]
    async fn removing_a_context_discards_its_state() {
        let registry = Registry::new();
        let ctx = registry.get_or_create_context("gone").await.unwrap();
        ctx.add_participant("A").await.unwrap();
        registry.remove_context("gone").await.unwrap();
        assert!(registry.get_context("gone").is_none());
    }
}

//! Declarative agent instantiation.
//!
//! A configuration document is a JSON array of records, each discriminated
//! by a `kind` field and carrying only that kind's parameters. Loading the
//! document instantiates and starts the agents in declaration order.
//!
//! LLM handles are either described inline (model, base URL, the name of an
//! environment variable holding the API key) or reference a client attached
//! to the loader by name, the same mechanism retrieval stores use, since
//! neither kind of handle is expressible as text.
//!
//! ```json
//! [
//!   {"kind": "llm_only", "name": "Answerer", "description": "Answers questions",
//!    "llm": {"model": "gpt-4o-mini", "base_url": "https://api.openai.com/v1",
//!            "api_key_env": "OPENAI_API_KEY"}},
//!   {"kind": "pass_through_client", "name": "Client",
//!    "description": "Bridges the shell", "destination": "Answerer"}
//! ]
//! ```

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::agentmesh::agent::{start_agent, Agent};
use crate::agentmesh::agents::{
    CollaboratorAgent, CoVeChallengerAgent, GraphRagAgent, LlmOnlyAgent, LlmWithToolsAgent,
    PassThroughClientAgent, PhasedCoordinator, SequentialCoordinator, VectorRagAgent,
};
use crate::agentmesh::clients::remote::RemoteLlmClient;
use crate::agentmesh::llm::LlmClient;
use crate::agentmesh::registry::{Registry, RegistryError};
use crate::agentmesh::retrieval::{GraphStore, VectorStore};
use crate::agentmesh::transport::local::LocalTransport;
use crate::agentmesh::transport::MessageTransport;

/// Errors raised while loading a configuration document.
#[derive(Debug)]
pub enum ConfigError {
    /// The document is not valid JSON or names an unknown agent kind or is
    /// missing a field.
    Parse(serde_json::Error),
    /// A record references a loader resource that was never attached.
    UnknownResource {
        kind: &'static str,
        name: String,
    },
    /// An inline LLM definition names an environment variable that is not
    /// set.
    MissingEnv(String),
    /// Registration failed (duplicate name, invalid name).
    Registry(RegistryError),
    /// A freshly instantiated agent failed to start.
    Start(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(e) => write!(f, "configuration parse failed: {}", e),
            ConfigError::UnknownResource { kind, name } => {
                write!(f, "no {} named '{}' attached to the loader", kind, name)
            }
            ConfigError::MissingEnv(var) => {
                write!(f, "environment variable '{}' is not set", var)
            }
            ConfigError::Registry(e) => write!(f, "{}", e),
            ConfigError::Start(e) => write!(f, "agent failed to start: {}", e),
        }
    }
}

impl Error for ConfigError {}

impl From<RegistryError> for ConfigError {
    fn from(e: RegistryError) -> Self {
        ConfigError::Registry(e)
    }
}

/// Inline description of a remote LLM handle.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmDefinition {
    pub model: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub system_message: Option<String>,
}

/// Either a reference to a client attached to the loader, or an inline
/// remote definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LlmSpec {
    Named { client: String },
    Remote(LlmDefinition),
}

/// One record of the configuration document, discriminated by `kind`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentDefinition {
    PassThroughClient {
        name: String,
        description: String,
        destination: String,
    },
    LlmOnly {
        name: String,
        description: String,
        llm: LlmSpec,
    },
    LlmWithTools {
        name: String,
        description: String,
        llm: LlmSpec,
        tools: Vec<String>,
    },
    VectorRag {
        name: String,
        description: String,
        llm: LlmSpec,
        vector_store: String,
        #[serde(default)]
        collection: Option<String>,
        #[serde(default)]
        k: Option<usize>,
    },
    GraphRag {
        name: String,
        description: String,
        llm: LlmSpec,
        graph_store: String,
        #[serde(default)]
        retrieval_query: Option<String>,
        #[serde(default)]
        k: Option<usize>,
    },
    #[serde(rename = "cove_challenger")]
    CoVeChallenger {
        name: String,
        description: String,
        llm: LlmSpec,
        vector_store: String,
        #[serde(default)]
        collection: Option<String>,
        #[serde(default)]
        k: Option<usize>,
        #[serde(default)]
        num_verification_questions: Option<usize>,
    },
    SequentialCoordinator {
        name: String,
        description: String,
        agents: Vec<String>,
    },
    PhasedCoordinator {
        name: String,
        description: String,
        llm: LlmSpec,
        #[serde(default)]
        phases: Option<Vec<String>>,
        #[serde(default)]
        max_iterations: Option<usize>,
        #[serde(default)]
        confidence_score_threshold: Option<i64>,
        #[serde(default)]
        system_message: Option<String>,
    },
    Collaborator {
        name: String,
        description: String,
        llm: LlmSpec,
        #[serde(default)]
        system_message: Option<String>,
    },
}

type TransportFactory = Box<dyn Fn(&str) -> Arc<dyn MessageTransport> + Send + Sync>;

/// Instantiates and starts agents from a configuration document.
///
/// Resources that cannot be described as text (stub or pre-built LLM
/// clients, vector and graph stores) are attached by name before loading.
/// Transports default to the in-process broker, one queue per agent name;
/// attach a factory to target a real broker instead.
pub struct AgentLoader {
    registry: Arc<Registry>,
    transport_factory: TransportFactory,
    llm_clients: HashMap<String, Arc<dyn LlmClient>>,
    vector_stores: HashMap<String, Arc<dyn VectorStore>>,
    graph_stores: HashMap<String, Arc<dyn GraphStore>>,
}

impl AgentLoader {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            transport_factory: Box::new(|name: &str| -> Arc<dyn MessageTransport> {
                Arc::new(LocalTransport::new(name))
            }),
            llm_clients: HashMap::new(),
            vector_stores: HashMap::new(),
            graph_stores: HashMap::new(),
        }
    }

    /// Build transports with `factory` instead of the in-process broker.
    pub fn with_transport_factory(
        mut self,
        factory: impl Fn(&str) -> Arc<dyn MessageTransport> + Send + Sync + 'static,
    ) -> Self {
        self.transport_factory = Box::new(factory);
        self
    }

    /// Attach an LLM client records may reference as `{"client": name}`.
    pub fn with_llm_client(mut self, name: impl Into<String>, client: Arc<dyn LlmClient>) -> Self {
        self.llm_clients.insert(name.into(), client);
        self
    }

    /// Attach a vector store records may reference by name.
    pub fn with_vector_store(
        mut self,
        name: impl Into<String>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        self.vector_stores.insert(name.into(), store);
        self
    }

    /// Attach a graph store records may reference by name.
    pub fn with_graph_store(mut self, name: impl Into<String>, store: Arc<dyn GraphStore>) -> Self {
        self.graph_stores.insert(name.into(), store);
        self
    }

    /// Parse `document`, then instantiate and start each agent in
    /// declaration order.
    pub async fn load_agents(&self, document: &str) -> Result<Vec<Arc<dyn Agent>>, ConfigError> {
        let definitions: Vec<AgentDefinition> =
            serde_json::from_str(document).map_err(ConfigError::Parse)?;
        let mut agents: Vec<Arc<dyn Agent>> = Vec::new();
        for definition in definitions {
            let agent = self.instantiate(definition).await?;
            log::info!("loaded agent '{}'", agent.name());
            start_agent(agent.clone()).await.map_err(ConfigError::Start)?;
            agents.push(agent);
        }
        Ok(agents)
    }

    fn resolve_llm(&self, spec: &LlmSpec) -> Result<Arc<dyn LlmClient>, ConfigError> {
        match spec {
            LlmSpec::Named { client } => self
                .llm_clients
                .get(client)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownResource {
                    kind: "llm client",
                    name: client.clone(),
                }),
            LlmSpec::Remote(definition) => {
                let mut client =
                    RemoteLlmClient::new(definition.base_url.clone(), definition.model.clone());
                if let Some(var) = &definition.api_key_env {
                    let api_key =
                        std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.clone()))?;
                    client = client.with_api_key(api_key);
                }
                if let Some(system_message) = &definition.system_message {
                    client = client.with_system_message(system_message.clone());
                }
                Ok(Arc::new(client))
            }
        }
    }

    fn resolve_vector_store(&self, name: &str) -> Result<Arc<dyn VectorStore>, ConfigError> {
        self.vector_stores
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownResource {
                kind: "vector store",
                name: name.to_string(),
            })
    }

    fn resolve_graph_store(&self, name: &str) -> Result<Arc<dyn GraphStore>, ConfigError> {
        self.graph_stores
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownResource {
                kind: "graph store",
                name: name.to_string(),
            })
    }

    async fn instantiate(
        &self,
        definition: AgentDefinition,
    ) -> Result<Arc<dyn Agent>, ConfigError> {
        let agent: Arc<dyn Agent> = match definition {
            AgentDefinition::PassThroughClient {
                name,
                description,
                destination,
            } => {
                let transport = (self.transport_factory)(&name);
                Arc::new(
                    PassThroughClientAgent::new(
                        name,
                        description,
                        destination,
                        transport,
                        self.registry.clone(),
                    )
                    .await?,
                )
            }
            AgentDefinition::LlmOnly {
                name,
                description,
                llm,
            } => {
                let llm = self.resolve_llm(&llm)?;
                let transport = (self.transport_factory)(&name);
                Arc::new(
                    LlmOnlyAgent::new(name, description, llm, transport, self.registry.clone())
                        .await?,
                )
            }
            AgentDefinition::LlmWithTools {
                name,
                description,
                llm,
                tools,
            } => {
                let llm = self.resolve_llm(&llm)?;
                let transport = (self.transport_factory)(&name);
                Arc::new(
                    LlmWithToolsAgent::new(
                        name,
                        description,
                        llm,
                        tools,
                        transport,
                        self.registry.clone(),
                    )
                    .await?,
                )
            }
            AgentDefinition::VectorRag {
                name,
                description,
                llm,
                vector_store,
                collection,
                k,
            } => {
                let llm = self.resolve_llm(&llm)?;
                let store = self.resolve_vector_store(&vector_store)?;
                let transport = (self.transport_factory)(&name);
                let mut agent = VectorRagAgent::new(
                    name,
                    description,
                    llm,
                    store,
                    transport,
                    self.registry.clone(),
                )
                .await?;
                if let Some(collection) = collection {
                    agent = agent.with_collection(collection);
                }
                if let Some(k) = k {
                    agent = agent.with_k(k);
                }
                Arc::new(agent)
            }
            AgentDefinition::GraphRag {
                name,
                description,
                llm,
                graph_store,
                retrieval_query,
                k,
            } => {
                let llm = self.resolve_llm(&llm)?;
                let store = self.resolve_graph_store(&graph_store)?;
                let transport = (self.transport_factory)(&name);
                let mut agent = GraphRagAgent::new(
                    name,
                    description,
                    llm,
                    store,
                    transport,
                    self.registry.clone(),
                )
                .await?;
                if let Some(retrieval_query) = retrieval_query {
                    agent = agent.with_retrieval_query(retrieval_query);
                }
                if let Some(k) = k {
                    agent = agent.with_k(k);
                }
                Arc::new(agent)
            }
            AgentDefinition::CoVeChallenger {
                name,
                description,
                llm,
                vector_store,
                collection,
                k,
                num_verification_questions,
            } => {
                let llm = self.resolve_llm(&llm)?;
                let store = self.resolve_vector_store(&vector_store)?;
                let transport = (self.transport_factory)(&name);
                let mut agent = CoVeChallengerAgent::new(
                    name,
                    description,
                    llm,
                    store,
                    transport,
                    self.registry.clone(),
                )
                .await?;
                if let Some(collection) = collection {
                    agent = agent.with_collection(collection);
                }
                if let Some(k) = k {
                    agent = agent.with_k(k);
                }
                if let Some(n) = num_verification_questions {
                    agent = agent.with_num_verification_questions(n);
                }
                Arc::new(agent)
            }
            AgentDefinition::SequentialCoordinator {
                name,
                description,
                agents,
            } => {
                let transport = (self.transport_factory)(&name);
                Arc::new(
                    SequentialCoordinator::new(
                        name,
                        description,
                        agents,
                        transport,
                        self.registry.clone(),
                    )
                    .await?,
                )
            }
            AgentDefinition::PhasedCoordinator {
                name,
                description,
                llm,
                phases,
                max_iterations,
                confidence_score_threshold,
                system_message,
            } => {
                let llm = self.resolve_llm(&llm)?;
                let transport = (self.transport_factory)(&name);
                let mut agent = PhasedCoordinator::new(
                    name,
                    description,
                    llm,
                    transport,
                    self.registry.clone(),
                )
                .await?;
                if let Some(phases) = phases {
                    agent = agent.with_phases(phases);
                }
                if let Some(max_iterations) = max_iterations {
                    agent = agent.with_max_iterations(max_iterations);
                }
                if let Some(threshold) = confidence_score_threshold {
                    agent = agent.with_confidence_score_threshold(threshold);
                }
                if let Some(system_message) = system_message {
                    agent = agent.with_system_message(system_message);
                }
                Arc::new(agent)
            }
            AgentDefinition::Collaborator {
                name,
                description,
                llm,
                system_message,
            } => {
                let llm = self.resolve_llm(&llm)?;
                let transport = (self.transport_factory)(&name);
                let mut agent = CollaboratorAgent::new(
                    name,
                    description,
                    llm,
                    transport,
                    self.registry.clone(),
                )
                .await?;
                if let Some(system_message) = system_message {
                    agent = agent.with_system_message(system_message);
                }
                Arc::new(agent)
            }
        };
        Ok(agent)
    }
}

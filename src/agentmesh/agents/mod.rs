//! Concrete agent kinds.
//!
//! One implementation of the [`Agent`](crate::Agent) trait per behavior:
//!
//! - [`passthrough::PassThroughClientAgent`]: bridges an external caller
//!   to a downstream agent.
//! - [`llm_agents::LlmOnlyAgent`]: one LLM completion per request.
//! - [`llm_agents::LlmWithToolsAgent`]: the tool invocation protocol over
//!   direct and agent-backed tools.
//! - [`rag::VectorRagAgent`], [`rag::GraphRagAgent`]: retrieval-augmented
//!   answering over a vector or graph store.
//! - [`rag::CoVeChallengerAgent`]: chain-of-verification challenge of a
//!   baseline answer.
//! - [`coordinators::SequentialCoordinator`],
//!   [`coordinators::PhasedCoordinator`],
//!   [`coordinators::CollaboratorAgent`]: the collaboration protocols.

pub mod coordinators;
pub mod llm_agents;
pub mod passthrough;
pub mod rag;

pub use coordinators::{CollaboratorAgent, PhasedCoordinator, SequentialCoordinator};
pub use llm_agents::{LlmOnlyAgent, LlmWithToolsAgent};
pub use passthrough::PassThroughClientAgent;
pub use rag::{CoVeChallengerAgent, GraphRagAgent, VectorRagAgent};

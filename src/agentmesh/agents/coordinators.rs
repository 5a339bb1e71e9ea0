//! Coordination protocols.
//!
//! Two protocols are built on the runtime:
//!
//! - **Sequential** ([`SequentialCoordinator`]): a pipeline: the request
//!   goes to the first agent of a configured sequence, each response is
//!   forwarded to the next agent, and the final response returns to the
//!   original requester. The next recipient is determined solely by the
//!   stored sequence and the responder's name, so any interleaving across
//!   chats is tolerated.
//!
//! - **Phased** ([`PhasedCoordinator`]): iterative collaboration: the
//!   coordinator plans which agents are needed and buckets them into
//!   phases, dispatches each phase in parallel to [`CollaboratorAgent`]s
//!   that enrich a shared chat history and ACK, then asks its LLM for a
//!   final answer with a confidence score. Below-threshold answers trigger
//!   a rephrase-and-retry loop bounded by `max_iterations`; exhaustion
//!   yields a terminal CANNOT_ANSWER.
//!
//! Coordinators never wait synchronously for responses: they return from
//! each hook and react in `process_response`, which keeps all coordination
//! non-blocking and free of circular waits through the transport.

use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use futures_util::future::join_all;
use uuid::Uuid;

use crate::agentmesh::agent::{Agent, AgentCore};
use crate::agentmesh::context::Context;
use crate::agentmesh::llm::{ChatMessage, LlmClient};
use crate::agentmesh::message::{Message, MessageType};
use crate::agentmesh::registry::{Registry, RegistryError};
use crate::agentmesh::transport::MessageTransport;

/// Confidence score a final answer must reach to be returned.
pub const CONFIDENCE_SCORE_THRESHOLD: i64 = 85;

/// Iterations (original query plus rephrasings) before giving up.
pub const MAX_COORDINATOR_ITERATIONS: usize = 5;

/// Terminal payload sent when iteration exhausts without a confident answer.
pub const CANNOT_ANSWER: &str = "I don't know the answer to the query.";

/// Default phase names for phased coordination.
pub fn default_phases() -> Vec<String> {
    vec!["Data Collection".to_string(), "Data Analysis".to_string()]
}

/// Protocol violations inside a coordination exchange.
#[derive(Debug)]
pub enum CoordinationError {
    /// A phased collaborator answered with something other than an ACK.
    UnexpectedResponse {
        sender: String,
        payload: String,
    },
    /// The planning step produced no usable phase plan.
    EmptyPhasePlan,
    /// A sequential coordinator was configured with no agents.
    EmptySequence,
    /// A protocol message arrived without its required correlation field.
    MissingField(&'static str),
}

impl fmt::Display for CoordinationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinationError::UnexpectedResponse { sender, payload } => {
                write!(f, "unexpected non-ACK response from '{}': {}", sender, payload)
            }
            CoordinationError::EmptyPhasePlan => write!(f, "phase plan named no agents"),
            CoordinationError::EmptySequence => write!(f, "agent sequence is empty"),
            CoordinationError::MissingField(field) => {
                write!(f, "coordination message missing '{}'", field)
            }
        }
    }
}

impl Error for CoordinationError {}

// ---------------------------------------------------------------------------
// Sequential coordination
// ---------------------------------------------------------------------------

/// Chains a request through a fixed sequence of agents.
pub struct SequentialCoordinator {
    core: AgentCore,
    agents: Vec<String>,
    route_response_to: StdMutex<Option<String>>,
}

impl SequentialCoordinator {
    pub async fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        agents: Vec<String>,
        transport: Arc<dyn MessageTransport>,
        registry: Arc<Registry>,
    ) -> Result<Self, RegistryError> {
        let core = AgentCore::new(name, description, transport, registry).await?;
        Ok(Self {
            core,
            agents,
            route_response_to: StdMutex::new(None),
        })
    }
}

#[async_trait]
impl Agent for SequentialCoordinator {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(
        &self,
        request: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let first = self
            .agents
            .first()
            .cloned()
            .ok_or(CoordinationError::EmptySequence)?;
        let requester = request
            .sender
            .clone()
            .ok_or(CoordinationError::MissingField("sender"))?;
        *self
            .route_response_to
            .lock()
            .expect("route slot poisoned") = Some(requester);

        let context = self
            .core
            .registry()
            .get_or_create_context(&request.context_name)
            .await?;
        context.set_agents_sequence(self.agents.clone()).await?;

        log::debug!("[{}] starting sequence at '{}'", self.name(), first);
        self.core
            .send_request(
                Message::new(request.payload).with_context_name(request.context_name),
                &first,
            )
            .await
    }

    async fn process_response(
        &self,
        response: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let responder = response
            .sender
            .clone()
            .ok_or(CoordinationError::MissingField("sender"))?;
        let context = self
            .core
            .registry()
            .get_or_create_context(&response.context_name)
            .await?;

        match context.next_agent_in_sequence(&responder).await? {
            Some(next) => {
                log::debug!("[{}] forwarding from '{}' to '{}'", self.name(), responder, next);
                self.core
                    .send_request(
                        Message::new(response.payload).with_context_name(response.context_name),
                        &next,
                    )
                    .await
            }
            None => {
                let route = self
                    .route_response_to
                    .lock()
                    .expect("route slot poisoned")
                    .clone()
                    .ok_or(CoordinationError::MissingField("route_response_to"))?;
                log::debug!("[{}] sequence complete, responding to '{}'", self.name(), route);
                self.core
                    .send_response(
                        Message::new(response.payload)
                            .with_message_type(MessageType::Response)
                            .with_context_name(response.context_name),
                        &route,
                    )
                    .await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Phased coordination
// ---------------------------------------------------------------------------

/// Plans, dispatches, and iterates phased collaboration on a query.
pub struct PhasedCoordinator {
    core: AgentCore,
    llm: Arc<dyn LlmClient>,
    phases: Vec<String>,
    max_iterations: usize,
    confidence_score_threshold: i64,
    system_message: Option<String>,
    route_response_to: StdMutex<Option<String>>,
}

impl PhasedCoordinator {
    pub async fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        transport: Arc<dyn MessageTransport>,
        registry: Arc<Registry>,
    ) -> Result<Self, RegistryError> {
        let core = AgentCore::new(name, description, transport, registry).await?;
        Ok(Self {
            core,
            llm,
            phases: default_phases(),
            max_iterations: MAX_COORDINATOR_ITERATIONS,
            confidence_score_threshold: CONFIDENCE_SCORE_THRESHOLD,
            system_message: None,
            route_response_to: StdMutex::new(None),
        })
    }

    /// Override the configured phase names.
    pub fn with_phases(mut self, phases: Vec<String>) -> Self {
        self.phases = phases;
        self
    }

    /// Bound the number of iterations (original query plus rephrasings).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Override the confidence threshold a final answer must reach.
    pub fn with_confidence_score_threshold(mut self, threshold: i64) -> Self {
        self.confidence_score_threshold = threshold;
        self
    }

    /// Seed coordination chats with this system message instead of the
    /// LLM client's own.
    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    fn seed_system_message(&self) -> Option<String> {
        self.system_message
            .clone()
            .or_else(|| self.llm.system_message().map(str::to_string))
    }

    /// Complete over the chat's full history with no tools offered.
    async fn complete(
        &self,
        context: &Arc<Context>,
        chat_id: &str,
    ) -> Result<ChatMessage, Box<dyn Error + Send + Sync>> {
        let history = context.chat_completions(chat_id).await?;
        Ok(self.llm.process_chat_completion(&history, &[]).await?)
    }

    /// Send `query` to every agent of a phase in parallel.
    async fn dispatch_phase(
        &self,
        agents: &[String],
        query: &str,
        context_name: &str,
        chat_id: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::debug!(
            "[{}] dispatching phase to {:?} for chat {}",
            self.name(),
            agents,
            chat_id
        );
        let sends = agents.iter().map(|agent| {
            let message = Message::new(query)
                .with_context_name(context_name)
                .with_chat_id(chat_id);
            self.core.send_request(message, agent)
        });
        for result in join_all(sends).await {
            result?;
        }
        Ok(())
    }

    /// Ask for the final answer plus confidence score and decide: respond,
    /// give up, or rephrase and go back to phase zero.
    async fn finalize_or_iterate(
        &self,
        context: &Arc<Context>,
        chat_id: &str,
        context_name: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let final_answer_prompt = "What is the final answer for the original query? Provide the \
             answer followed by a confidence score from 0 to 100 to indicate how certain you are \
             of the answer. Format the response with just the answer first followed by just the \
             confidence score on the next line. For example:\n\
             Your answer goes here.\n85\n";
        context
            .append_chat_completion(chat_id, ChatMessage::user(final_answer_prompt))
            .await?;
        let reply = self.complete(context, chat_id).await?;

        // The answer block, then a lone score line; a non-numeric last line
        // scores zero.
        let lines: Vec<&str> = reply.content.lines().collect();
        let last_non_empty = lines.iter().rposition(|line| !line.trim().is_empty());
        let (answer, score) = match last_non_empty {
            Some(index) => {
                let score = lines[index].trim().parse::<i64>().unwrap_or(0);
                let answer = lines[..index].join("\n");
                (answer, score)
            }
            None => (String::new(), 0),
        };
        log::debug!("[{}] final answer scored {}", self.name(), score);

        let route = self
            .route_response_to
            .lock()
            .expect("route slot poisoned")
            .clone()
            .ok_or(CoordinationError::MissingField("route_response_to"))?;

        if score >= self.confidence_score_threshold {
            self.core
                .send_response(
                    Message::new(answer)
                        .with_message_type(MessageType::Response)
                        .with_context_name(context_name)
                        .with_chat_id(chat_id),
                    &route,
                )
                .await
        } else if context.queries(chat_id).await?.len() >= self.max_iterations {
            self.core
                .send_response(
                    Message::new(CANNOT_ANSWER)
                        .with_message_type(MessageType::CannotAnswer)
                        .with_context_name(context_name)
                        .with_chat_id(chat_id),
                    &route,
                )
                .await
        } else {
            let original = context
                .queries(chat_id)
                .await?
                .into_iter()
                .next()
                .ok_or(CoordinationError::MissingField("queries"))?;
            let rephrase_prompt = format!(
                "The final answer was not considered good enough to respond to the original \
                 query.\nThe original query was: {}\nYour task is to analyze the original query \
                 for its intent along with the conversation history and final answer to rephrase \
                 the original query to yield a better final answer. The response should contain \
                 only the rephrased query. Don't include anything else in the response.\n",
                original
            );
            context
                .append_chat_completion(chat_id, ChatMessage::user(rephrase_prompt))
                .await?;
            // Completing over the chat history keeps the rephrasing informed
            // by everything the collaborators contributed.
            let rephrased = self.complete(context, chat_id).await?;
            let rephrased_query = rephrased.content.clone();
            context.append_chat_completion(chat_id, rephrased).await?;

            context.set_current_phase(chat_id, 0).await?;
            context.add_query(chat_id, rephrased_query.clone()).await?;
            let agents = context.required_agents_for_current_phase(chat_id).await?;
            self.dispatch_phase(&agents, &rephrased_query, context_name, chat_id)
                .await
        }
    }
}

#[async_trait]
impl Agent for PhasedCoordinator {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(
        &self,
        request: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let requester = request
            .sender
            .clone()
            .ok_or(CoordinationError::MissingField("sender"))?;
        *self
            .route_response_to
            .lock()
            .expect("route slot poisoned") = Some(requester);

        let chat_id = Uuid::new_v4().to_string();
        let context = self
            .core
            .registry()
            .get_or_create_context(&request.context_name)
            .await?;

        // Planning: which agents are needed at all.
        let known_agents = self
            .core
            .registry()
            .agent_names_and_descriptions()
            .await?
            .into_iter()
            .map(|(name, description)| format!("{}: {}", name, description))
            .collect::<Vec<_>>()
            .join("\n");
        let agent_selection_prompt = format!(
            "Given the following query and a description of the agents that are available, \
             determine all of the agents that could be required to solve the query. Format the \
             response as a space separated list of agent names and don't include anything else \
             in the response.\nQuery: {}\nAvailable agents:\n{}\n",
            request.payload, known_agents
        );
        if let Some(system_message) = self.seed_system_message() {
            context
                .append_chat_completion(&chat_id, ChatMessage::system(system_message))
                .await?;
        }
        context
            .append_chat_completion(&chat_id, ChatMessage::user(agent_selection_prompt))
            .await?;
        let selection = self.complete(&context, &chat_id).await?;
        context.append_chat_completion(&chat_id, selection).await?;

        // Planning: bucket the selected agents into the configured phases.
        let agent_assignment_prompt = format!(
            "Assign each of the agents that will be required to solve the query to one of the \
             following phases:\n{}\nAssume that agents within a phase will be executed in \
             parallel. Format the response as a space separated list of agents for each phase, \
             where the first line contains the list of agents for the first phase and the second \
             line contains the list of agents for the second phase and so on. Don't include \
             anything else in the response.\n",
            self.phases.join(", ")
        );
        context
            .append_chat_completion(&chat_id, ChatMessage::user(agent_assignment_prompt))
            .await?;
        let assignment = self.complete(&context, &chat_id).await?;
        let phase_plan: Vec<Vec<String>> = assignment
            .content
            .lines()
            .map(|line| line.split_whitespace().map(String::from).collect::<Vec<_>>())
            .filter(|phase: &Vec<String>| !phase.is_empty())
            .collect();
        context.append_chat_completion(&chat_id, assignment).await?;
        if phase_plan.is_empty() {
            return Err(CoordinationError::EmptyPhasePlan.into());
        }

        let first_phase = phase_plan[0].clone();
        context
            .set_phase_assignments(&chat_id, phase_plan)
            .await?;
        context.set_current_phase(&chat_id, 0).await?;
        context.add_query(&chat_id, request.payload.clone()).await?;

        self.dispatch_phase(&first_phase, &request.payload, &request.context_name, &chat_id)
            .await
    }

    async fn process_response(
        &self,
        response: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if response.message_type != Some(MessageType::Ack) {
            // A protocol violation: the phase is not advanced.
            return Err(CoordinationError::UnexpectedResponse {
                sender: response.sender.unwrap_or_default(),
                payload: response.payload,
            }
            .into());
        }
        let chat_id = response
            .chat_id
            .clone()
            .ok_or(CoordinationError::MissingField("chat_id"))?;
        let responder = response
            .sender
            .clone()
            .ok_or(CoordinationError::MissingField("sender"))?;
        let context = self
            .core
            .registry()
            .get_or_create_context(&response.context_name)
            .await?;

        // ACKs arrive in any order; completion is keyed on the sender name.
        context
            .remove_required_agent_for_current_phase(&chat_id, &responder)
            .await?;
        if !context
            .required_agents_for_current_phase(&chat_id)
            .await?
            .is_empty()
        {
            return Ok(());
        }

        match context.advance_to_next_phase(&chat_id).await? {
            Some(next_phase) => {
                let query = context
                    .current_query(&chat_id)
                    .await?
                    .ok_or(CoordinationError::MissingField("queries"))?;
                self.dispatch_phase(&next_phase, &query, &response.context_name, &chat_id)
                    .await
            }
            None => {
                self.finalize_or_iterate(&context, &chat_id, &response.context_name)
                    .await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator
// ---------------------------------------------------------------------------

/// A phase participant: answers one request with its LLM over the shared
/// chat history, appends its contribution, and ACKs the coordinator.
pub struct CollaboratorAgent {
    core: AgentCore,
    llm: Arc<dyn LlmClient>,
    system_message: Option<String>,
}

impl CollaboratorAgent {
    pub async fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        transport: Arc<dyn MessageTransport>,
        registry: Arc<Registry>,
    ) -> Result<Self, RegistryError> {
        let core = AgentCore::new(name, description, transport, registry).await?;
        Ok(Self {
            core,
            llm,
            system_message: None,
        })
    }

    /// Seed completions with this system message instead of the LLM
    /// client's own.
    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }
}

#[async_trait]
impl Agent for CollaboratorAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(
        &self,
        request: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let requester = request
            .sender
            .clone()
            .ok_or(CoordinationError::MissingField("sender"))?;
        let context = self
            .core
            .registry()
            .get_or_create_context(&request.context_name)
            .await?;

        let mut messages = match &request.chat_id {
            Some(chat_id) => context.chat_completions(chat_id).await?,
            None => Vec::new(),
        };
        let system_message = self
            .system_message
            .clone()
            .or_else(|| self.llm.system_message().map(str::to_string));
        if let Some(system_message) = system_message {
            messages.push(ChatMessage::system(system_message));
        }
        messages.push(ChatMessage::user(request.payload.clone()));

        let reply = self.llm.process_chat_completion(&messages, &[]).await?;
        if let Some(chat_id) = &request.chat_id {
            // Only the contribution itself joins the shared history.
            context.append_chat_completion(chat_id, reply).await?;
        }

        let mut ack = Message::new("")
            .with_message_type(MessageType::Ack)
            .with_context_name(request.context_name);
        if let Some(chat_id) = request.chat_id {
            ack = ack.with_chat_id(chat_id);
        }
        self.core.send_response(ack, &requester).await
    }

    async fn process_response(
        &self,
        _response: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

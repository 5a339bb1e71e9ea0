//! Shared conversation state.
//!
//! A [`Context`] is a named workspace shared by every agent collaborating on
//! a query: the append-only message trace, the participants, the per-chat
//! LLM histories and tool bookkeeping, and the coordination state used by
//! the sequential and phased protocols.
//!
//! Contexts come in two backings selected by the owning
//! [`Registry`](crate::Registry)'s configuration:
//!
//! - **in-memory**: plain structures behind a mutex; every mutator is
//!   atomic with respect to concurrent callers in the same process.
//! - **shared store**: state lives in a [`KeyValueStore`] as UTF-8 JSON
//!   serializations, so multiple processes handed the same store observe
//!   the same trace, participants, and per-chat state. Mutators are atomic
//!   with respect to the store's native operations.
//!
//! Callers never branch on the backing; the split is hidden behind this
//! type's methods. Readers that iterate (the trace, a chat history) get a
//! snapshot taken at call time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde::{Deserialize, Serialize};

use crate::agentmesh::kv::{KeyValueStore, StoreError};
use crate::agentmesh::llm::ChatMessage;
use crate::agentmesh::message::Message;

/// Per-chat state: LLM history, offered tools, outstanding tool calls,
/// phase bookkeeping, query history.
#[derive(Debug, Default, Clone)]
struct ChatState {
    completions: Vec<ChatMessage>,
    available_tools: Vec<serde_json::Value>,
    required_tool_calls: Vec<String>,
    coordination: CoordinationRecord,
    queries: Vec<String>,
}

/// Phase bookkeeping for one chat of a phased coordination.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct CoordinationRecord {
    phase_assignments: Vec<Vec<String>>,
    current_phase: usize,
    required_agents: Vec<String>,
}

#[derive(Debug, Default)]
struct ContextState {
    message_trace: Vec<Message>,
    participants: Vec<String>,
    agents_sequence: Vec<String>,
    chats: HashMap<String, ChatState>,
}

impl ContextState {
    fn chat_mut(&mut self, chat_id: &str) -> &mut ChatState {
        self.chats.entry(chat_id.to_string()).or_default()
    }
}

enum Backend {
    Memory(StdMutex<ContextState>),
    Shared(Arc<dyn KeyValueStore>),
}

/// A named shared workspace for one conversation.
pub struct Context {
    name: String,
    backend: Backend,
}

impl Context {
    /// Create an in-memory context.
    pub(crate) fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: Backend::Memory(StdMutex::new(ContextState::default())),
        }
    }

    /// Create a context backed by a shared store.
    pub(crate) fn shared(name: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            name: name.into(),
            backend: Backend::Shared(store),
        }
    }

    /// The context's name; every message recorded here carries it.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn key(&self, suffix: &str) -> String {
        format!("ctx:{}:{}", self.name, suffix)
    }

    fn chat_key(&self, chat_id: &str, suffix: &str) -> String {
        format!("ctx:{}:chat:{}:{}", self.name, chat_id, suffix)
    }

    // -- message trace and participants -------------------------------------

    /// Append a message to the trace.
    pub async fn record_message(&self, message: &Message) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(state) => {
                state
                    .lock()
                    .expect("context state poisoned")
                    .message_trace
                    .push(message.clone());
                Ok(())
            }
            Backend::Shared(store) => {
                let encoded = message
                    .to_wire()
                    .map_err(|e| StoreError(e.to_string()))?
                    .into_bytes();
                store.list_push(&self.key("trace"), encoded).await
            }
        }
    }

    /// Snapshot of the trace, oldest first.
    pub async fn message_trace(&self) -> Result<Vec<Message>, StoreError> {
        match &self.backend {
            Backend::Memory(state) => Ok(state
                .lock()
                .expect("context state poisoned")
                .message_trace
                .clone()),
            Backend::Shared(store) => {
                let raw = store.list_range(&self.key("trace")).await?;
                raw.into_iter()
                    .map(|bytes| {
                        let text = String::from_utf8(bytes)
                            .map_err(|e| StoreError(e.to_string()))?;
                        Message::from_wire(&text).map_err(|e| StoreError(e.to_string()))
                    })
                    .collect()
            }
        }
    }

    /// Add an agent to the participants. Membership is monotonic until the
    /// context is removed; insertion order is preserved.
    pub async fn add_participant(&self, agent_name: &str) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(state) => {
                let mut state = state.lock().expect("context state poisoned");
                if !state.participants.iter().any(|p| p == agent_name) {
                    state.participants.push(agent_name.to_string());
                }
                Ok(())
            }
            Backend::Shared(store) => {
                store
                    .set_add(&self.key("participants"), agent_name.as_bytes().to_vec())
                    .await?;
                Ok(())
            }
        }
    }

    /// Snapshot of the participants, in the order they first appeared.
    pub async fn participants(&self) -> Result<Vec<String>, StoreError> {
        match &self.backend {
            Backend::Memory(state) => Ok(state
                .lock()
                .expect("context state poisoned")
                .participants
                .clone()),
            Backend::Shared(store) => {
                let raw = store.set_members(&self.key("participants")).await?;
                raw.into_iter()
                    .map(|bytes| String::from_utf8(bytes).map_err(|e| StoreError(e.to_string())))
                    .collect()
            }
        }
    }

    // -- per-chat LLM history ----------------------------------------------

    /// Append a turn to a chat's completion history.
    pub async fn append_chat_completion(
        &self,
        chat_id: &str,
        turn: ChatMessage,
    ) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(state) => {
                state
                    .lock()
                    .expect("context state poisoned")
                    .chat_mut(chat_id)
                    .completions
                    .push(turn);
                Ok(())
            }
            Backend::Shared(store) => {
                let encoded =
                    serde_json::to_vec(&turn).map_err(|e| StoreError(e.to_string()))?;
                store
                    .list_push(&self.chat_key(chat_id, "completions"), encoded)
                    .await
            }
        }
    }

    /// Snapshot of a chat's completion history; empty for unknown chats.
    pub async fn chat_completions(&self, chat_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        match &self.backend {
            Backend::Memory(state) => Ok(state
                .lock()
                .expect("context state poisoned")
                .chats
                .get(chat_id)
                .map(|c| c.completions.clone())
                .unwrap_or_default()),
            Backend::Shared(store) => {
                let raw = store.list_range(&self.chat_key(chat_id, "completions")).await?;
                raw.into_iter()
                    .map(|bytes| {
                        serde_json::from_slice(&bytes).map_err(|e| StoreError(e.to_string()))
                    })
                    .collect()
            }
        }
    }

    /// Whether a chat still has a completion history.
    pub async fn has_chat_completions(&self, chat_id: &str) -> Result<bool, StoreError> {
        Ok(!self.chat_completions(chat_id).await?.is_empty())
    }

    /// Drop a chat's completion history (called once a final reply has been
    /// sent).
    pub async fn drop_chat_completions(&self, chat_id: &str) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(state) => {
                let mut state = state.lock().expect("context state poisoned");
                if let Some(chat) = state.chats.get_mut(chat_id) {
                    chat.completions.clear();
                }
                Ok(())
            }
            Backend::Shared(store) => {
                store
                    .delete_prefix(&self.chat_key(chat_id, "completions"))
                    .await
            }
        }
    }

    // -- per-chat tool bookkeeping ------------------------------------------

    /// Offer a tool schema for a chat.
    pub async fn add_available_tool(
        &self,
        chat_id: &str,
        schema: serde_json::Value,
    ) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(state) => {
                state
                    .lock()
                    .expect("context state poisoned")
                    .chat_mut(chat_id)
                    .available_tools
                    .push(schema);
                Ok(())
            }
            Backend::Shared(store) => {
                let encoded =
                    serde_json::to_vec(&schema).map_err(|e| StoreError(e.to_string()))?;
                store.list_push(&self.chat_key(chat_id, "tools"), encoded).await
            }
        }
    }

    /// The tool schemas offered for a chat.
    pub async fn available_tools(
        &self,
        chat_id: &str,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        match &self.backend {
            Backend::Memory(state) => Ok(state
                .lock()
                .expect("context state poisoned")
                .chats
                .get(chat_id)
                .map(|c| c.available_tools.clone())
                .unwrap_or_default()),
            Backend::Shared(store) => {
                let raw = store.list_range(&self.chat_key(chat_id, "tools")).await?;
                raw.into_iter()
                    .map(|bytes| {
                        serde_json::from_slice(&bytes).map_err(|e| StoreError(e.to_string()))
                    })
                    .collect()
            }
        }
    }

    /// Record an outstanding tool invocation for a chat. The same tool name
    /// may be outstanding more than once.
    pub async fn append_required_tool_call(
        &self,
        chat_id: &str,
        tool_name: &str,
    ) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(state) => {
                state
                    .lock()
                    .expect("context state poisoned")
                    .chat_mut(chat_id)
                    .required_tool_calls
                    .push(tool_name.to_string());
                Ok(())
            }
            Backend::Shared(store) => {
                let key = self.chat_key(chat_id, "required");
                let mut calls = self.load_required(store, &key).await?;
                calls.push(tool_name.to_string());
                self.store_required(store, &key, &calls).await
            }
        }
    }

    /// Clear one occurrence of an outstanding tool invocation.
    pub async fn remove_required_tool_call(
        &self,
        chat_id: &str,
        tool_name: &str,
    ) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(state) => {
                let mut state = state.lock().expect("context state poisoned");
                let calls = &mut state.chat_mut(chat_id).required_tool_calls;
                if let Some(pos) = calls.iter().position(|c| c == tool_name) {
                    calls.remove(pos);
                }
                Ok(())
            }
            Backend::Shared(store) => {
                let key = self.chat_key(chat_id, "required");
                let mut calls = self.load_required(store, &key).await?;
                if let Some(pos) = calls.iter().position(|c| c == tool_name) {
                    calls.remove(pos);
                }
                self.store_required(store, &key, &calls).await
            }
        }
    }

    /// The outstanding tool invocations for a chat. A chat is tool-idle iff
    /// this is empty.
    pub async fn required_tool_calls(&self, chat_id: &str) -> Result<Vec<String>, StoreError> {
        match &self.backend {
            Backend::Memory(state) => Ok(state
                .lock()
                .expect("context state poisoned")
                .chats
                .get(chat_id)
                .map(|c| c.required_tool_calls.clone())
                .unwrap_or_default()),
            Backend::Shared(store) => {
                let key = self.chat_key(chat_id, "required");
                self.load_required(store, &key).await
            }
        }
    }

    async fn load_required(
        &self,
        store: &Arc<dyn KeyValueStore>,
        key: &str,
    ) -> Result<Vec<String>, StoreError> {
        match store.get(key).await? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    async fn store_required(
        &self,
        store: &Arc<dyn KeyValueStore>,
        key: &str,
        calls: &[String],
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(calls).map_err(|e| StoreError(e.to_string()))?;
        store.put(key, encoded).await
    }

    // -- sequential coordination --------------------------------------------

    /// Store the agent sequence for sequential coordination.
    pub async fn set_agents_sequence(&self, agents: Vec<String>) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(state) => {
                state
                    .lock()
                    .expect("context state poisoned")
                    .agents_sequence = agents;
                Ok(())
            }
            Backend::Shared(store) => {
                let encoded =
                    serde_json::to_vec(&agents).map_err(|e| StoreError(e.to_string()))?;
                store.put(&self.key("sequence"), encoded).await
            }
        }
    }

    /// The agent after `current` in the stored sequence, or `None` when
    /// `current` is the last (or unknown).
    pub async fn next_agent_in_sequence(
        &self,
        current: &str,
    ) -> Result<Option<String>, StoreError> {
        let sequence = match &self.backend {
            Backend::Memory(state) => state
                .lock()
                .expect("context state poisoned")
                .agents_sequence
                .clone(),
            Backend::Shared(store) => match store.get(&self.key("sequence")).await? {
                Some(bytes) => {
                    serde_json::from_slice(&bytes).map_err(|e| StoreError(e.to_string()))?
                }
                None => Vec::new(),
            },
        };
        Ok(sequence
            .iter()
            .position(|a| a == current)
            .and_then(|pos| sequence.get(pos + 1).cloned()))
    }

    // -- phased coordination -----------------------------------------------

    async fn load_coordination(&self, chat_id: &str) -> Result<CoordinationRecord, StoreError> {
        match &self.backend {
            Backend::Memory(state) => Ok(state
                .lock()
                .expect("context state poisoned")
                .chats
                .get(chat_id)
                .map(|c| c.coordination.clone())
                .unwrap_or_default()),
            Backend::Shared(store) => {
                match store.get(&self.chat_key(chat_id, "coordination")).await? {
                    Some(bytes) => {
                        serde_json::from_slice(&bytes).map_err(|e| StoreError(e.to_string()))
                    }
                    None => Ok(CoordinationRecord::default()),
                }
            }
        }
    }

    async fn store_coordination(
        &self,
        chat_id: &str,
        record: CoordinationRecord,
    ) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(state) => {
                state
                    .lock()
                    .expect("context state poisoned")
                    .chat_mut(chat_id)
                    .coordination = record;
                Ok(())
            }
            Backend::Shared(store) => {
                let encoded =
                    serde_json::to_vec(&record).map_err(|e| StoreError(e.to_string()))?;
                store.put(&self.chat_key(chat_id, "coordination"), encoded).await
            }
        }
    }

    /// Store the phase plan for a chat: one list of agent names per phase.
    pub async fn set_phase_assignments(
        &self,
        chat_id: &str,
        phases: Vec<Vec<String>>,
    ) -> Result<(), StoreError> {
        let mut record = self.load_coordination(chat_id).await?;
        record.phase_assignments = phases;
        self.store_coordination(chat_id, record).await
    }

    /// The phase plan for a chat.
    pub async fn phase_assignments(&self, chat_id: &str) -> Result<Vec<Vec<String>>, StoreError> {
        Ok(self.load_coordination(chat_id).await?.phase_assignments)
    }

    /// Position the chat at phase `index` and reset the awaited agents to
    /// that phase's full assignment.
    pub async fn set_current_phase(&self, chat_id: &str, index: usize) -> Result<(), StoreError> {
        let mut record = self.load_coordination(chat_id).await?;
        record.current_phase = index;
        record.required_agents = record
            .phase_assignments
            .get(index)
            .cloned()
            .unwrap_or_default();
        self.store_coordination(chat_id, record).await
    }

    /// The index of the chat's current phase.
    pub async fn current_phase(&self, chat_id: &str) -> Result<usize, StoreError> {
        Ok(self.load_coordination(chat_id).await?.current_phase)
    }

    /// Advance to the next phase. Returns that phase's agents (also resetting
    /// the awaited set to them), or `None` when the last phase has completed.
    pub async fn advance_to_next_phase(
        &self,
        chat_id: &str,
    ) -> Result<Option<Vec<String>>, StoreError> {
        let mut record = self.load_coordination(chat_id).await?;
        let next = record.current_phase + 1;
        match record.phase_assignments.get(next).cloned() {
            Some(agents) => {
                record.current_phase = next;
                record.required_agents = agents.clone();
                self.store_coordination(chat_id, record).await?;
                Ok(Some(agents))
            }
            None => Ok(None),
        }
    }

    /// The agents whose ACK is still awaited in the current phase.
    pub async fn required_agents_for_current_phase(
        &self,
        chat_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self.load_coordination(chat_id).await?.required_agents)
    }

    /// Mark an agent of the current phase as done.
    pub async fn remove_required_agent_for_current_phase(
        &self,
        chat_id: &str,
        agent_name: &str,
    ) -> Result<(), StoreError> {
        let mut record = self.load_coordination(chat_id).await?;
        record.required_agents.retain(|a| a != agent_name);
        self.store_coordination(chat_id, record).await
    }

    // -- query history ------------------------------------------------------

    /// Record a query (original or rephrased) for iteration accounting.
    pub async fn add_query(&self, chat_id: &str, query: impl Into<String>) -> Result<(), StoreError> {
        let query = query.into();
        match &self.backend {
            Backend::Memory(state) => {
                state
                    .lock()
                    .expect("context state poisoned")
                    .chat_mut(chat_id)
                    .queries
                    .push(query);
                Ok(())
            }
            Backend::Shared(store) => {
                store
                    .list_push(&self.chat_key(chat_id, "queries"), query.into_bytes())
                    .await
            }
        }
    }

    /// All queries recorded for a chat, oldest first.
    pub async fn queries(&self, chat_id: &str) -> Result<Vec<String>, StoreError> {
        match &self.backend {
            Backend::Memory(state) => Ok(state
                .lock()
                .expect("context state poisoned")
                .chats
                .get(chat_id)
                .map(|c| c.queries.clone())
                .unwrap_or_default()),
            Backend::Shared(store) => {
                let raw = store.list_range(&self.chat_key(chat_id, "queries")).await?;
                raw.into_iter()
                    .map(|bytes| String::from_utf8(bytes).map_err(|e| StoreError(e.to_string())))
                    .collect()
            }
        }
    }

    /// The most recently recorded query for a chat.
    pub async fn current_query(&self, chat_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.queries(chat_id).await?.into_iter().last())
    }

    // -- lifecycle ----------------------------------------------------------

    /// Discard all of this context's state. Called by the registry when the
    /// context is removed.
    pub(crate) async fn clear(&self) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(state) => {
                *state.lock().expect("context state poisoned") = ContextState::default();
                Ok(())
            }
            Backend::Shared(store) => {
                store.delete_prefix(&format!("ctx:{}:", self.name)).await
            }
        }
    }

    /// Test-only view of which backing this context uses.
    #[cfg(test)]
    fn is_memory(&self) -> bool {
        matches!(self.backend, Backend::Memory(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentmesh::kv::InMemoryKeyValueStore;
    use crate::agentmesh::message::MessageType;

    fn both_backings() -> Vec<Context> {
        vec![
            Context::in_memory("t"),
            Context::shared("t", Arc::new(InMemoryKeyValueStore::new())),
        ]
    }

    #[tokio::test]
    async fn trace_preserves_order_in_both_backings() {
        for ctx in both_backings() {
            let first = Message::new("one").with_sender("a").with_context_name("t");
            let second = Message::new("two")
                .with_sender("b")
                .with_message_type(MessageType::Response)
                .with_context_name("t");
            ctx.record_message(&first).await.unwrap();
            ctx.record_message(&second).await.unwrap();

            let trace = ctx.message_trace().await.unwrap();
            assert_eq!(trace, vec![first.clone(), second.clone()]);
        }
    }

    #[tokio::test]
    async fn participants_deduplicate_and_keep_insertion_order() {
        for ctx in both_backings() {
            ctx.add_participant("Agent1").await.unwrap();
            ctx.add_participant("Agent2").await.unwrap();
            ctx.add_participant("Agent1").await.unwrap();
            ctx.add_participant("Agent3").await.unwrap();
            assert_eq!(
                ctx.participants().await.unwrap(),
                vec!["Agent1", "Agent2", "Agent3"]
            );
        }
    }

    #[tokio::test]
    async fn required_tool_calls_behave_as_a_multiset() {
        for ctx in both_backings() {
            ctx.append_required_tool_call("c", "add").await.unwrap();
            ctx.append_required_tool_call("c", "add").await.unwrap();
            ctx.append_required_tool_call("c", "lookup").await.unwrap();

            ctx.remove_required_tool_call("c", "add").await.unwrap();
            let remaining = ctx.required_tool_calls("c").await.unwrap();
            assert_eq!(remaining, vec!["add", "lookup"]);

            ctx.remove_required_tool_call("c", "add").await.unwrap();
            ctx.remove_required_tool_call("c", "lookup").await.unwrap();
            assert!(ctx.required_tool_calls("c").await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn chat_completions_are_isolated_per_chat_and_droppable() {
        for ctx in both_backings() {
            ctx.append_chat_completion("c1", ChatMessage::user("hi"))
                .await
                .unwrap();
            ctx.append_chat_completion("c2", ChatMessage::user("yo"))
                .await
                .unwrap();

            assert_eq!(ctx.chat_completions("c1").await.unwrap().len(), 1);
            ctx.drop_chat_completions("c1").await.unwrap();
            assert!(!ctx.has_chat_completions("c1").await.unwrap());
            assert!(ctx.has_chat_completions("c2").await.unwrap());
        }
    }

    #[tokio::test]
    async fn sequence_lookup_returns_successor_then_none() {
        for ctx in both_backings() {
            ctx.set_agents_sequence(vec!["A".into(), "B".into(), "C".into()])
                .await
                .unwrap();
            assert_eq!(ctx.next_agent_in_sequence("A").await.unwrap().as_deref(), Some("B"));
            assert_eq!(ctx.next_agent_in_sequence("B").await.unwrap().as_deref(), Some("C"));
            assert_eq!(ctx.next_agent_in_sequence("C").await.unwrap(), None);
            assert_eq!(ctx.next_agent_in_sequence("X").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn phase_bookkeeping_keeps_required_a_subset_of_the_plan() {
        for ctx in both_backings() {
            let phases = vec![vec!["p".to_string(), "q".to_string()], vec!["r".to_string()]];
            ctx.set_phase_assignments("c", phases.clone()).await.unwrap();
            ctx.set_current_phase("c", 0).await.unwrap();

            assert_eq!(
                ctx.required_agents_for_current_phase("c").await.unwrap(),
                vec!["p", "q"]
            );
            ctx.remove_required_agent_for_current_phase("c", "p")
                .await
                .unwrap();
            let required = ctx.required_agents_for_current_phase("c").await.unwrap();
            for agent in &required {
                assert!(phases[0].contains(agent));
            }

            ctx.remove_required_agent_for_current_phase("c", "q")
                .await
                .unwrap();
            let next = ctx.advance_to_next_phase("c").await.unwrap();
            assert_eq!(next, Some(vec!["r".to_string()]));
            assert_eq!(ctx.current_phase("c").await.unwrap(), 1);
            assert_eq!(ctx.advance_to_next_phase("c").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn queries_accumulate_and_expose_the_latest() {
        for ctx in both_backings() {
            ctx.add_query("c", "original").await.unwrap();
            ctx.add_query("c", "rephrased").await.unwrap();
            assert_eq!(ctx.queries("c").await.unwrap().len(), 2);
            assert_eq!(
                ctx.current_query("c").await.unwrap().as_deref(),
                Some("rephrased")
            );
        }
    }

    #[tokio::test]
    async fn shared_contexts_with_one_store_observe_the_same_state() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let writer = Context::shared("shared", store.clone());
        let reader = Context::shared("shared", store);
        assert!(!writer.is_memory());

        writer
            .record_message(&Message::new("hello").with_context_name("shared"))
            .await
            .unwrap();
        writer.add_participant("Agent1").await.unwrap();

        assert_eq!(reader.message_trace().await.unwrap().len(), 1);
        assert_eq!(reader.participants().await.unwrap(), vec!["Agent1"]);
    }

    #[tokio::test]
    async fn clear_discards_everything() {
        for ctx in both_backings() {
            ctx.record_message(&Message::new("m").with_context_name("t"))
                .await
                .unwrap();
            ctx.add_participant("a").await.unwrap();
            ctx.add_query("c", "q").await.unwrap();
            ctx.clear().await.unwrap();
            assert!(ctx.message_trace().await.unwrap().is_empty());
            assert!(ctx.participants().await.unwrap().is_empty());
            assert!(ctx.queries("c").await.unwrap().is_empty());
        }
    }
}

//! Retrieval-augmented agents.
//!
//! [`VectorRagAgent`] and [`GraphRagAgent`] share one shape: retrieve
//! documents for the query, answer strictly from their contents, and append
//! a "Source Documents" footer naming what was used. They differ only in
//! the retrieval backend.
//!
//! [`CoVeChallengerAgent`] implements Chain-of-Verification
//! (<https://arxiv.org/pdf/2309.11495>): given a question plus a baseline
//! answer, it plans verification questions, answers each one against the
//! vector store individually, and asks for a revised answer incorporating
//! the verification results.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agentmesh::agent::{Agent, AgentCore};
use crate::agentmesh::llm::{LlmClient, LlmError};
use crate::agentmesh::message::{Message, MessageType};
use crate::agentmesh::registry::{Registry, RegistryError};
use crate::agentmesh::retrieval::{Document, GraphStore, VectorStore};
use crate::agentmesh::transport::MessageTransport;

/// Collection queried when none is configured.
pub const DEFAULT_COLLECTION: &str = "agentmesh-collection";

/// Documents retrieved per query when not configured otherwise.
pub const DEFAULT_RETRIEVAL_K: usize = 4;

/// Answer `question` using only the retrieved documents, then append the
/// source footer.
async fn answer_from_documents(
    llm: &Arc<dyn LlmClient>,
    documents: &[Document],
    question: &str,
) -> Result<String, Box<dyn Error + Send + Sync>> {
    let context: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
    let prompt = format!(
        "Answer the question based only on the following context:\n{}\nQuestion: {}\n",
        context.join("\n"),
        question
    );
    let reply = llm.process_single_prompt(&prompt).await?;

    let mut sources = String::new();
    for document in documents {
        let metadata = serde_json::to_string(&document.metadata)
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
        sources.push_str(&format!(
            "Source Document:\n    Content: {}\n    Metadata: {}\n\n",
            document.content, metadata
        ));
    }
    Ok(format!("{}\n\nSource Documents:\n{}", reply.content, sources))
}

fn reply_for(request: &Message, payload: String) -> Message {
    let mut response = Message::new(payload)
        .with_message_type(MessageType::Response)
        .with_context_name(request.context_name.clone());
    if let Some(chat_id) = &request.chat_id {
        response = response.with_chat_id(chat_id.clone());
    }
    response
}

fn requester_of(request: &Message) -> Result<String, Box<dyn Error + Send + Sync>> {
    match &request.sender {
        Some(sender) => Ok(sender.clone()),
        None => Err("request carried no sender to respond to".into()),
    }
}

// ---------------------------------------------------------------------------
// Vector RAG
// ---------------------------------------------------------------------------

/// Answers requests from the `k` most similar documents of a vector
/// collection.
pub struct VectorRagAgent {
    core: AgentCore,
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn VectorStore>,
    collection: String,
    k: usize,
}

impl VectorRagAgent {
    pub async fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn VectorStore>,
        transport: Arc<dyn MessageTransport>,
        registry: Arc<Registry>,
    ) -> Result<Self, RegistryError> {
        let core = AgentCore::new(name, description, transport, registry).await?;
        Ok(Self {
            core,
            llm,
            store,
            collection: DEFAULT_COLLECTION.to_string(),
            k: DEFAULT_RETRIEVAL_K,
        })
    }

    /// Query a different collection than the default.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Retrieve a different number of documents per query.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }
}

#[async_trait]
impl Agent for VectorRagAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(
        &self,
        request: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let requester = requester_of(&request)?;
        let retrieved = self
            .store
            .query(&[request.payload.clone()], &self.collection, self.k)
            .await?;
        let documents = retrieved.into_iter().next().unwrap_or_default();
        let answer = answer_from_documents(&self.llm, &documents, &request.payload).await?;
        self.core
            .send_response(reply_for(&request, answer), &requester)
            .await
    }

    async fn process_response(
        &self,
        _response: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Graph RAG
// ---------------------------------------------------------------------------

/// Same shape as [`VectorRagAgent`], but retrieval goes to a graph store
/// with embeddings; an optional retrieval query template is applied
/// server-side.
pub struct GraphRagAgent {
    core: AgentCore,
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn GraphStore>,
    retrieval_query: Option<String>,
    k: usize,
}

impl GraphRagAgent {
    pub async fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn GraphStore>,
        transport: Arc<dyn MessageTransport>,
        registry: Arc<Registry>,
    ) -> Result<Self, RegistryError> {
        let core = AgentCore::new(name, description, transport, registry).await?;
        Ok(Self {
            core,
            llm,
            store,
            retrieval_query: None,
            k: DEFAULT_RETRIEVAL_K,
        })
    }

    /// Set the server-side retrieval query template.
    pub fn with_retrieval_query(mut self, retrieval_query: impl Into<String>) -> Self {
        self.retrieval_query = Some(retrieval_query.into());
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }
}

#[async_trait]
impl Agent for GraphRagAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(
        &self,
        request: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let requester = requester_of(&request)?;
        let documents = self
            .store
            .query_with_embeddings(&request.payload, self.k, self.retrieval_query.as_deref())
            .await?;
        let answer = answer_from_documents(&self.llm, &documents, &request.payload).await?;
        self.core
            .send_response(reply_for(&request, answer), &requester)
            .await
    }

    async fn process_response(
        &self,
        _response: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Chain-of-Verification challenger
// ---------------------------------------------------------------------------

/// Challenges a baseline answer with verification questions answered
/// against the vector store, then asks for a revised answer.
///
/// The revised answer is expected in the exact single-key shape
/// `{'revised': '...'}`; a reply not in that shape is an error surfaced
/// upstream, never silently passed through.
pub struct CoVeChallengerAgent {
    core: AgentCore,
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn VectorStore>,
    collection: String,
    k: usize,
    num_verification_questions: usize,
}

impl CoVeChallengerAgent {
    pub async fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn VectorStore>,
        transport: Arc<dyn MessageTransport>,
        registry: Arc<Registry>,
    ) -> Result<Self, RegistryError> {
        let core = AgentCore::new(name, description, transport, registry).await?;
        Ok(Self {
            core,
            llm,
            store,
            collection: DEFAULT_COLLECTION.to_string(),
            k: DEFAULT_RETRIEVAL_K,
            num_verification_questions: 4,
        })
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Generate a different number of verification questions.
    pub fn with_num_verification_questions(mut self, n: usize) -> Self {
        self.num_verification_questions = n;
        self
    }

    /// The three-step chain: plan verifications, execute each against the
    /// store, generate the revised answer.
    async fn challenge(&self, baseline: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let plan_prompt = format!(
            "Given the following question and baseline response, generate a list of {} \
             verification questions that could help determine if there are any mistakes \
             in the baseline response:\n{}\n\
             Your response should contain only the list of questions, one per line.\n",
            self.num_verification_questions, baseline
        );
        let planned = self.llm.process_single_prompt(&plan_prompt).await?;

        let mut verification_results = String::new();
        for question in planned.content.lines().filter(|q| !q.trim().is_empty()) {
            let retrieved = self
                .store
                .query(&[question.to_string()], &self.collection, self.k)
                .await?;
            let documents = retrieved.into_iter().next().unwrap_or_default();
            let context: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
            let verify_prompt = format!(
                "Answer the question based only on the following context:\n{}\nQuestion: {}\n",
                context.join("\n"),
                question
            );
            let verified = self.llm.process_single_prompt(&verify_prompt).await?;
            verification_results.push_str(&format!(
                "Verification Question: {}\nVerification Result: {}\n",
                question, verified.content
            ));
        }

        let revise_prompt = format!(
            "Given the following question, baseline response, and a list of verification \
             questions and results, generate a revised response incorporating the \
             verification results:\n{}\n{}\n\
             Your response must contain only the revised response to the question in the \
             JSON format shown below:\n{{'revised': 'Your revised response to the question.'}}\n",
            baseline, verification_results
        );
        let revised = self.llm.process_single_prompt(&revise_prompt).await?;
        let content = revised.content.trim();
        if content.starts_with('{') && content.contains("revised") {
            Ok(revised.content)
        } else {
            Err(LlmError::UnparseableOutput(format!(
                "revised answer not in the expected single-key shape: {}",
                revised.content
            ))
            .into())
        }
    }
}

#[async_trait]
impl Agent for CoVeChallengerAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(
        &self,
        request: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let requester = requester_of(&request)?;
        let revised = self.challenge(&request.payload).await?;
        self.core
            .send_response(reply_for(&request, revised), &requester)
            .await
    }

    async fn process_response(
        &self,
        _response: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

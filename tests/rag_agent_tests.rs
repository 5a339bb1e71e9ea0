//! Retrieval-augmented agents: vector, graph, and chain-of-verification.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use agentmesh::agentmesh::agent::{start_agent, stop_agent};
use agentmesh::agentmesh::agents::{CoVeChallengerAgent, GraphRagAgent, VectorRagAgent};
use agentmesh::agentmesh::llm::LlmError;
use agentmesh::agentmesh::retrieval::{Document, GraphStore, RetrievalError, VectorStore};
use agentmesh::agentmesh::transport::local::LocalTransport;
use agentmesh::{Agent, AgentCore, ChatMessage, LlmClient, Message, Registry};

struct EchoClient;

#[async_trait]
impl LlmClient for EchoClient {
    async fn process_single_prompt(&self, prompt: &str) -> Result<ChatMessage, LlmError> {
        Ok(ChatMessage::assistant(format!("LLM:{}", prompt)))
    }

    async fn process_chat_completion(
        &self,
        messages: &[ChatMessage],
        _tools: &[serde_json::Value],
    ) -> Result<ChatMessage, LlmError> {
        let last = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ChatMessage::assistant(format!("LLM:{}", last)))
    }
}

struct ScriptedClient {
    replies: Mutex<VecDeque<ChatMessage>>,
}

impl ScriptedClient {
    fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(ChatMessage::assistant).collect()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn process_single_prompt(&self, _prompt: &str) -> Result<ChatMessage, LlmError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Transport("script exhausted".to_string()))
    }

    async fn process_chat_completion(
        &self,
        _messages: &[ChatMessage],
        _tools: &[serde_json::Value],
    ) -> Result<ChatMessage, LlmError> {
        self.process_single_prompt("").await
    }
}

/// Serves the same canned documents for every query.
struct CannedVectorStore {
    documents: Vec<Document>,
}

#[async_trait]
impl VectorStore for CannedVectorStore {
    async fn query(
        &self,
        texts: &[String],
        _collection: &str,
        _k: usize,
    ) -> Result<Vec<Vec<Document>>, RetrievalError> {
        Ok(texts.iter().map(|_| self.documents.clone()).collect())
    }
}

/// Serves canned documents and records the retrieval query it was given.
struct CannedGraphStore {
    documents: Vec<Document>,
    seen_retrieval_query: Mutex<Option<String>>,
}

#[async_trait]
impl GraphStore for CannedGraphStore {
    async fn query_with_embeddings(
        &self,
        _query: &str,
        _k: usize,
        retrieval_query: Option<&str>,
    ) -> Result<Vec<Document>, RetrievalError> {
        *self.seen_retrieval_query.lock().unwrap() = retrieval_query.map(str::to_string);
        Ok(self.documents.clone())
    }
}

struct RecorderAgent {
    core: AgentCore,
    responses: Mutex<Vec<Message>>,
}

impl RecorderAgent {
    async fn new(name: &str, registry: Arc<Registry>) -> Arc<Self> {
        let transport = Arc::new(LocalTransport::new(name));
        let core = AgentCore::new(name, "records responses", transport, registry)
            .await
            .expect("register");
        Arc::new(Self {
            core,
            responses: Mutex::new(Vec::new()),
        })
    }

    fn responses(&self) -> Vec<Message> {
        self.responses.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for RecorderAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(
        &self,
        _request: Message,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    async fn process_response(
        &self,
        response: Message,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.responses.lock().unwrap().push(response);
        Ok(())
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

#[tokio::test]
async fn vector_rag_answers_with_a_source_footer() {
    let registry = Arc::new(Registry::new());
    let store = Arc::new(CannedVectorStore {
        documents: vec![
            Document::new("The Eiffel Tower is in Paris.")
                .with_metadata("source", serde_json::json!("landmarks.txt")),
        ],
    });
    let rag = Arc::new(
        VectorRagAgent::new(
            "VectorRag",
            "Answers from the vector store",
            Arc::new(EchoClient),
            store,
            Arc::new(LocalTransport::new("VectorRag")),
            registry.clone(),
        )
        .await
        .unwrap(),
    );
    let recorder = RecorderAgent::new("VectorRagCaller", registry.clone()).await;
    start_agent(rag.clone()).await.unwrap();
    start_agent(recorder.clone()).await.unwrap();

    recorder
        .core()
        .send_request(Message::new("Where is the Eiffel Tower?"), "VectorRag")
        .await
        .unwrap();
    wait_for(|| !recorder.responses().is_empty()).await;

    let response = recorder.responses().remove(0);
    // The prompt confines the model to the retrieved context...
    assert!(response
        .payload
        .starts_with("LLM:Answer the question based only on the following context:"));
    assert!(response.payload.contains("The Eiffel Tower is in Paris."));
    assert!(response.payload.contains("Question: Where is the Eiffel Tower?"));
    // ...and the reply carries the source footer.
    assert!(response.payload.contains("Source Documents:"));
    assert!(response.payload.contains(r#""source":"landmarks.txt""#));

    stop_agent(rag.as_ref()).await;
    stop_agent(recorder.as_ref()).await;
}

#[tokio::test]
async fn graph_rag_forwards_the_retrieval_query_template() {
    let registry = Arc::new(Registry::new());
    let store = Arc::new(CannedGraphStore {
        documents: vec![Document::new("The Colosseum is located in Italy")],
        seen_retrieval_query: Mutex::new(None),
    });
    let rag = Arc::new(
        GraphRagAgent::new(
            "GraphRag",
            "Answers from the graph store",
            Arc::new(EchoClient),
            store.clone(),
            Arc::new(LocalTransport::new("GraphRag")),
            registry.clone(),
        )
        .await
        .unwrap()
        .with_retrieval_query("RETURN landmark.name AS text"),
    );
    let recorder = RecorderAgent::new("GraphRagCaller", registry.clone()).await;
    start_agent(rag.clone()).await.unwrap();
    start_agent(recorder.clone()).await.unwrap();

    recorder
        .core()
        .send_request(Message::new("Where is the Colosseum?"), "GraphRag")
        .await
        .unwrap();
    wait_for(|| !recorder.responses().is_empty()).await;

    let response = recorder.responses().remove(0);
    assert!(response.payload.contains("The Colosseum is located in Italy"));
    assert!(response.payload.contains("Source Documents:"));
    assert_eq!(
        store.seen_retrieval_query.lock().unwrap().as_deref(),
        Some("RETURN landmark.name AS text")
    );

    stop_agent(rag.as_ref()).await;
    stop_agent(recorder.as_ref()).await;
}

#[tokio::test]
async fn cove_challenger_returns_the_revised_answer() {
    let registry = Arc::new(Registry::new());
    let store = Arc::new(CannedVectorStore {
        documents: vec![Document::new("Verified fact.")],
    });
    // Plan two verification questions, answer each, then revise.
    let llm = Arc::new(ScriptedClient::new(vec![
        "Is the tower in Paris?\nWas it built in 1889?",
        "Yes, it is in Paris.",
        "Yes, completed in 1889.",
        "{'revised': 'The Eiffel Tower, completed in 1889, is in Paris.'}",
    ]));
    let challenger = Arc::new(
        CoVeChallengerAgent::new(
            "Challenger",
            "Challenges baseline answers",
            llm,
            store,
            Arc::new(LocalTransport::new("Challenger")),
            registry.clone(),
        )
        .await
        .unwrap()
        .with_num_verification_questions(2),
    );
    let recorder = RecorderAgent::new("ChallengerCaller", registry.clone()).await;
    start_agent(challenger.clone()).await.unwrap();
    start_agent(recorder.clone()).await.unwrap();

    recorder
        .core()
        .send_request(
            Message::new("Question: Where is the Eiffel Tower?\nBaseline: Somewhere in France."),
            "Challenger",
        )
        .await
        .unwrap();
    wait_for(|| !recorder.responses().is_empty()).await;

    let response = recorder.responses().remove(0);
    assert_eq!(
        response.payload,
        "{'revised': 'The Eiffel Tower, completed in 1889, is in Paris.'}"
    );

    stop_agent(challenger.as_ref()).await;
    stop_agent(recorder.as_ref()).await;
}

#[tokio::test]
async fn cove_challenger_rejects_a_nonconforming_revision() {
    let registry = Arc::new(Registry::new());
    let store = Arc::new(CannedVectorStore {
        documents: vec![Document::new("Verified fact.")],
    });
    let llm = Arc::new(ScriptedClient::new(vec![
        "Only question?",
        "Only answer.",
        "Here is my revised answer, in prose.",
    ]));
    let challenger = Arc::new(
        CoVeChallengerAgent::new(
            "StrictChallenger",
            "Challenges baseline answers",
            llm,
            store,
            Arc::new(LocalTransport::new("StrictChallenger")),
            registry.clone(),
        )
        .await
        .unwrap()
        .with_num_verification_questions(1),
    );
    let recorder = RecorderAgent::new("StrictChallengerCaller", registry.clone()).await;
    start_agent(challenger.clone()).await.unwrap();
    start_agent(recorder.clone()).await.unwrap();

    recorder
        .core()
        .send_request(Message::new("Question and baseline."), "StrictChallenger")
        .await
        .unwrap();
    wait_for(|| !recorder.responses().is_empty()).await;

    // The non-conforming revision surfaces as an error response, not as a
    // silently passed-through answer.
    let response = recorder.responses().remove(0);
    assert!(response.payload.starts_with("Error processing request:"));
    assert!(response.payload.contains("structured output unparseable"));

    stop_agent(challenger.as_ref()).await;
    stop_agent(recorder.as_ref()).await;
}

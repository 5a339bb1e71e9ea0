//! Narrow contracts for the retrieval collaborators.
//!
//! The RAG agents consume exactly one operation from each backend: a
//! similarity query returning documents. Real vector or graph database
//! integrations implement these traits out of tree; the test suite uses
//! canned stubs.

use std::error::Error;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A retrieved document: content plus free-form metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A failure inside a retrieval backend.
#[derive(Debug)]
pub struct RetrievalError(pub String);

impl fmt::Display for RetrievalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "retrieval error: {}", self.0)
    }
}

impl Error for RetrievalError {}

/// Similarity search over a vector collection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// For each query text, the `k` most similar documents in `collection`.
    async fn query(
        &self,
        texts: &[String],
        collection: &str,
        k: usize,
    ) -> Result<Vec<Vec<Document>>, RetrievalError>;
}

/// Similarity search over a graph store with embeddings.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// The `k` most similar documents for `query`. An optional
    /// `retrieval_query` template is applied server-side to shape the
    /// returned text.
    async fn query_with_embeddings(
        &self,
        query: &str,
        k: usize,
        retrieval_query: Option<&str>,
    ) -> Result<Vec<Document>, RetrievalError>;
}

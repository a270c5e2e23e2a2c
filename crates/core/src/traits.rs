use crate::{Chunk, GenerationError, RetrievedChunk, RetrievalError};
use async_trait::async_trait;
use std::sync::Arc;

/// A two-message exchange sent to a generation capability.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Blocking text generation. One attempt per call, no retry.
pub trait Generator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

impl<T: Generator + ?Sized> Generator for &T {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        (**self).generate(request)
    }
}

impl<T: Generator + ?Sized> Generator for Box<T> {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        (**self).generate(request)
    }
}

impl<T: Generator + ?Sized> Generator for Arc<T> {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        (**self).generate(request)
    }
}

/// External chunk store with embedding-based retrieval.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ensure_ready(&self, dimensions: usize) -> Result<(), RetrievalError>;

    /// Drops every stored chunk. The next `ensure_ready` starts afresh.
    async fn reset(&self) -> Result<(), RetrievalError>;

    async fn write_documents(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, RetrievalError>;

    /// Most relevant first.
    async fn retrieve(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Box<T> {
    async fn ensure_ready(&self, dimensions: usize) -> Result<(), RetrievalError> {
        (**self).ensure_ready(dimensions).await
    }

    async fn reset(&self) -> Result<(), RetrievalError> {
        (**self).reset().await
    }

    async fn write_documents(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, RetrievalError> {
        (**self).write_documents(chunks, embeddings).await
    }

    async fn retrieve(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        (**self).retrieve(query_vector, top_k).await
    }
}

use crate::chunking::make_chunk_id;
use crate::error::RetrievalError;
use crate::models::{Chunk, RetrievedChunk};
use crate::store::normalize_hits;
use crate::traits::DocumentStore;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

pub const DEFAULT_COLLECTION: &str = "pdf_chunks";

/// Qdrant collection accessed through its REST API.
pub struct QdrantStore {
    endpoint: Url,
    collection: String,
    api_key: Option<String>,
    client: Client,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl QdrantStore {
    pub fn new(endpoint: &str, collection: impl Into<String>) -> Result<Self, RetrievalError> {
        let endpoint = Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(RetrievalError::Request(format!(
                "qdrant endpoint must be http(s): {endpoint}"
            )));
        }

        Ok(Self {
            endpoint,
            collection: collection.into(),
            api_key: None,
            client: Client::new(),
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{suffix}",
            self.endpoint.as_str().trim_end_matches('/'),
            self.collection
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn expect_success(response: Response) -> Result<Value, RetrievalError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::BackendResponse {
                backend: "qdrant".to_string(),
                details: format!("{status}: {body}"),
            });
        }
        Ok(response.json().await?)
    }
}

/// Qdrant point ids must be integers or UUIDs.
fn point_id(doc_id: &str, index: usize, content: &str) -> String {
    let digest = make_chunk_id(doc_id, index, content);
    digest
        .get(..32)
        .and_then(|hex| Uuid::parse_str(hex).ok())
        .unwrap_or_else(Uuid::new_v4)
        .to_string()
}

fn points_body(chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Value {
    let points: Vec<Value> = chunks
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(index, (chunk, vector))| {
            let doc_id = chunk.meta.doc_id.as_deref().unwrap_or_default();
            json!({
                "id": point_id(doc_id, index, &chunk.content),
                "vector": vector,
                "payload": {
                    "content": chunk.content,
                    "doc_id": chunk.meta.doc_id,
                    "title": chunk.meta.title,
                    "page": chunk.meta.page,
                },
            })
        })
        .collect();
    json!({ "points": points })
}

#[async_trait]
impl DocumentStore for QdrantStore {
    async fn ensure_ready(&self, dimensions: usize) -> Result<(), RetrievalError> {
        let response = self.authorize(self.client.get(self.url(""))).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            info!(collection = %self.collection, dimensions, "creating qdrant collection");
            let create = self
                .authorize(self.client.put(self.url("")))
                .json(&json!({ "vectors": { "size": dimensions, "distance": "Cosine" } }))
                .send()
                .await?;
            Self::expect_success(create).await?;
            return Ok(());
        }

        let info = Self::expect_success(response).await?;
        let existing = info
            .pointer("/result/config/params/vectors/size")
            .and_then(Value::as_u64);
        match existing {
            Some(size) if size as usize != dimensions => Err(RetrievalError::Request(format!(
                "collection {} has vector size {size}, expected {dimensions}",
                self.collection
            ))),
            _ => Ok(()),
        }
    }

    async fn reset(&self) -> Result<(), RetrievalError> {
        info!(collection = %self.collection, "dropping qdrant collection");
        let response = self.authorize(self.client.delete(self.url(""))).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn write_documents(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, RetrievalError> {
        if chunks.len() != embeddings.len() {
            return Err(RetrievalError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(0);
        }

        let response = self
            .authorize(self.client.put(self.url("/points?wait=true")))
            .json(&points_body(chunks, embeddings))
            .send()
            .await?;
        Self::expect_success(response).await?;

        debug!(collection = %self.collection, points = chunks.len(), "upserted points");
        Ok(chunks.len())
    }

    async fn retrieve(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let response = self
            .authorize(self.client.post(self.url("/points/search")))
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        let parsed = Self::expect_success(response).await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .ok_or_else(|| RetrievalError::BackendResponse {
                backend: "qdrant".to_string(),
                details: "search response has no result array".to_string(),
            })?;

        Ok(normalize_hits("qdrant", hits))
    }
}

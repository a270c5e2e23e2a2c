use crate::chunking::make_chunk_id;
use crate::error::RetrievalError;
use crate::models::{Chunk, RetrievedChunk};
use crate::store::normalize_hits;
use crate::traits::DocumentStore;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::RwLock;

struct StoredPoint {
    vector: Vec<f32>,
    payload: Value,
}

#[derive(Default)]
struct Collection {
    dimensions: Option<usize>,
    points: BTreeMap<String, StoredPoint>,
}

/// Process-local store ranked by cosine similarity.
#[derive(Default)]
pub struct InMemoryStore {
    collection: RwLock<Collection>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.collection
            .read()
            .map(|collection| collection.points.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("points", &self.len())
            .finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn lock_error(error: impl std::fmt::Display) -> RetrievalError {
    RetrievalError::BackendResponse {
        backend: "memory".to_string(),
        details: error.to_string(),
    }
}

fn check_dimensions(expected: Option<usize>, actual: usize) -> Result<(), RetrievalError> {
    match expected {
        Some(expected) if expected != actual => Err(RetrievalError::Request(format!(
            "vector dimension {actual} does not match store dimension {expected}"
        ))),
        _ => Ok(()),
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn ensure_ready(&self, dimensions: usize) -> Result<(), RetrievalError> {
        let mut collection = self.collection.write().map_err(lock_error)?;
        check_dimensions(collection.dimensions, dimensions)?;
        collection.dimensions = Some(dimensions);
        Ok(())
    }

    async fn reset(&self) -> Result<(), RetrievalError> {
        let mut collection = self.collection.write().map_err(lock_error)?;
        *collection = Collection::default();
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

        let mut collection = self.collection.write().map_err(lock_error)?;
        let mut dimensions = collection.dimensions;
        for vector in embeddings {
            check_dimensions(dimensions, vector.len())?;
            dimensions = Some(vector.len());
        }
        collection.dimensions = dimensions;

        for (index, (chunk, vector)) in chunks.iter().zip(embeddings).enumerate() {
            let doc_id = chunk.meta.doc_id.as_deref().unwrap_or_default();
            let id = make_chunk_id(doc_id, index, &chunk.content);
            collection.points.insert(
                id,
                StoredPoint {
                    vector: vector.clone(),
                    payload: json!({
                        "content": chunk.content,
                        "doc_id": chunk.meta.doc_id,
                        "title": chunk.meta.title,
                        "page": chunk.meta.page,
                    }),
                },
            );
        }
        Ok(chunks.len())
    }

    async fn retrieve(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let collection = self.collection.read().map_err(lock_error)?;
        check_dimensions(collection.dimensions, query_vector.len())?;

        let mut scored: Vec<(f32, &String, &StoredPoint)> = collection
            .points
            .iter()
            .map(|(id, point)| (cosine_similarity(query_vector, &point.vector), id, point))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        let hits: Vec<Value> = scored
            .into_iter()
            .map(|(score, id, point)| {
                json!({
                    "id": id,
                    "score": score,
                    "payload": point.payload,
                })
            })
            .collect();
        Ok(normalize_hits("memory", &hits))
    }
}

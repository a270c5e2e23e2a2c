use crate::embeddings::Embedder;
use crate::error::RetrievalError;
use crate::models::{ChunkMeta, RetrievedChunk};
use crate::traits::DocumentStore;
use serde_json::{Map, Value};
use tracing::{debug, warn};

impl RetrievedChunk {
    /// Normalizes one store hit.
    ///
    /// Accepted shapes:
    /// - `{content, meta: {doc_id, title, page}, score}`
    /// - `{content | text, doc_id, title, page, score}`
    /// - `{id, score, payload: <either of the above>}`
    pub fn from_value(value: &Value) -> Result<Self, RetrievalError> {
        let hit = value
            .as_object()
            .ok_or_else(|| RetrievalError::Payload(format!("hit is not an object: {value}")))?;

        let body = match hit.get("payload") {
            Some(Value::Object(payload)) => payload,
            _ => hit,
        };

        let content = ["content", "text"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .ok_or_else(|| {
                let id = hit.get("id").map(text_or_number).unwrap_or_default();
                RetrievalError::Payload(format!("hit {id:?} has no content"))
            })?;

        let meta = match body.get("meta") {
            Some(Value::Object(meta)) => meta_from(meta),
            _ => meta_from(body),
        };

        let score = hit
            .get("score")
            .or_else(|| body.get("score"))
            .and_then(Value::as_f64);

        Ok(Self {
            content: content.to_string(),
            meta,
            score,
        })
    }
}

fn meta_from(fields: &Map<String, Value>) -> ChunkMeta {
    ChunkMeta {
        doc_id: fields.get("doc_id").and_then(non_null).map(text_or_number),
        title: fields.get("title").and_then(non_null).map(text_or_number),
        page: fields.get("page").and_then(page_number),
    }
}

fn non_null(value: &Value) -> Option<&Value> {
    (!value.is_null()).then_some(value)
}

fn text_or_number(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn page_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|page| u32::try_from(page).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Converts raw hits, dropping the ones that cannot be read.
pub fn normalize_hits(backend: &str, hits: &[Value]) -> Vec<RetrievedChunk> {
    hits.iter()
        .filter_map(|hit| match RetrievedChunk::from_value(hit) {
            Ok(chunk) => Some(chunk),
            Err(error) => {
                warn!(backend, %error, "dropping unreadable hit");
                None
            }
        })
        .collect()
}

/// Embeds a question and asks the store for the nearest chunks.
pub struct Retriever<S, E> {
    store: S,
    embedder: E,
}

impl<S, E> Retriever<S, E>
where
    S: DocumentStore + Send + Sync,
    E: Embedder + Send + Sync,
{
    pub fn new(store: S, embedder: E) -> Self {
        Self { store, embedder }
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        if top_k == 0 {
            return Err(RetrievalError::Request("top_k must be at least 1".to_string()));
        }

        let vector = self.embedder.embed(query);
        let mut chunks = self.store.retrieve(&vector, top_k).await?;
        chunks.truncate(top_k);
        debug!(top_k, returned = chunks.len(), "retrieved chunks");
        Ok(chunks)
    }
}

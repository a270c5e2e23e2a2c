use crate::embeddings::Embedder;
use crate::error::RetrievalError;
use crate::models::Chunk;
use crate::traits::DocumentStore;
use serde::Serialize;
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info};

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub indexed: usize,
    pub error: Option<String>,
}

impl IndexSummary {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            indexed: 0,
            error: Some(error.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.indexed > 0
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexSummary {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub details: BTreeMap<String, IndexSummary>,
    pub error: Option<String>,
}

/// Loads one payload file, embeds its chunks and writes them to `store`.
///
/// Never fails: problems are reported in the summary.
pub async fn index_payload<S, E>(path: &Path, store: &S, embedder: &E) -> IndexSummary
where
    S: DocumentStore + ?Sized,
    E: Embedder + ?Sized,
{
    info!(path = %path.display(), "indexing payload");

    let chunks = match read_payload(path).await {
        Ok(chunks) => chunks,
        Err(message) => {
            error!(path = %path.display(), %message, "unusable payload");
            return IndexSummary::failed(message);
        }
    };

    match write_chunks(&chunks, store, embedder).await {
        Ok(indexed) => {
            info!(path = %path.display(), indexed, "payload indexed");
            IndexSummary {
                indexed,
                error: None,
            }
        }
        Err(failure) => {
            error!(path = %path.display(), error = %failure, "failed to index payload");
            IndexSummary::failed(failure.to_string())
        }
    }
}

async fn read_payload(path: &Path) -> Result<Vec<Chunk>, String> {
    if !path.exists() {
        return Err(format!("payload not found: {}", path.display()));
    }

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|error| format!("cannot read {}: {error}", path.display()))?;
    let value: Value = serde_json::from_str(&raw).map_err(|error| error.to_string())?;
    if !value.is_array() {
        return Err(format!(
            "unexpected payload structure in {}: expected a list of chunks",
            path.display()
        ));
    }
    serde_json::from_value(value).map_err(|error| error.to_string())
}

async fn write_chunks<S, E>(chunks: &[Chunk], store: &S, embedder: &E) -> Result<usize, RetrievalError>
where
    S: DocumentStore + ?Sized,
    E: Embedder + ?Sized,
{
    let embeddings: Vec<Vec<f32>> = chunks.iter().map(|chunk| embedder.embed(&chunk.content)).collect();
    store.ensure_ready(embedder.dimensions()).await?;
    store.write_documents(chunks, &embeddings).await
}

/// Drops everything in `store` and prepares it for `embedder`'s vectors.
pub async fn recreate_index<S, E>(store: &S, embedder: &E) -> Result<(), RetrievalError>
where
    S: DocumentStore + ?Sized,
    E: Embedder + ?Sized,
{
    info!(dimensions = embedder.dimensions(), "recreating index");
    store.reset().await?;
    store.ensure_ready(embedder.dimensions()).await
}

/// Indexes every `*.json` file in `folder`, in name order. A file that
/// indexes nothing counts as failed; the loop always continues.
pub async fn reindex_folder<S, E>(folder: &Path, store: &S, embedder: &E) -> ReindexSummary
where
    S: DocumentStore + ?Sized,
    E: Embedder + ?Sized,
{
    info!(folder = %folder.display(), "reindexing payload folder");
    if !folder.is_dir() {
        let message = format!("folder not found: {}", folder.display());
        error!(%message, "reindex aborted");
        return ReindexSummary {
            error: Some(message),
            ..ReindexSummary::default()
        };
    }

    let mut files = match payload_files(folder).await {
        Ok(files) => files,
        Err(failure) => {
            return ReindexSummary {
                error: Some(failure.to_string()),
                ..ReindexSummary::default()
            }
        }
    };
    files.sort();

    let mut summary = ReindexSummary {
        total_files: files.len(),
        ..ReindexSummary::default()
    };
    for (position, name) in files.into_iter().enumerate() {
        info!(file = %name, position = position + 1, total = summary.total_files, "indexing");
        let result = index_payload(&folder.join(&name), store, embedder).await;
        if result.succeeded() {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }
        summary.details.insert(name, result);
    }

    info!(
        total = summary.total_files,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "reindex finished"
    );
    summary
}

async fn payload_files(folder: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(folder).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.to_lowercase().ends_with(".json") && entry.file_type().await?.is_file() {
            names.push(name);
        }
    }
    Ok(names)
}

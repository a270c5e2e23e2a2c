use crate::answer::GroundedAnswerer;
use crate::embeddings::Embedder;
use crate::error::RetrievalError;
use crate::models::AnswerResult;
use crate::store::Retriever;
use crate::traits::{DocumentStore, Generator};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_TOP_K: usize = 5;

/// Question in, grounded answer out.
pub struct QueryPipeline<S, E, G> {
    retriever: Retriever<S, E>,
    answerer: Arc<GroundedAnswerer<G>>,
}

impl<S, E, G> QueryPipeline<S, E, G>
where
    S: DocumentStore,
    E: Embedder + Send + Sync,
    G: Generator + Send + Sync + 'static,
{
    pub fn new(retriever: Retriever<S, E>, answerer: GroundedAnswerer<G>) -> Self {
        Self {
            retriever,
            answerer: Arc::new(answerer),
        }
    }

    /// Retrieval errors propagate. Generation problems never do; they
    /// come back as a fallback answer.
    pub async fn ask(
        &self,
        query: &str,
        top_k: usize,
        model: Option<&str>,
    ) -> Result<AnswerResult, RetrievalError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::Request("query is empty".to_string()));
        }

        let chunks = self.retriever.retrieve(query, top_k).await?;
        info!(top_k, retrieved = chunks.len(), "answering question");

        // the generator performs blocking HTTP
        let answerer = Arc::clone(&self.answerer);
        let question = query.to_string();
        let model = model.map(str::to_string);
        tokio::task::spawn_blocking(move || answerer.answer(&question, &chunks, model.as_deref()))
            .await
            .map_err(|error| RetrievalError::Request(format!("answer task aborted: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::tests::RecordingGenerator;
    use crate::answer::{GenerationBackend, FALLBACK_MODEL};
    use crate::config::{BudgetConfig, GenerationConfig};
    use crate::embeddings::HashingEmbedder;
    use crate::models::{Chunk, ChunkMeta};
    use crate::stores::InMemoryStore;

    async fn seeded_store(embedder: &HashingEmbedder) -> Result<InMemoryStore, RetrievalError> {
        let store = InMemoryStore::new();
        let chunks = vec![
            Chunk {
                content: "The relief valve opens at 210 bar.".to_string(),
                meta: ChunkMeta {
                    doc_id: Some("d1".to_string()),
                    title: Some("Valve manual".to_string()),
                    page: Some(3),
                },
            },
            Chunk {
                content: "Staff parking is behind building C.".to_string(),
                meta: ChunkMeta {
                    doc_id: Some("d2".to_string()),
                    title: Some("Site guide".to_string()),
                    page: Some(1),
                },
            },
        ];
        let vectors: Vec<_> = chunks.iter().map(|chunk| embedder.embed(&chunk.content)).collect();
        store.ensure_ready(embedder.dimensions()).await?;
        store.write_documents(&chunks, &vectors).await?;
        Ok(store)
    }

    fn pipeline<G: Generator + Send + Sync + 'static>(
        store: InMemoryStore,
        backend: GenerationBackend<G>,
    ) -> QueryPipeline<InMemoryStore, HashingEmbedder, G> {
        QueryPipeline::new(
            Retriever::new(store, HashingEmbedder::default()),
            GroundedAnswerer::new(BudgetConfig::default(), GenerationConfig::default(), backend),
        )
    }

    #[tokio::test]
    async fn answers_from_retrieved_excerpts() -> Result<(), RetrievalError> {
        let store = seeded_store(&HashingEmbedder::default()).await?;
        let generator = Arc::new(RecordingGenerator::answering("210 bar.\nSOURCES: Valve manual"));
        let pipeline = pipeline(store, GenerationBackend::Ready(Arc::clone(&generator)));

        let result = pipeline.ask("At what pressure does the relief valve open?", 1, None).await?;

        assert_eq!(result.answer, "210 bar.\nSOURCES: Valve manual");
        assert_eq!(result.sources, vec!["Valve manual"]);
        let Some(request) = generator.last_request() else {
            panic!("generator was not called");
        };
        assert!(request.user.contains("title=Valve manual, doc_id=d1, page=3"));
        Ok(())
    }

    #[tokio::test]
    async fn unconfigured_generation_still_answers() -> Result<(), RetrievalError> {
        let store = seeded_store(&HashingEmbedder::default()).await?;
        let pipeline = pipeline::<RecordingGenerator>(store, GenerationBackend::Unconfigured);

        let result = pipeline.ask("relief valve pressure", 2, Some("gpt-4o")).await?;

        assert_eq!(result.model, FALLBACK_MODEL);
        assert_eq!(result.sources.len(), 2);
        assert!(result.answer.contains("210 bar"));
        Ok(())
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let pipeline = pipeline::<RecordingGenerator>(InMemoryStore::new(), GenerationBackend::Unconfigured);
        assert!(matches!(
            pipeline.ask("   ", DEFAULT_TOP_K, None).await,
            Err(RetrievalError::Request(_))
        ));
    }
}

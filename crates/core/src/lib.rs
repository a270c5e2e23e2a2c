pub mod answer;
pub mod budget;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod indexer;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod orchestrator;
pub mod pdf;
pub mod scan;
pub mod store;
pub mod stores;
pub mod traits;

pub use answer::{GenerationBackend, GroundedAnswerer, GroundedPrompt, FALLBACK_MODEL, REFUSAL};
pub use budget::{ContextBudgeter, TRUNCATION_MARKER};
pub use chunking::{build_chunks, make_chunk_id, split_text, Chunker};
pub use config::{
    BudgetConfig, BudgetLimits, ChunkingConfig, ExtractionConfig, GenerationConfig, PipelineConfig,
    ScanConfig,
};
pub use embeddings::{Embedder, HashingEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{GenerationError, IngestError, RetrievalError};
pub use extractor::PageExtractor;
pub use generation::OpenAiGenerator;
pub use indexer::{index_payload, recreate_index, reindex_folder, IndexSummary, ReindexSummary};
pub use ingest::{
    discover_pdf_files, register_pdf, write_payload, IngestedDocument, IngestionReport, Ingestor,
    SkippedPdf,
};
pub use models::{
    AnswerResult, Chunk, ChunkMeta, DocumentRecord, DocumentStatus, ExtractedDocument, Outcome,
    Page, PageText, RetrievedChunk, SkippedPage, TextSource,
};
pub use ocr::{HttpOcr, NoOcr, OcrEndpointConfig, OcrEngine, TesseractOcr};
pub use orchestrator::{QueryPipeline, DEFAULT_TOP_K};
pub use pdf::{LopdfPages, PdfPages};
pub use scan::{ScanHeuristic, ScanReport};
pub use store::{normalize_hits, Retriever};
pub use stores::{InMemoryStore, QdrantStore, DEFAULT_COLLECTION};
pub use traits::{DocumentStore, GenerationRequest, Generator};

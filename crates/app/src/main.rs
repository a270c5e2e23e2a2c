use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pdf_answer_core::{
    index_payload, recreate_index, register_pdf, reindex_folder, DocumentStatus, DocumentStore,
    GenerationBackend, GroundedAnswerer, HashingEmbedder, HttpOcr, InMemoryStore, IngestedDocument,
    Ingestor, NoOcr, OcrEndpointConfig, OcrEngine, OpenAiGenerator, PipelineConfig, QdrantStore,
    QueryPipeline, Retriever, ScanHeuristic, TesseractOcr, DEFAULT_COLLECTION,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_TOP_K,
};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-answer", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON file with pipeline settings; flags override it.
    #[arg(long, global = true, env = "PDF_ANSWER_CONFIG")]
    config: Option<PathBuf>,

    /// Where chunks are indexed and retrieved from.
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Memory, env = "PDF_ANSWER_STORE")]
    store: StoreKind,

    /// Qdrant base URL
    #[arg(long, global = true, default_value = "http://localhost:6333", env = "QDRANT_URL")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, global = true, default_value = DEFAULT_COLLECTION, env = "QDRANT_COLLECTION")]
    qdrant_collection: String,

    #[arg(long, global = true, env = "QDRANT_API_KEY", hide_env_values = true)]
    qdrant_api_key: Option<String>,

    /// Embedding width used for indexing and querying.
    #[arg(long, global = true, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreKind {
    /// Process-local; pair with --payload-dir.
    Memory,
    Qdrant,
}

#[derive(Clone, Copy, ValueEnum)]
enum OcrKind {
    Tesseract,
    Http,
    None,
}

#[derive(Args)]
struct OcrArgs {
    /// OCR engine for pages without enough selectable text.
    #[arg(long, value_enum, default_value_t = OcrKind::Tesseract, env = "PDF_ANSWER_OCR")]
    ocr: OcrKind,

    #[arg(long, default_value = "tesseract", env = "TESSERACT_BIN")]
    tesseract_bin: String,

    /// Tesseract language, e.g. `eng`.
    #[arg(long, env = "TESSERACT_LANG")]
    ocr_lang: Option<String>,

    #[arg(long, env = "LLM_OCR_ENDPOINT")]
    ocr_endpoint: Option<String>,

    #[arg(long, env = "LLM_OCR_API_KEY", hide_env_values = true)]
    ocr_api_key: Option<String>,

    #[arg(long, env = "PDFTOPPM_BIN")]
    pdftoppm_bin: Option<String>,

    /// Minimum trimmed characters before a page is sent to OCR.
    #[arg(long)]
    min_text_chars: Option<usize>,

    #[arg(long)]
    render_scale: Option<f32>,
}

#[derive(Args)]
struct GenerationArgs {
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL")]
    openai_base_url: Option<String>,

    /// Model used when --model is not given.
    #[arg(long, env = "OPENAI_MODEL")]
    default_model: Option<String>,

    #[arg(long)]
    max_context_tokens: Option<usize>,

    #[arg(long)]
    max_chunks: Option<usize>,

    #[arg(long)]
    max_chars_per_chunk: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and write JSON payloads for one PDF or a folder.
    Ingest {
        #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
        file: Option<PathBuf>,
        /// Title for --file; defaults to the file stem.
        #[arg(long, requires = "file")]
        title: Option<String>,
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Payload output directory.
        #[arg(long)]
        out: PathBuf,
        /// Index each payload right after writing it.
        #[arg(long, default_value_t = false)]
        index: bool,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        overlap: Option<usize>,
        #[command(flatten)]
        ocr: OcrArgs,
    },
    /// Report whether a PDF looks scanned.
    Scan {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        min_text_chars: Option<usize>,
        #[arg(long)]
        scanned_ratio: Option<f64>,
    },
    /// Index payload files into the selected store.
    Index {
        #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
        payload: Option<PathBuf>,
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Drop the collection and start from an empty one.
        #[arg(long, default_value_t = false)]
        recreate: bool,
    },
    /// Answer a question from indexed chunks.
    Ask {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Overrides the model for this question.
        #[arg(long)]
        model: Option<String>,
        /// Payloads loaded into the store before answering.
        #[arg(long)]
        payload_dir: Option<PathBuf>,
        #[command(flatten)]
        generation: GenerationArgs,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-answer boot"
    );

    let mut config = load_config(cli.config.as_deref())?;
    let embedder = HashingEmbedder::new(cli.embedding_dimensions);
    // reqwest blocking clients must not be created or dropped inside the runtime
    let runtime = Runtime::new().context("failed to start async runtime")?;

    match &cli.command {
        Command::Ingest {
            file,
            title,
            folder,
            out,
            index,
            chunk_size,
            overlap,
            ocr,
        } => {
            if let Some(chunk_size) = chunk_size {
                config.chunking.chunk_size = *chunk_size;
            }
            if let Some(overlap) = overlap {
                config.chunking.overlap = *overlap;
            }
            apply_ocr_overrides(&mut config, ocr);

            let store = if *index {
                Some(persistent_store(&cli, "ingest --index")?)
            } else {
                None
            };

            let mut ingestor = Ingestor::new(&config, build_ocr(ocr)?)?;
            if let Some(binary) = &ocr.pdftoppm_bin {
                ingestor = ingestor.with_renderer(binary.clone());
            }

            let mut documents = Vec::new();
            if let Some(file) = file {
                let mut record = register_pdf(file, title.as_deref())?;
                match ingestor.ingest_to_payload(&mut record, out) {
                    Ok(document) => documents.push(document),
                    Err(error) => {
                        println!("{}", serde_json::to_string_pretty(&record)?);
                        return Err(error).context(format!("failed to ingest {}", file.display()));
                    }
                }
            } else if let Some(folder) = folder {
                let report = ingestor.ingest_folder(folder, out)?;
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
                if report.documents.is_empty() {
                    println!("0 documents ingested (all files were skipped)");
                }
                documents = report.documents;
            }

            if let Some(store) = &store {
                for document in &mut documents {
                    index_ingested(&runtime, document, store.as_ref(), &embedder);
                }
            }

            for document in &documents {
                print_ingested(document);
            }
            println!(
                "{} documents ingested at {}",
                documents.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Scan {
            file,
            min_text_chars,
            scanned_ratio,
        } => {
            if let Some(min_text_chars) = min_text_chars {
                config.scan.min_text_chars = *min_text_chars;
            }
            if let Some(scanned_ratio) = scanned_ratio {
                config.scan.scanned_ratio = *scanned_ratio;
            }

            let report = ScanHeuristic::new(config.scan).report_path(file)?;
            println!(
                "pages={} ocr_needed={} ratio={:.2} scanned={}",
                report.total_pages, report.ocr_needed_pages, report.ratio, report.scanned
            );
        }
        Command::Index {
            payload,
            folder,
            recreate,
        } => {
            let store = persistent_store(&cli, "index")?;
            if *recreate {
                runtime
                    .block_on(recreate_index(store.as_ref(), &embedder))
                    .context("failed to recreate the index")?;
            }
            if let Some(payload) = payload {
                let summary = runtime.block_on(index_payload(payload, store.as_ref(), &embedder));
                println!("{}", serde_json::to_string_pretty(&summary)?);
                if let Some(error) = summary.error {
                    bail!("indexing {} failed: {error}", payload.display());
                }
            } else if let Some(folder) = folder {
                let summary = runtime.block_on(reindex_folder(folder, store.as_ref(), &embedder));
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }
        Command::Ask {
            query,
            top_k,
            model,
            payload_dir,
            generation,
        } => {
            apply_generation_overrides(&mut config, generation);

            let store = open_store(&cli)?;
            if let Some(payload_dir) = payload_dir {
                let summary = runtime.block_on(reindex_folder(payload_dir, store.as_ref(), &embedder));
                if let Some(error) = &summary.error {
                    bail!("cannot load payloads: {error}");
                }
                info!(files = summary.total_files, loaded = summary.succeeded, "payloads loaded");
            }

            let backend = GenerationBackend::from_result(OpenAiGenerator::from_config(&config.generation));
            let answerer = GroundedAnswerer::new(config.budget, config.generation.clone(), backend);
            if !answerer.is_configured() {
                warn!("generation is not available; answers will be raw excerpts");
            }

            let pipeline = QueryPipeline::new(Retriever::new(store, embedder), answerer);
            let result = runtime.block_on(pipeline.ask(query, *top_k, model.as_deref()))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

fn apply_ocr_overrides(config: &mut PipelineConfig, args: &OcrArgs) {
    if let Some(min_text_chars) = args.min_text_chars {
        config.extraction.min_text_chars = min_text_chars;
        config.scan.min_text_chars = min_text_chars;
    }
    if let Some(render_scale) = args.render_scale {
        config.extraction.render_scale = render_scale;
    }
}

fn apply_generation_overrides(config: &mut PipelineConfig, args: &GenerationArgs) {
    if args.openai_api_key.is_some() {
        config.generation.api_key = args.openai_api_key.clone();
    }
    if let Some(base_url) = &args.openai_base_url {
        config.generation.base_url = base_url.clone();
    }
    if let Some(model) = &args.default_model {
        config.generation.model = model.clone();
    }
    if let Some(tokens) = args.max_context_tokens {
        config.budget.max_context_tokens = tokens;
    }
    if let Some(max_chunks) = args.max_chunks {
        config.budget.max_chunks = max_chunks;
    }
    if let Some(max_chars) = args.max_chars_per_chunk {
        config.budget.max_chars_per_chunk = max_chars;
    }
}

fn build_ocr(args: &OcrArgs) -> anyhow::Result<Box<dyn OcrEngine>> {
    Ok(match args.ocr {
        OcrKind::Tesseract => Box::new(TesseractOcr {
            binary: args.tesseract_bin.clone(),
            language: args.ocr_lang.clone(),
        }),
        OcrKind::Http => {
            let Some(endpoint) = args.ocr_endpoint.clone() else {
                bail!("--ocr http needs --ocr-endpoint or LLM_OCR_ENDPOINT");
            };
            Box::new(HttpOcr::new(OcrEndpointConfig {
                endpoint,
                api_key: args.ocr_api_key.clone(),
            }))
        }
        OcrKind::None => Box::new(NoOcr),
    })
}

fn open_store(cli: &Cli) -> anyhow::Result<Box<dyn DocumentStore>> {
    Ok(match cli.store {
        StoreKind::Memory => Box::new(InMemoryStore::new()),
        StoreKind::Qdrant => Box::new(
            QdrantStore::new(&cli.qdrant_url, cli.qdrant_collection.clone())?
                .with_api_key(cli.qdrant_api_key.clone()),
        ),
    })
}

/// Indexing into the memory store would be lost when the process exits.
fn persistent_store(cli: &Cli, action: &str) -> anyhow::Result<Box<dyn DocumentStore>> {
    if matches!(cli.store, StoreKind::Memory) {
        bail!(
            "`{action}` needs a persistent store; pass --store qdrant \
             (ask loads payloads itself with --payload-dir)"
        );
    }
    open_store(cli)
}

fn index_ingested(
    runtime: &Runtime,
    document: &mut IngestedDocument,
    store: &dyn DocumentStore,
    embedder: &HashingEmbedder,
) {
    let Some(payload) = document.payload.clone() else {
        return;
    };

    let summary = runtime.block_on(index_payload(&payload, store, embedder));
    if let Some(error) = &summary.error {
        warn!(doc_id = %document.record.id, %error, "indexing failed; record stays processing");
    } else if summary.succeeded() {
        document.record.status = DocumentStatus::Indexed;
    } else {
        warn!(doc_id = %document.record.id, "payload was empty; nothing indexed");
    }
}

fn print_ingested(document: &IngestedDocument) {
    let record = &document.record;
    println!(
        "{} title={:?} status={:?} pages={} ocr_pages={} skipped_pages={} scanned={} chunks={}",
        record.id,
        record.title,
        record.status,
        document.page_count,
        document.ocr_pages,
        document.skipped_pages,
        document.scan.scanned,
        document.chunks.len()
    );
    if let Some(payload) = &document.payload {
        println!("  payload={}", payload.display());
    }
}

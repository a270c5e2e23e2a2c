use crate::chunking::{build_chunks, Chunker};
use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::extractor::PageExtractor;
use crate::models::{Chunk, DocumentRecord, DocumentStatus};
use crate::ocr::OcrEngine;
use crate::pdf::{LopdfPages, PdfPages};
use crate::scan::{ScanHeuristic, ScanReport};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const DOC_ID_HEX_LEN: usize = 16;

/// Result of one successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub record: DocumentRecord,
    pub chunks: Vec<Chunk>,
    pub scan: ScanReport,
    pub page_count: usize,
    pub ocr_pages: usize,
    pub skipped_pages: usize,
    /// Set once the chunks have been written to disk.
    pub payload: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub documents: Vec<IngestedDocument>,
    pub skipped_files: Vec<SkippedPdf>,
}

impl IngestionReport {
    pub fn chunk_count(&self) -> usize {
        self.documents.iter().map(|document| document.chunks.len()).sum()
    }
}

/// Extraction, scan classification and chunking for whole documents.
pub struct Ingestor<O> {
    extractor: PageExtractor<O>,
    scan: ScanHeuristic,
    chunker: Chunker,
    renderer: Option<String>,
}

impl<O: OcrEngine> Ingestor<O> {
    /// Rejects invalid chunking parameters before any document is touched.
    pub fn new(config: &PipelineConfig, ocr: O) -> Result<Self, IngestError> {
        Ok(Self {
            extractor: PageExtractor::new(config.extraction, ocr),
            scan: ScanHeuristic::new(config.scan),
            chunker: Chunker::new(config.chunking)?,
            renderer: None,
        })
    }

    /// Overrides the `pdftoppm` binary used to rasterize pages for OCR.
    pub fn with_renderer(mut self, binary: impl Into<String>) -> Self {
        self.renderer = Some(binary.into());
        self
    }

    /// Opens `record.file_path` and ingests it. The record ends in
    /// `Processing` on success or `Failed` with the reason in `notes`.
    pub fn ingest_document(&self, record: &mut DocumentRecord) -> Result<IngestedDocument, IngestError> {
        record.status = DocumentStatus::Processing;

        let pages = match LopdfPages::open(&record.file_path) {
            Ok(pages) => match &self.renderer {
                Some(binary) => pages.with_renderer(binary.clone()),
                None => pages,
            },
            Err(error) => {
                warn!(doc_id = %record.id, path = %record.file_path.display(), %error, "ingestion failed");
                record.mark_failed(&error.to_string());
                return Err(error);
            }
        };

        Ok(self.ingest_pages(record, &pages))
    }

    pub fn ingest_pages(&self, record: &mut DocumentRecord, pdf: &dyn PdfPages) -> IngestedDocument {
        record.status = DocumentStatus::Processing;

        let scan = self.scan.report(pdf);
        let extracted = self.extractor.extract(pdf);
        let text = extracted.full_text();
        if text.is_empty() {
            warn!(doc_id = %record.id, "no text extracted; payload will be empty");
        }

        let contents = self.chunker.split(&text);
        let chunks = build_chunks(&record.id, &record.title, Some(extracted.page_count), contents);
        record.text_extracted = true;

        info!(
            doc_id = %record.id,
            title = %record.title,
            pages = extracted.page_count,
            scanned = scan.scanned,
            chars = text.chars().count(),
            chunks = chunks.len(),
            "document ingested"
        );

        IngestedDocument {
            record: record.clone(),
            chunks,
            scan,
            page_count: extracted.page_count,
            ocr_pages: extracted.ocr_pages(),
            skipped_pages: extracted.skipped.len(),
            payload: None,
        }
    }

    /// Ingests and writes `<out_dir>/<doc_id>.json`. A write failure also
    /// marks the record failed.
    pub fn ingest_to_payload(
        &self,
        record: &mut DocumentRecord,
        out_dir: &Path,
    ) -> Result<IngestedDocument, IngestError> {
        let mut document = self.ingest_document(record)?;
        match write_payload(out_dir, &record.id, &document.chunks) {
            Ok(path) => {
                document.payload = Some(path);
                Ok(document)
            }
            Err(error) => {
                record.mark_failed(&error.to_string());
                Err(error)
            }
        }
    }

    /// Ingests every PDF under `folder`. One bad file never aborts the run.
    pub fn ingest_folder(&self, folder: &Path, out_dir: &Path) -> Result<IngestionReport, IngestError> {
        let files = discover_pdf_files(folder);
        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        let mut report = IngestionReport::default();
        for path in files {
            let outcome = register_pdf(&path, None)
                .and_then(|mut record| self.ingest_to_payload(&mut record, out_dir));

            match outcome {
                Ok(document) => report.documents.push(document),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping pdf");
                    report.skipped_files.push(SkippedPdf {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        info!(
            ingested = report.documents.len(),
            skipped = report.skipped_files.len(),
            chunks = report.chunk_count(),
            "folder ingestion finished"
        );
        Ok(report)
    }
}

/// Creates an `Uploaded` record for a PDF on disk. The id is derived from
/// the file contents; the title defaults to the file stem.
pub fn register_pdf(path: &Path, title: Option<&str>) -> Result<DocumentRecord, IngestError> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    let digest = digest_file(path)?;
    let id = digest[..DOC_ID_HEX_LEN].to_string();
    let title = title
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(stem);

    Ok(DocumentRecord::uploaded(id, title, path.to_path_buf()))
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Writes the chunks as a pretty JSON array and returns the file path.
pub fn write_payload(out_dir: &Path, doc_id: &str, chunks: &[Chunk]) -> Result<PathBuf, IngestError> {
    if doc_id.is_empty() || doc_id.contains(['/', '\\']) || doc_id.starts_with('.') {
        return Err(IngestError::InvalidArgument(format!(
            "document id {doc_id:?} cannot name a payload file"
        )));
    }

    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("{doc_id}.json"));
    fs::write(&path, serde_json::to_string_pretty(chunks)?)?;
    info!(path = %path.display(), chunks = chunks.len(), "wrote payload");
    Ok(path)
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort_unstable();
    files
}

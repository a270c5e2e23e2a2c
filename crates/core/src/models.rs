use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::PathBuf;

/// Result of a step that degrades instead of failing.
///
/// `Fallback` carries the value that was used in place of the primary one
/// together with the reason the primary path was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Primary(T),
    Fallback { value: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn value(&self) -> &T {
        match self {
            Outcome::Primary(value) | Outcome::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Outcome::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Outcome::Primary(_) => None,
            Outcome::Fallback { reason, .. } => Some(reason),
        }
    }
}

/// Selectable text of a single page, before any OCR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub text: String,
}

impl Page {
    pub fn trimmed_len(&self) -> usize {
        self.text.trim().chars().count()
    }

    pub fn needs_ocr(&self, min_text_chars: usize) -> bool {
        self.trimmed_len() < min_text_chars
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    Selectable,
    Ocr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub index: usize,
    pub source: TextSource,
    pub text: Outcome<String>,
}

impl PageText {
    /// Selectable text kept because OCR was skipped or gave nothing usable.
    pub fn fallback(page: Page, reason: impl Into<String>) -> Self {
        Self {
            index: page.index,
            source: TextSource::Selectable,
            text: Outcome::Fallback {
                value: page.text,
                reason: reason.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPage {
    pub index: usize,
    pub reason: String,
}

/// Text of a whole document after the OCR fallback ran on every page.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub page_count: usize,
    pub pages: Vec<PageText>,
    pub skipped: Vec<SkippedPage>,
}

impl ExtractedDocument {
    /// Non-empty page texts joined by a blank line, trimmed.
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.text.value().as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
            .trim()
            .to_string()
    }

    pub fn ocr_pages(&self) -> usize {
        self.pages
            .iter()
            .filter(|page| page.source == TextSource::Ocr)
            .count()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMeta {
    pub doc_id: Option<String>,
    pub title: Option<String>,
    pub page: Option<u32>,
}

impl ChunkMeta {
    /// Title, else document id, else `"unknown"`.
    pub fn source_label(&self) -> String {
        self.title
            .as_deref()
            .filter(|title| !title.is_empty())
            .or_else(|| self.doc_id.as_deref().filter(|id| !id.is_empty()))
            .unwrap_or("unknown")
            .to_string()
    }

    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(title) = &self.title {
            parts.push(format!("title={title}"));
        }
        if let Some(doc_id) = &self.doc_id {
            parts.push(format!("doc_id={doc_id}"));
        }
        if let Some(page) = self.page {
            parts.push(format!("page={page}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// One entry of the ingestion payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub meta: ChunkMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub content: String,
    pub meta: ChunkMeta,
    pub score: Option<f64>,
}

impl RetrievedChunk {
    pub fn new(content: impl Into<String>, meta: ChunkMeta) -> Self {
        Self {
            content: content.into(),
            meta,
            score: None,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<String>,
    pub model: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Indexed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub status: DocumentStatus,
    pub file_path: PathBuf,
    pub uploaded_at: DateTime<Utc>,
    pub text_extracted: bool,
    pub notes: String,
}

impl DocumentRecord {
    pub fn uploaded(id: impl Into<String>, title: impl Into<String>, file_path: PathBuf) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: DocumentStatus::Uploaded,
            file_path,
            uploaded_at: Utc::now(),
            text_extracted: false,
            notes: String::new(),
        }
    }

    pub fn mark_failed(&mut self, reason: &str) {
        self.status = DocumentStatus::Failed;
        if !self.notes.is_empty() {
            self.notes.push_str("\n\n");
        }
        self.notes.push_str("Ingestion error:\n");
        self.notes.push_str(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_needs_ocr_counts_trimmed_characters() {
        let page = Page {
            index: 0,
            text: format!("   {}   ", "é".repeat(49)),
        };
        assert_eq!(page.trimmed_len(), 49);
        assert!(page.needs_ocr(50));
        assert!(!page.needs_ocr(49));
    }

    #[test]
    fn full_text_skips_empty_pages_and_trims() {
        let document = ExtractedDocument {
            page_count: 3,
            pages: vec![
                PageText {
                    index: 0,
                    source: TextSource::Selectable,
                    text: Outcome::Primary("first".to_string()),
                },
                PageText {
                    index: 1,
                    source: TextSource::Selectable,
                    text: Outcome::Fallback {
                        value: String::new(),
                        reason: "ocr produced no text".to_string(),
                    },
                },
                PageText {
                    index: 2,
                    source: TextSource::Ocr,
                    text: Outcome::Primary("third".to_string()),
                },
            ],
            skipped: Vec::new(),
        };

        assert_eq!(document.full_text(), "first\n\nthird");
        assert_eq!(document.ocr_pages(), 1);
    }

    #[test]
    fn source_label_prefers_title_then_id() {
        let titled = ChunkMeta {
            doc_id: Some("42".to_string()),
            title: Some("Revenue Rules".to_string()),
            page: None,
        };
        let untitled = ChunkMeta {
            doc_id: Some("42".to_string()),
            ..ChunkMeta::default()
        };
        assert_eq!(titled.source_label(), "Revenue Rules");
        assert_eq!(untitled.source_label(), "42");
        assert_eq!(ChunkMeta::default().source_label(), "unknown");
    }

    #[test]
    fn meta_summary_lists_present_fields_only() {
        let meta = ChunkMeta {
            doc_id: Some("17".to_string()),
            title: None,
            page: Some(3),
        };
        assert_eq!(meta.summary().as_deref(), Some("doc_id=17, page=3"));
        assert_eq!(ChunkMeta::default().summary(), None);
    }

    #[test]
    fn answer_result_omits_absent_error() -> Result<(), serde_json::Error> {
        let result = AnswerResult {
            answer: "a".to_string(),
            sources: vec!["unknown".to_string()],
            model: "fallback".to_string(),
            error: None,
        };
        let encoded = serde_json::to_value(&result)?;
        assert!(encoded.get("error").is_none());
        Ok(())
    }

    #[test]
    fn failed_record_accumulates_notes() {
        let mut record = DocumentRecord::uploaded("1", "t", PathBuf::from("/tmp/t.pdf"));
        record.mark_failed("first");
        record.mark_failed("second");
        assert_eq!(record.status, DocumentStatus::Failed);
        assert!(record.notes.starts_with("Ingestion error:\nfirst"));
        assert!(record.notes.ends_with("Ingestion error:\nsecond"));
    }
}

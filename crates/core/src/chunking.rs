use crate::config::ChunkingConfig;
use crate::error::IngestError;
use crate::models::{Chunk, ChunkMeta};
use sha2::{Digest, Sha256};
use tracing::info;

/// A period this early in the window would leave a degenerate chunk.
const MIN_SENTENCE_CUT_FRACTION: f64 = 0.3;

/// Word-window splitter that prefers to end chunks on a sentence boundary.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        validate(config.chunk_size, config.overlap)?;
        Ok(Self { config })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        split_words(text, self.config.chunk_size, self.config.overlap)
    }
}

/// Split `text` into chunks of at most `chunk_size` words, consecutive
/// chunks sharing up to `overlap` words.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, IngestError> {
    validate(chunk_size, overlap)?;
    Ok(split_words(text, chunk_size, overlap))
}

fn validate(chunk_size: usize, overlap: usize) -> Result<(), IngestError> {
    if chunk_size == 0 {
        return Err(IngestError::InvalidChunkParameters(
            "chunk_size must be > 0".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(IngestError::InvalidChunkParameters(format!(
            "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

fn split_words(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let total_words = words.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total_words {
        let end = (start + chunk_size).min(total_words);
        let candidate = words[start..end].join(" ");
        let (chunk, consumed_words) = cut_at_sentence(&candidate, end - start);

        if !chunk.is_empty() {
            chunks.push(chunk);
        }

        // a window always holds at least one word
        debug_assert!(consumed_words > 0, "chunk window consumed no words");
        let consumed_words = consumed_words.max(1);

        start = if consumed_words > overlap {
            start + consumed_words - overlap
        } else {
            start + consumed_words
        };
    }

    let chunks: Vec<String> = chunks
        .into_iter()
        .map(|chunk| chunk.trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect();

    info!(chunks = chunks.len(), chunk_size, overlap, "split text");
    chunks
}

/// Cut `candidate` after its last period when that period lies past the
/// minimum fraction of its length. Returns the chunk and its word count.
fn cut_at_sentence(candidate: &str, window_words: usize) -> (String, usize) {
    let Some(byte_index) = candidate.rfind('.') else {
        return (candidate.to_string(), window_words);
    };

    let char_offset = candidate[..byte_index].chars().count();
    let floor = (candidate.chars().count() as f64 * MIN_SENTENCE_CUT_FRACTION) as usize;
    if char_offset <= floor {
        return (candidate.to_string(), window_words);
    }

    let cut = candidate[..=byte_index].trim();
    let consumed = cut.split_whitespace().count();
    if consumed == 0 {
        return (candidate.to_string(), window_words);
    }

    (cut.to_string(), consumed)
}

/// Attach provenance to split chunks. Page numbers are approximated by
/// spreading chunks evenly over `page_count` pages.
pub fn build_chunks(
    doc_id: &str,
    title: &str,
    page_count: Option<usize>,
    contents: Vec<String>,
) -> Vec<Chunk> {
    let total = contents.len().max(1);

    contents
        .into_iter()
        .enumerate()
        .map(|(index, content)| Chunk {
            content,
            meta: ChunkMeta {
                doc_id: Some(doc_id.to_string()),
                title: Some(title.to_string()),
                page: page_count
                    .filter(|&pages| pages > 0)
                    .map(|pages| approximate_page(index, total, pages)),
            },
        })
        .collect()
}

fn approximate_page(index: usize, total_chunks: usize, page_count: usize) -> u32 {
    let page = index * page_count / total_chunks + 1;
    page.clamp(1, page_count) as u32
}

pub fn make_chunk_id(doc_id: &str, index: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(doc_id.as_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

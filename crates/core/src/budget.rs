use crate::config::{BudgetConfig, BudgetLimits};
use crate::models::RetrievedChunk;
use tracing::debug;

pub const TRUNCATION_MARKER: &str = "\n\n[TRUNCATED]";

/// Selects and truncates ranked chunks so they fit a character budget.
///
/// Input order is trusted as relevance order; nothing is re-ranked.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBudgeter {
    config: BudgetConfig,
}

impl ContextBudgeter {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub fn prepare(&self, chunks: &[RetrievedChunk]) -> Vec<RetrievedChunk> {
        prepare(chunks, self.config.limits())
    }
}

pub fn prepare(chunks: &[RetrievedChunk], limits: BudgetLimits) -> Vec<RetrievedChunk> {
    let selected = &chunks[..chunks.len().min(limits.max_chunks)];

    if total_chars(selected) <= limits.max_total_chars {
        return selected.to_vec();
    }

    let mut truncated: Vec<RetrievedChunk> = selected
        .iter()
        .map(|chunk| RetrievedChunk {
            content: truncate_content(&chunk.content, limits.max_chars_per_chunk),
            meta: chunk.meta.clone(),
            score: chunk.score,
        })
        .collect();

    // lowest-ranked chunks go first
    while !truncated.is_empty() && total_chars(&truncated) > limits.max_total_chars {
        truncated.pop();
    }

    debug!(
        input = chunks.len(),
        kept = truncated.len(),
        chars = total_chars(&truncated),
        max_total_chars = limits.max_total_chars,
        "context truncated to budget"
    );
    truncated
}

pub fn total_chars(chunks: &[RetrievedChunk]) -> usize {
    chunks.iter().map(|chunk| chunk.content.chars().count()).sum()
}

fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}{TRUNCATION_MARKER}", &content[..byte_index]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMeta;

    fn chunk(content: &str, title: &str) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            meta: ChunkMeta {
                title: Some(title.to_string()),
                ..ChunkMeta::default()
            },
            score: Some(0.5),
        }
    }

    fn limits(max_total_chars: usize, max_chunks: usize, max_chars_per_chunk: usize) -> BudgetLimits {
        BudgetLimits {
            max_total_chars,
            max_chunks,
            max_chars_per_chunk,
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(ContextBudgeter::default().prepare(&[]).is_empty());
    }

    #[test]
    fn within_budget_is_returned_unchanged() {
        let chunks = vec![chunk("alpha", "a"), chunk("beta", "b")];
        assert_eq!(prepare(&chunks, limits(100, 10, 2)), chunks);
    }

    #[test]
    fn only_the_first_chunks_are_taken() {
        let chunks: Vec<_> = (0..5).map(|index| chunk(&index.to_string(), "t")).collect();
        let prepared = prepare(&chunks, limits(100, 3, 10));
        assert_eq!(prepared, chunks[..3].to_vec());
    }

    #[test]
    fn oversized_selection_is_truncated_with_marker() {
        let chunks = vec![chunk(&"x".repeat(30), "first"), chunk("short", "second")];
        let prepared = prepare(&chunks, limits(30, 10, 10));

        assert_eq!(prepared.len(), 2);
        assert_eq!(prepared[0].content, format!("{}{TRUNCATION_MARKER}", "x".repeat(10)));
        assert_eq!(prepared[0].meta.title.as_deref(), Some("first"));
        assert_eq!(prepared[0].score, Some(0.5));
        assert_eq!(prepared[1].content, "short");
    }

    #[test]
    fn chunks_are_dropped_from_the_end_until_it_fits() {
        let chunks = vec![
            chunk(&"a".repeat(50), "1"),
            chunk(&"b".repeat(50), "2"),
            chunk(&"c".repeat(50), "3"),
        ];
        let prepared = prepare(&chunks, limits(60, 10, 20));

        // each truncated chunk is 20 chars plus the marker
        assert_eq!(prepared.len(), 1);
        assert!(prepared[0].content.starts_with("aaaa"));
        assert!(total_chars(&prepared) <= 60);
    }

    #[test]
    fn budget_too_small_for_anything_is_empty() {
        let chunks = vec![chunk(&"a".repeat(50), "1")];
        assert!(prepare(&chunks, limits(5, 10, 20)).is_empty());
    }

    #[test]
    fn truncation_respects_character_boundaries() {
        assert_eq!(truncate_content("ééééé", 2), format!("éé{TRUNCATION_MARKER}"));
        assert_eq!(truncate_content("éé", 2), "éé");
    }

    #[test]
    fn output_never_exceeds_chunk_or_char_limits() {
        let chunks: Vec<_> = (0..20)
            .map(|index| chunk(&"z".repeat(10 + index * 7), "t"))
            .collect();
        for max_chunks in [1, 4, 10, 25] {
            for max_total in [0, 30, 200, 5_000] {
                let prepared = prepare(&chunks, limits(max_total, max_chunks, 40));
                assert!(prepared.len() <= max_chunks);
                assert!(total_chars(&prepared) <= max_total);
            }
        }
    }
}

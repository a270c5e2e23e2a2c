use crate::budget::{prepare, ContextBudgeter};
use crate::config::{BudgetConfig, GenerationConfig};
use crate::error::GenerationError;
use crate::models::{AnswerResult, RetrievedChunk};
use crate::traits::{GenerationRequest, Generator};
use tracing::{info, warn};

pub const REFUSAL: &str = "Answer not found in provided documents.";
pub const FALLBACK_MODEL: &str = "fallback";

const NO_CONTEXT: &str = "No context available.";
const EXCERPT_SEPARATOR: &str = "\n\n---\n\n";
const NOT_CONFIGURED_PREFIX: &str =
    "LLM not configured. Returning top document excerpts concatenated below.\n\n";
const UNAVAILABLE_PREFIX: &str =
    "Generation client not available. Returning concatenated excerpts.\n\n";
const CALL_FAILED_PREFIX: &str = "Generation API call failed. Returning concatenated excerpts.\n\n";

const SYSTEM_PROMPT: &str = "\
You are an assistant that MUST answer using ONLY the provided document excerpts.
Rules (follow exactly):
1. Use ONLY the information contained in the provided excerpts. Do NOT use outside knowledge or make assumptions.
2. If the excerpts do not contain the answer, respond exactly with:
   \"Answer not found in provided documents.\"
   Do not add any other text and do not guess.
3. When you answer, end with a short \"SOURCES:\" section listing the document titles or IDs you used, taken from the excerpt metadata. Separate several sources with commas.
4. Keep the answer concise and focused on the question.
5. If the question is ambiguous and the documents support only one reading, answer from that evidence and do not invent clarifying assumptions.
6. If the excerpts contradict each other, say that the documents disagree and cite the sources involved.";

/// What the answerer can do about generation.
#[derive(Debug)]
pub enum GenerationBackend<G> {
    Ready(G),
    /// No credential was supplied.
    Unconfigured,
    /// A credential exists but the client could not be built.
    Unavailable(String),
}

impl<G> GenerationBackend<G> {
    pub fn from_result(result: Result<G, GenerationError>) -> Self {
        match result {
            Ok(generator) => Self::Ready(generator),
            Err(GenerationError::NotConfigured(_)) => Self::Unconfigured,
            Err(error) => Self::Unavailable(error.to_string()),
        }
    }
}

/// The system and user messages sent for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundedPrompt {
    pub system: String,
    pub user: String,
}

impl GroundedPrompt {
    pub fn build(query: &str, context: &[RetrievedChunk]) -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            user: user_prompt(query, context),
        }
    }

    pub fn char_len(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }
}

fn user_prompt(query: &str, context: &[RetrievedChunk]) -> String {
    let mut lines = vec!["DOCUMENT EXCERPTS (use ONLY these to answer):".to_string()];
    for (offset, chunk) in context.iter().enumerate() {
        let index = offset + 1;
        let label = chunk
            .meta
            .summary()
            .unwrap_or_else(|| format!("chunk_index={index}"));
        lines.push(format!("--- EXCERPT {index} | {label} ---"));
        lines.push(chunk.content.clone());
        lines.push(String::new());
    }
    lines.push("END OF EXCERPTS".to_string());
    lines.push(String::new());
    lines.push("USER QUESTION:".to_string());
    lines.push(query.to_string());
    lines.push(String::new());
    lines.push(format!(
        "INSTRUCTIONS: Answer using ONLY the excerpts above. If the answer is not present, EXACTLY respond: \"{REFUSAL}\""
    ));
    lines.join("\n")
}

/// Produces grounded answers, or a deterministic excerpt dump when
/// generation cannot be used. Never returns an error.
#[derive(Debug)]
pub struct GroundedAnswerer<G> {
    budgeter: ContextBudgeter,
    generation: GenerationConfig,
    backend: GenerationBackend<G>,
}

impl<G: Generator> GroundedAnswerer<G> {
    pub fn new(budget: BudgetConfig, generation: GenerationConfig, backend: GenerationBackend<G>) -> Self {
        Self {
            budgeter: ContextBudgeter::new(budget),
            generation,
            backend,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.backend, GenerationBackend::Ready(_))
    }

    /// `model` overrides the configured model name for this call only.
    pub fn answer(&self, query: &str, chunks: &[RetrievedChunk], model: Option<&str>) -> AnswerResult {
        let sources: Vec<String> = chunks.iter().map(|chunk| chunk.meta.source_label()).collect();
        let mut context = self.budgeter.prepare(chunks);

        let generator = match &self.backend {
            GenerationBackend::Unconfigured => {
                info!("no generation credential; returning concatenated excerpts");
                return fallback(NOT_CONFIGURED_PREFIX, &context, sources, None);
            }
            GenerationBackend::Unavailable(reason) => Err(reason),
            GenerationBackend::Ready(generator) => Ok(generator),
        };

        let mut prompt = GroundedPrompt::build(query, &context);
        let budget = self.budgeter.config();
        let prompt_chars = prompt.char_len();
        if prompt_chars > budget.max_total_chars() {
            warn!(
                prompt_chars,
                max_total_chars = budget.max_total_chars(),
                "prompt exceeds budget; re-budgeting context"
            );
            context = prepare(chunks, budget.corrective_limits());
            prompt = GroundedPrompt::build(query, &context);
        }

        let generator = match generator {
            Ok(generator) => generator,
            Err(reason) => {
                warn!(%reason, "generation client unavailable");
                return fallback(UNAVAILABLE_PREFIX, &context, sources, None);
            }
        };

        let model = model.unwrap_or(&self.generation.model);
        let request = GenerationRequest {
            model: model.to_string(),
            system: prompt.system,
            user: prompt.user,
            max_tokens: self.generation.max_output_tokens,
            temperature: self.generation.temperature,
        };

        match generator.generate(&request) {
            Ok(answer) => AnswerResult {
                answer,
                sources,
                model: model.to_string(),
                error: None,
            },
            Err(error) => {
                warn!(%error, model, "generation call failed");
                fallback(CALL_FAILED_PREFIX, &context, sources, Some(error.to_string()))
            }
        }
    }
}

fn fallback(
    prefix: &str,
    context: &[RetrievedChunk],
    sources: Vec<String>,
    error: Option<String>,
) -> AnswerResult {
    let joined = context
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(EXCERPT_SEPARATOR);
    let body = if joined.is_empty() { NO_CONTEXT } else { joined.as_str() };

    AnswerResult {
        answer: format!("{prefix}{body}"),
        sources,
        model: FALLBACK_MODEL.to_string(),
        error,
    }
}

use serde::Deserialize;

pub const DEFAULT_MIN_TEXT_CHARS: usize = 50;
pub const DEFAULT_SCANNED_RATIO: f64 = 0.30;
pub const DEFAULT_RENDER_SCALE: f32 = 2.0;
pub const DEFAULT_CHUNK_SIZE: usize = 800;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Per-page extraction knobs.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Pages whose trimmed selectable text is shorter than this go through OCR.
    pub min_text_chars: usize,
    /// Upscale factor applied in both axes when rasterizing a page for OCR.
    pub render_scale: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            render_scale: DEFAULT_RENDER_SCALE,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub min_text_chars: usize,
    /// A document is scanned when the share of OCR-needed pages is strictly above this.
    pub scanned_ratio: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            scanned_ratio: DEFAULT_SCANNED_RATIO,
        }
    }
}

/// Word-count window and overlap used by the chunker.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Character budget for excerpts admitted into one generation request.
///
/// Token counts are approximated as `chars / chars_per_token`; there is no
/// tokenizer behind these numbers.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_context_tokens: usize,
    pub chars_per_token: usize,
    pub max_chunks: usize,
    pub max_chars_per_chunk: usize,
}

impl BudgetConfig {
    pub fn max_total_chars(&self) -> usize {
        self.max_context_tokens.saturating_mul(self.chars_per_token)
    }

    pub fn limits(&self) -> BudgetLimits {
        BudgetLimits {
            max_total_chars: self.max_total_chars(),
            max_chunks: self.max_chunks,
            max_chars_per_chunk: self.max_chars_per_chunk,
        }
    }

    /// The tighter allowance used when a built prompt overflows the budget.
    pub fn corrective_limits(&self) -> BudgetLimits {
        BudgetLimits {
            max_total_chars: self.max_total_chars() / 2,
            max_chunks: 3,
            max_chars_per_chunk: 1_000,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 32_000,
            chars_per_token: 4,
            max_chunks: 10,
            max_chars_per_chunk: 4_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetLimits {
    pub max_total_chars: usize,
    pub max_chunks: usize,
    pub max_chars_per_chunk: usize,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: 1_024,
            temperature: 0.0,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub extraction: ExtractionConfig,
    pub scan: ScanConfig,
    pub chunking: ChunkingConfig,
    pub budget: BudgetConfig,
    pub generation: GenerationConfig,
}

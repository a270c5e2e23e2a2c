use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document unreadable: {0}")]
    DocumentUnreadable(String),

    #[error("page {page} could not be processed: {details}")]
    PageProcessing { page: usize, details: String },

    #[error("ocr failed: {0}")]
    Ocr(String),

    #[error("invalid chunk parameters: {0}")]
    InvalidChunkParameters(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("retrieval request failed: {0}")]
    Request(String),

    #[error("unusable retrieval payload: {0}")]
    Payload(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation not configured: {0}")]
    NotConfigured(String),

    #[error("generation unavailable: {0}")]
    Unavailable(String),

    #[error("generation call failed: {0}")]
    CallFailed(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation response from {provider} had no content")]
    EmptyResponse { provider: String },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

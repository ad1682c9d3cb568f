use thiserror::Error;
use uuid::Uuid;

/// One entry in the extraction attempt log: which strategy ran and how many
/// characters of stripped text it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionAttempt {
    pub method: &'static str,
    pub chars: usize,
}

fn format_attempts(attempts: &[ExtractionAttempt]) -> String {
    attempts
        .iter()
        .map(|attempt| format!("{}: {} chars", attempt.method, attempt.chars))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
#[error("embedding failed: {0}")]
pub struct EmbedError(pub String);

#[derive(Debug, Error)]
#[error("generation failed: {0}")]
pub struct GenerationError(pub String);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("text file could not be decoded; tried encodings: {tried}")]
    UndecodableText { tried: String },

    #[error("extracted only {chars} characters of meaningful text (minimum {minimum})")]
    EmptyExtraction { chars: usize, minimum: usize },

    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("all extraction methods failed ({})", format_attempts(.attempts))]
    AllExtractionMethodsFailed { attempts: Vec<ExtractionAttempt> },

    #[error("chunking produced no chunks from non-empty text")]
    ChunkingFailed,

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("ocr failed: {0}")]
    OcrFailed(String),

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store request failed: {0}")]
    Request(String),

    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("embedding dimension {actual} does not match store dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_chain_error_lists_every_attempt() {
        let error = IngestError::AllExtractionMethodsFailed {
            attempts: vec![
                ExtractionAttempt { method: "pdf-text", chars: 0 },
                ExtractionAttempt { method: "pdf-layout", chars: 42 },
                ExtractionAttempt { method: "ocr", chars: 0 },
            ],
        };

        let message = error.to_string();
        assert!(message.contains("pdf-text: 0 chars"));
        assert!(message.contains("pdf-layout: 42 chars"));
        assert!(message.contains("ocr: 0 chars"));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use std::fmt;
use uuid::Uuid;

/// Declared document type, parsed from the file extension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Txt,
    Md,
    Markdown,
}

impl FileType {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim().to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Txt),
            "md" => Some(Self::Md),
            "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// Plain-text family types share the encoding-fallback reader.
    pub fn is_plain_text(self) -> bool {
        matches!(self, Self::Txt | Self::Md | Self::Markdown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Markdown => "markdown",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored document: metadata plus the original bytes. Immutable once
/// persisted except for deletion.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: Uuid,
    pub filename: String,
    pub file_type: FileType,
    #[serde_as(as = "Base64")]
    pub file_data: Vec<u8>,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Document metadata without the binary payload, for listings and lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: Uuid,
    pub filename: String,
    pub file_type: FileType,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&StoredDocument> for DocumentInfo {
    fn from(document: &StoredDocument) -> Self {
        Self {
            id: document.id,
            filename: document.filename.clone(),
            file_type: document.file_type,
            file_size: document.file_size,
            uploaded_at: document.uploaded_at,
        }
    }
}

/// One chunk ready for persistence. `index` values for a document form a
/// contiguous 0..n-1 sequence in creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// Bounds on `RagQuery::top_k`.
pub const TOP_K_MIN: usize = 1;
pub const TOP_K_MAX: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagQuery {
    pub question: String,
    pub document_id: Option<Uuid>,
    pub top_k: usize,
}

impl RagQuery {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            document_id: None,
            top_k: 3,
        }
    }

    pub fn scoped_to(mut self, document_id: Uuid) -> Self {
        self.document_id = Some(document_id);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// A ranked similarity hit. Computed transiently per query, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_text: String,
    pub chunk_index: usize,
    pub document_id: Uuid,
    pub filename: String,
    pub similarity: f32,
}

/// Source reporting for one retrieval hit, exposed independently of whether
/// the confidence gates fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSnippet {
    pub text: String,
    pub similarity: f32,
    pub filename: String,
}

/// Outcome of answer synthesis. Gated outcomes carry enough detail for the
/// caller to decide presentation; generation failures are errors, never an
/// `Answer` variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// The generation capability produced an answer grounded in context.
    Grounded(String),
    /// No retrieval results; generation was not attempted.
    NoContext,
    /// Best similarity fell below the confidence gate; generation was not
    /// attempted.
    LowConfidence { max_similarity: f32 },
}

impl Answer {
    pub fn display_text(&self) -> String {
        match self {
            Self::Grounded(text) => text.clone(),
            Self::NoContext => {
                "I couldn't find any relevant information in the document to answer your question."
                    .to_string()
            }
            Self::LowConfidence { max_similarity } => format!(
                "I found some information but it doesn't seem very relevant to your question \
                 (confidence: {max_similarity:.2}). Please try rephrasing your question."
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub answer: Answer,
    pub sources: Vec<SourceSnippet>,
}

#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub document_id: Uuid,
    pub filename: String,
    pub chunk_count: usize,
}

/// Pipeline tunables. The defaults reproduce the reference behavior; the
/// acceptance threshold and confidence gate are configuration, not
/// invariants.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters of each chunk repeated at the start of its successor.
    pub chunk_overlap: usize,
    /// Minimum meaningful length of cleaned extracted text.
    pub min_text_chars: usize,
    /// Per-strategy acceptance threshold for the extractor chain.
    pub accept_chars: usize,
    /// OCR is bounded to the first this-many pages.
    pub ocr_max_pages: usize,
    /// Upload size limit in bytes.
    pub max_file_bytes: u64,
    /// Confidence gate applied before generation.
    pub min_similarity: f32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            min_text_chars: 50,
            accept_chars: 100,
            ocr_max_pages: 10,
            max_file_bytes: 50 * 1024 * 1024,
            min_similarity: 0.5,
        }
    }
}

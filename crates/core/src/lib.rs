pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod stores;
pub mod synthesis;
pub mod traits;

pub use chunking::{chunk_text, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{
    EmbedError, GenerationError, IngestError, QueryError, StoreError,
};
pub use extractor::{ExtractorChain, OcrEndpointConfig, PdfStrategy};
pub use generation::GeminiGenerator;
pub use ingest::{
    discover_supported_files, ingest_files_best_effort, ingest_folder_best_effort,
    IngestionReport, SkippedFile,
};
pub use models::{
    Answer, ChunkRecord, DocumentInfo, FileType, IngestReceipt, PipelineOptions, QueryResponse,
    RagQuery, RetrievalResult, SourceSnippet, StoredDocument, TOP_K_MAX, TOP_K_MIN,
};
pub use orchestrator::RagPipeline;
pub use stores::{InMemoryStore, QdrantVectorStore};
pub use traits::{DocumentStore, Generator, VectorStore};

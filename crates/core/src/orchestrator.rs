use crate::chunking::{chunk_text, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{IngestError, QueryError, StoreError};
use crate::extractor::{clean_text, decode_plain_text, ExtractorChain};
use crate::models::{
    ChunkRecord, DocumentInfo, FileType, IngestReceipt, PipelineOptions, QueryResponse, RagQuery,
    StoredDocument, TOP_K_MAX, TOP_K_MIN,
};
use crate::synthesis;
use crate::traits::{DocumentStore, Generator, VectorStore};
use tracing::{info, warn};
use uuid::Uuid;

/// The ingestion-and-retrieval pipeline. Its collaborators (document
/// store, vector store, generation client, embedder) are injected at
/// construction; no hidden global state.
pub struct RagPipeline<D, V, G, E> {
    documents: D,
    vectors: V,
    generator: G,
    embedder: E,
    extractor: ExtractorChain,
    options: PipelineOptions,
}

impl<D, V, G, E> RagPipeline<D, V, G, E>
where
    D: DocumentStore,
    V: VectorStore,
    G: Generator,
    E: Embedder,
{
    /// Fails when the embedder and the vector store disagree on
    /// dimensionality: that is a configuration error, not something to
    /// tolerate at runtime.
    pub fn new(
        documents: D,
        vectors: V,
        generator: G,
        embedder: E,
        options: PipelineOptions,
    ) -> Result<Self, IngestError> {
        if embedder.dimensions() != vectors.dimensions() {
            return Err(IngestError::InvalidArgument(format!(
                "embedder dimensionality {} does not match vector store dimensionality {}",
                embedder.dimensions(),
                vectors.dimensions()
            )));
        }

        let extractor = ExtractorChain::standard(&options);
        Ok(Self {
            documents,
            vectors,
            generator,
            embedder,
            extractor,
            options,
        })
    }

    /// Swap in a custom extraction waterfall.
    pub fn with_extractor(mut self, extractor: ExtractorChain) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Extract, clean, and chunk one document. CPU-bound and synchronous;
    /// nothing is persisted.
    pub fn process_document(
        &self,
        bytes: &[u8],
        declared_type: &str,
    ) -> Result<Vec<String>, IngestError> {
        if bytes.is_empty() {
            return Err(IngestError::InvalidArgument(
                "file is empty (0 bytes)".to_string(),
            ));
        }

        let size = bytes.len() as u64;
        if size > self.options.max_file_bytes {
            return Err(IngestError::FileTooLarge {
                size,
                limit: self.options.max_file_bytes,
            });
        }

        let file_type = FileType::from_extension(declared_type)
            .ok_or_else(|| IngestError::UnsupportedType(declared_type.to_string()))?;

        let text = if file_type.is_plain_text() {
            clean_text(&decode_plain_text(bytes)?)
        } else {
            self.extractor.extract(bytes)?
        };

        let chars = text.chars().count();
        if chars < self.options.min_text_chars {
            return Err(IngestError::EmptyExtraction {
                chars,
                minimum: self.options.min_text_chars,
            });
        }

        let chunks = chunk_text(
            &text,
            ChunkingConfig {
                chunk_size: self.options.chunk_size,
                chunk_overlap: self.options.chunk_overlap,
            },
        )?;

        if chunks.is_empty() {
            return Err(IngestError::ChunkingFailed);
        }

        info!(chars, chunk_count = chunks.len(), "document processed");
        Ok(chunks)
    }

    /// Batch-embed one document's chunks and persist them as one batch.
    pub async fn embed_and_store_chunks(
        &self,
        document_id: Uuid,
        filename: &str,
        chunks: &[String],
    ) -> Result<(), IngestError> {
        let embeddings = self.embedder.embed_batch(chunks)?;

        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (text, embedding))| ChunkRecord {
                text: text.clone(),
                index,
                embedding,
            })
            .collect();

        self.vectors
            .store_chunks(document_id, filename, &records)
            .await?;
        Ok(())
    }

    /// Full ingestion of one document as one unit: a failed chunk batch
    /// rolls the document back so no document exists without its chunks.
    pub async fn ingest_document(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestReceipt, IngestError> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, extension)| extension)
            .ok_or_else(|| IngestError::UnsupportedType(filename.to_string()))?;
        let file_type = FileType::from_extension(extension)
            .ok_or_else(|| IngestError::UnsupportedType(extension.to_string()))?;

        let chunks = self.process_document(&bytes, extension)?;

        let document_id = self
            .documents
            .insert_document(filename, file_type, bytes)
            .await?;

        if let Err(error) = self
            .embed_and_store_chunks(document_id, filename, &chunks)
            .await
        {
            warn!(%error, %document_id, "chunk batch failed, rolling back document");
            let _ = self.vectors.delete_chunks(document_id).await;
            let _ = self.documents.delete_document(document_id).await;
            return Err(error);
        }

        info!(%document_id, filename, chunk_count = chunks.len(), "document ingested");
        Ok(IngestReceipt {
            document_id,
            filename: filename.to_string(),
            chunk_count: chunks.len(),
        })
    }

    /// One embedding call, one similarity search, at most one generation
    /// call. Identical queries are recomputed from scratch every time.
    pub async fn query(&self, query: &RagQuery) -> Result<QueryResponse, QueryError> {
        if query.question.trim().is_empty() {
            return Err(QueryError::InvalidArgument(
                "question is empty".to_string(),
            ));
        }
        if !(TOP_K_MIN..=TOP_K_MAX).contains(&query.top_k) {
            return Err(QueryError::InvalidArgument(format!(
                "top_k must be between {TOP_K_MIN} and {TOP_K_MAX}, got {}",
                query.top_k
            )));
        }

        let query_vector = self.embedder.embed(&query.question)?;
        let results = self
            .vectors
            .search(&query_vector, query.top_k, query.document_id)
            .await?;

        let sources = synthesis::source_snippets(&results);
        let answer = synthesis::synthesize(
            &self.generator,
            &query.question,
            &results,
            self.options.min_similarity,
        )
        .await?;

        Ok(QueryResponse { answer, sources })
    }

    /// Delete a document and all of its chunks.
    pub async fn delete_document(&self, document_id: Uuid) -> Result<(), StoreError> {
        self.vectors.delete_chunks(document_id).await?;
        self.documents.delete_document(document_id).await
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>, StoreError> {
        self.documents.list_documents().await
    }

    pub async fn document_info(
        &self,
        document_id: Uuid,
    ) -> Result<Option<DocumentInfo>, StoreError> {
        self.documents.document_info(document_id).await
    }

    pub async fn document_file(
        &self,
        document_id: Uuid,
    ) -> Result<Option<StoredDocument>, StoreError> {
        self.documents.document_file(document_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::GenerationError;
    use crate::models::{Answer, RetrievalResult};
    use crate::stores::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Ok("a grounded answer".to_string())
        }
    }

    struct BrokenVectorStore {
        dimensions: usize,
    }

    #[async_trait]
    impl VectorStore for BrokenVectorStore {
        fn dimensions(&self) -> usize {
            self.dimensions
        }

        async fn store_chunks(
            &self,
            _document_id: Uuid,
            _filename: &str,
            _records: &[ChunkRecord],
        ) -> Result<(), StoreError> {
            Err(StoreError::Request("disk on fire".to_string()))
        }

        async fn search(
            &self,
            _query_vector: &[f32],
            _top_k: usize,
            _document_id: Option<Uuid>,
        ) -> Result<Vec<RetrievalResult>, StoreError> {
            Ok(Vec::new())
        }

        async fn delete_chunks(&self, _document_id: Uuid) -> Result<(), StoreError> {
            Ok(())
        }
    }

    type MemoryPipeline =
        RagPipeline<Arc<InMemoryStore>, Arc<InMemoryStore>, EchoGenerator, CharacterNgramEmbedder>;

    fn pipeline_with(options: PipelineOptions) -> (MemoryPipeline, Arc<InMemoryStore>) {
        let embedder = CharacterNgramEmbedder::default();
        let store = Arc::new(InMemoryStore::new(embedder.dimensions));
        let pipeline = RagPipeline::new(
            Arc::clone(&store),
            Arc::clone(&store),
            EchoGenerator,
            embedder,
            options,
        )
        .unwrap();
        (pipeline, store)
    }

    fn pipeline() -> (MemoryPipeline, Arc<InMemoryStore>) {
        pipeline_with(PipelineOptions::default())
    }

    #[tokio::test]
    async fn ingesting_twelve_hundred_chars_yields_two_chunks() {
        let (pipeline, _store) = pipeline();
        let text = "word ".repeat(240);

        let receipt = pipeline
            .ingest_document("note.txt", text.into_bytes())
            .await
            .unwrap();

        assert_eq!(receipt.chunk_count, 2);
        assert_eq!(receipt.filename, "note.txt");

        let listed = pipeline.list_documents().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, receipt.document_id);
    }

    #[tokio::test]
    async fn querying_an_empty_store_returns_the_no_context_answer() {
        let (pipeline, _store) = pipeline();

        let response = pipeline
            .query(&RagQuery::new("anything at all?"))
            .await
            .unwrap();

        assert_eq!(response.answer, Answer::NoContext);
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn query_grounds_an_answer_in_the_ingested_document() {
        let options = PipelineOptions {
            min_similarity: 0.0,
            ..PipelineOptions::default()
        };
        let (pipeline, _store) = pipeline_with(options);

        let text = "The hydraulic pump operates at 3000 psi under normal load. ".repeat(5);
        let receipt = pipeline
            .ingest_document("manual.txt", text.into_bytes())
            .await
            .unwrap();

        let response = pipeline
            .query(&RagQuery::new("What pressure does the hydraulic pump operate at?"))
            .await
            .unwrap();

        assert_eq!(response.answer, Answer::Grounded("a grounded answer".to_string()));
        assert!(!response.sources.is_empty());
        assert_eq!(response.sources[0].filename, "manual.txt");

        // Scoped query stays inside the named document.
        let scoped = pipeline
            .query(&RagQuery::new("hydraulic pump pressure").scoped_to(receipt.document_id))
            .await
            .unwrap();
        assert!(!scoped.sources.is_empty());
    }

    #[tokio::test]
    async fn low_similarity_hits_are_gated_without_generation() {
        let options = PipelineOptions {
            min_similarity: 0.99,
            ..PipelineOptions::default()
        };
        let (pipeline, _store) = pipeline_with(options);

        let text = "Completely unrelated prose about medieval falconry practices. ".repeat(3);
        pipeline
            .ingest_document("falcons.txt", text.into_bytes())
            .await
            .unwrap();

        let response = pipeline
            .query(&RagQuery::new("quarterly financial projections"))
            .await
            .unwrap();

        assert!(matches!(response.answer, Answer::LowConfidence { .. }));
        // Sources are reported even when the gate fires.
        assert!(!response.sources.is_empty());
    }

    #[tokio::test]
    async fn failed_chunk_batch_rolls_the_document_back() {
        let embedder = CharacterNgramEmbedder::default();
        let documents = Arc::new(InMemoryStore::new(embedder.dimensions));
        let vectors = BrokenVectorStore {
            dimensions: embedder.dimensions,
        };
        let pipeline = RagPipeline::new(
            Arc::clone(&documents),
            vectors,
            EchoGenerator,
            embedder,
            PipelineOptions::default(),
        )
        .unwrap();

        let text = "word ".repeat(100);
        let outcome = pipeline.ingest_document("doomed.txt", text.into_bytes()).await;

        assert!(outcome.is_err());
        assert!(documents.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_document_cascades_to_its_chunks() {
        let (pipeline, store) = pipeline();
        let text = "word ".repeat(100);
        let receipt = pipeline
            .ingest_document("gone.txt", text.into_bytes())
            .await
            .unwrap();

        pipeline.delete_document(receipt.document_id).await.unwrap();

        assert!(pipeline.list_documents().await.unwrap().is_empty());
        let embedder = CharacterNgramEmbedder::default();
        let probe = embedder.embed("word").unwrap();
        assert!(store.search(&probe, 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_and_missing_extensions_are_rejected() {
        let (pipeline, _store) = pipeline();

        let error = pipeline
            .ingest_document("slides.pptx", vec![b'x'; 100])
            .await
            .unwrap_err();
        assert!(matches!(error, IngestError::UnsupportedType(_)));

        let error = pipeline
            .ingest_document("no-extension", vec![b'x'; 100])
            .await
            .unwrap_err();
        assert!(matches!(error, IngestError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn top_k_bounds_are_enforced() {
        let (pipeline, _store) = pipeline();

        for top_k in [0usize, 21] {
            let error = pipeline
                .query(&RagQuery::new("question?").with_top_k(top_k))
                .await
                .unwrap_err();
            assert!(matches!(error, QueryError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn blank_questions_are_rejected() {
        let (pipeline, _store) = pipeline();
        let error = pipeline.query(&RagQuery::new("   ")).await.unwrap_err();
        assert!(matches!(error, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn tiny_extractions_are_rejected() {
        let (pipeline, _store) = pipeline();
        let error = pipeline
            .process_document(b"too short", "txt")
            .unwrap_err();
        assert!(matches!(
            error,
            IngestError::EmptyExtraction { chars: 9, minimum: 50 }
        ));
    }

    #[test]
    fn oversized_files_are_rejected_before_extraction() {
        let options = PipelineOptions {
            max_file_bytes: 16,
            ..PipelineOptions::default()
        };
        let (pipeline, _store) = pipeline_with(options);

        let error = pipeline
            .process_document(&[b'a'; 32], "txt")
            .unwrap_err();
        assert!(matches!(error, IngestError::FileTooLarge { size: 32, limit: 16 }));
    }

    #[test]
    fn dimensionality_mismatch_fails_at_construction() {
        let embedder = CharacterNgramEmbedder { dimensions: 64 };
        let store = Arc::new(InMemoryStore::new(384));

        let outcome = RagPipeline::new(
            Arc::clone(&store),
            store,
            EchoGenerator,
            embedder,
            PipelineOptions::default(),
        );

        assert!(matches!(outcome, Err(IngestError::InvalidArgument(_))));
    }
}

use crate::error::{GenerationError, StoreError};
use crate::models::{ChunkRecord, DocumentInfo, FileType, RetrievalResult, StoredDocument};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Document byte storage and metadata: the persistence collaborator the
/// ingestion pipeline consumes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(
        &self,
        filename: &str,
        file_type: FileType,
        file_data: Vec<u8>,
    ) -> Result<Uuid, StoreError>;

    async fn document_info(&self, document_id: Uuid) -> Result<Option<DocumentInfo>, StoreError>;

    /// Full record including the original bytes, for download.
    async fn document_file(&self, document_id: Uuid)
        -> Result<Option<StoredDocument>, StoreError>;

    /// All documents, newest first.
    async fn list_documents(&self) -> Result<Vec<DocumentInfo>, StoreError>;

    async fn delete_document(&self, document_id: Uuid) -> Result<(), StoreError>;
}

/// Chunk persistence and nearest-neighbor search by cosine similarity.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Dimensionality every stored embedding must have.
    fn dimensions(&self) -> usize;

    /// Persist one document's chunk batch. Atomic per document: either all
    /// records commit or none do.
    async fn store_chunks(
        &self,
        document_id: Uuid,
        filename: &str,
        records: &[ChunkRecord],
    ) -> Result<(), StoreError>;

    /// Ranked by descending similarity; ties broken by ascending chunk
    /// index, then by document insertion order. At most `top_k` results;
    /// scoped to one document when `document_id` is given.
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        document_id: Option<Uuid>,
    ) -> Result<Vec<RetrievalResult>, StoreError>;

    async fn delete_chunks(&self, document_id: Uuid) -> Result<(), StoreError>;
}

/// The generation capability behind answer synthesis. Blocking from the
/// caller's point of view; any timeout policy belongs to the caller.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

// Shared-ownership delegation, so one store instance can back both the
// document and vector seams of a pipeline.

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn insert_document(
        &self,
        filename: &str,
        file_type: FileType,
        file_data: Vec<u8>,
    ) -> Result<Uuid, StoreError> {
        (**self).insert_document(filename, file_type, file_data).await
    }

    async fn document_info(&self, document_id: Uuid) -> Result<Option<DocumentInfo>, StoreError> {
        (**self).document_info(document_id).await
    }

    async fn document_file(
        &self,
        document_id: Uuid,
    ) -> Result<Option<StoredDocument>, StoreError> {
        (**self).document_file(document_id).await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentInfo>, StoreError> {
        (**self).list_documents().await
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<(), StoreError> {
        (**self).delete_document(document_id).await
    }
}

#[async_trait]
impl<T: VectorStore + ?Sized> VectorStore for Arc<T> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn store_chunks(
        &self,
        document_id: Uuid,
        filename: &str,
        records: &[ChunkRecord],
    ) -> Result<(), StoreError> {
        (**self).store_chunks(document_id, filename, records).await
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        document_id: Option<Uuid>,
    ) -> Result<Vec<RetrievalResult>, StoreError> {
        (**self).search(query_vector, top_k, document_id).await
    }

    async fn delete_chunks(&self, document_id: Uuid) -> Result<(), StoreError> {
        (**self).delete_chunks(document_id).await
    }
}

#[async_trait]
impl<T: Generator + ?Sized> Generator for Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        (**self).generate(prompt).await
    }
}

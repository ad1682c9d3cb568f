use crate::error::StoreError;
use crate::models::{ChunkRecord, DocumentInfo, FileType, RetrievalResult, StoredDocument};
use crate::traits::{DocumentStore, VectorStore};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Cosine similarity between two vectors; 0.0 when either has zero
/// magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

struct ChunkRow {
    document_id: Uuid,
    filename: String,
    index: usize,
    text: String,
    embedding: Vec<f32>,
    /// Position of the owning document's chunk batch in insertion order,
    /// used as the final ranking tie-break.
    batch: u64,
}

#[derive(Default)]
struct StoreInner {
    documents: Vec<StoredDocument>,
    chunks: Vec<ChunkRow>,
    next_batch: u64,
}

/// In-process document and chunk store. Single write lock per mutation
/// keeps each document's chunk batch all-or-nothing.
pub struct InMemoryStore {
    dimensions: usize,
    inner: RwLock<StoreInner>,
}

impl InMemoryStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            inner: RwLock::new(StoreInner::default()),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_document(
        &self,
        filename: &str,
        file_type: FileType,
        file_data: Vec<u8>,
    ) -> Result<Uuid, StoreError> {
        let document = StoredDocument {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            file_type,
            file_size: file_data.len() as u64,
            file_data,
            uploaded_at: Utc::now(),
        };
        let id = document.id;

        let mut inner = self.inner.write().await;
        inner.documents.push(document);
        Ok(id)
    }

    async fn document_info(&self, document_id: Uuid) -> Result<Option<DocumentInfo>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .iter()
            .find(|document| document.id == document_id)
            .map(DocumentInfo::from))
    }

    async fn document_file(
        &self,
        document_id: Uuid,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .iter()
            .find(|document| document.id == document_id)
            .cloned())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentInfo>, StoreError> {
        let inner = self.inner.read().await;
        let mut listed: Vec<DocumentInfo> =
            inner.documents.iter().map(DocumentInfo::from).collect();
        listed.reverse();
        Ok(listed)
    }

    /// Cascades: the document's chunk rows go with it, so callers holding
    /// only the `DocumentStore` seam never leak chunks.
    async fn delete_document(&self, document_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.documents.retain(|document| document.id != document_id);
        inner.chunks.retain(|row| row.document_id != document_id);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn store_chunks(
        &self,
        document_id: Uuid,
        filename: &str,
        records: &[ChunkRecord],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        // Validate the whole batch before inserting any row.
        for (position, record) in records.iter().enumerate() {
            if record.embedding.len() != self.dimensions {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: record.embedding.len(),
                });
            }
            if record.index != position {
                return Err(StoreError::Request(format!(
                    "chunk indexes must be contiguous from zero, got {} at position {}",
                    record.index, position
                )));
            }
        }

        let batch = inner.next_batch;
        inner.next_batch += 1;

        for record in records {
            inner.chunks.push(ChunkRow {
                document_id,
                filename: filename.to_string(),
                index: record.index,
                text: record.text.clone(),
                embedding: record.embedding.clone(),
                batch,
            });
        }

        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        document_id: Option<Uuid>,
    ) -> Result<Vec<RetrievalResult>, StoreError> {
        if query_vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }

        let inner = self.inner.read().await;

        let mut scored: Vec<(f32, &ChunkRow)> = inner
            .chunks
            .iter()
            .filter(|row| document_id.map_or(true, |scope| row.document_id == scope))
            .map(|row| (cosine_similarity(&row.embedding, query_vector), row))
            .collect();

        scored.sort_by(|(left_sim, left), (right_sim, right)| {
            right_sim
                .total_cmp(left_sim)
                .then_with(|| left.index.cmp(&right.index))
                .then_with(|| left.batch.cmp(&right.batch))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(similarity, row)| RetrievalResult {
                chunk_text: row.text.clone(),
                chunk_index: row.index,
                document_id: row.document_id,
                filename: row.filename.clone(),
                similarity,
            })
            .collect())
    }

    async fn delete_chunks(&self, document_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.chunks.retain(|row| row.document_id != document_id);
        Ok(())
    }
}

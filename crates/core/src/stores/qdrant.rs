use crate::error::StoreError;
use crate::models::{ChunkRecord, RetrievalResult};
use crate::traits::VectorStore;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Qdrant-backed chunk store over its HTTP API. Chunk text, index, and the
/// owning document's id and filename travel in the point payload, so the
/// query path needs no second lookup.
pub struct QdrantVectorStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantVectorStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Result<Self, StoreError> {
        let endpoint = endpoint.into();
        url::Url::parse(&endpoint)?;

        Ok(Self {
            endpoint,
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        })
    }

    /// Create the collection with cosine distance if it does not exist.
    pub async fn ensure_collection(&self) -> Result<(), StoreError> {
        let existing = self
            .client
            .get(format!("{}/collections/{}", self.endpoint, self.collection))
            .send()
            .await?;

        if existing.status().is_success() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, self.collection))
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    fn document_filter(document_id: Uuid) -> Value {
        json!({
            "must": [
                { "key": "document_id", "match": { "value": document_id.to_string() } }
            ]
        })
    }
}

/// Deterministic point id from the owning document and chunk index, so
/// re-sending the same batch upserts instead of duplicating.
fn point_id(document_id: Uuid, chunk_index: usize) -> Result<Uuid, StoreError> {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(chunk_index.to_le_bytes());
    let digest = hasher.finalize();

    Uuid::from_slice(&digest[..16])
        .map_err(|error| StoreError::Request(format!("point id derivation failed: {error}")))
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn dimensions(&self) -> usize {
        self.vector_size
    }

    async fn store_chunks(
        &self,
        document_id: Uuid,
        filename: &str,
        records: &[ChunkRecord],
    ) -> Result<(), StoreError> {
        let points = records
            .iter()
            .map(|record| {
                if record.embedding.len() != self.vector_size {
                    return Err(StoreError::DimensionMismatch {
                        expected: self.vector_size,
                        actual: record.embedding.len(),
                    });
                }

                Ok(json!({
                    "id": point_id(document_id, record.index)?.to_string(),
                    "vector": record.embedding,
                    "payload": {
                        "document_id": document_id.to_string(),
                        "filename": filename,
                        "chunk_index": record.index,
                        "chunk_text": record.text,
                    },
                }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        // One batched upsert per document keeps the chunk batch atomic.
        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
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
        if query_vector.len() != self.vector_size {
            return Err(StoreError::DimensionMismatch {
                expected: self.vector_size,
                actual: query_vector.len(),
            });
        }

        let mut body = json!({
            "vector": query_vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(scope) = document_id {
            body["filter"] = Self::document_filter(scope);
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::new();
        for hit in hits {
            let similarity = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            let chunk_text = hit
                .pointer("/payload/chunk_text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let chunk_index = hit
                .pointer("/payload/chunk_index")
                .and_then(Value::as_u64)
                .unwrap_or_default() as usize;
            let filename = hit
                .pointer("/payload/filename")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let owner = hit
                .pointer("/payload/document_id")
                .and_then(Value::as_str)
                .and_then(|value| Uuid::parse_str(value).ok())
                .unwrap_or_else(Uuid::nil);

            results.push(RetrievalResult {
                chunk_text,
                chunk_index,
                document_id: owner,
                filename,
                similarity,
            });
        }

        // Qdrant orders by score only; settle equal scores by chunk index.
        results.sort_by(|left, right| {
            right
                .similarity
                .total_cmp(&left.similarity)
                .then_with(|| left.chunk_index.cmp(&right.chunk_index))
        });

        Ok(results)
    }

    async fn delete_chunks(&self, document_id: Uuid) -> Result<(), StoreError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/delete?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "filter": Self::document_filter(document_id) }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_deterministic_and_distinct() {
        let document_id = Uuid::new_v4();
        let first = point_id(document_id, 0).unwrap();
        let again = point_id(document_id, 0).unwrap();
        let second = point_id(document_id, 1).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, second);
    }

    #[test]
    fn endpoint_must_be_a_valid_url() {
        assert!(QdrantVectorStore::new("not a url", "chunks", 384).is_err());
        assert!(QdrantVectorStore::new("http://localhost:6333", "chunks", 384).is_ok());
    }
}

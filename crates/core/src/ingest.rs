use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::models::{FileType, IngestReceipt};
use crate::orchestrator::RagPipeline;
use crate::traits::{DocumentStore, Generator, VectorStore};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Recursively collect every file whose extension names a supported type,
/// sorted for deterministic ingestion order.
pub fn discover_supported_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .extension()
            .and_then(|extension| extension.to_str())
            .and_then(FileType::from_extension)
            .is_some();

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub succeeded: Vec<IngestReceipt>,
    pub failed: Vec<SkippedFile>,
}

/// Ingest every supported file under `folder`, skipping files that fail
/// instead of aborting the batch. Errors only when the folder holds no
/// supported files at all.
pub async fn ingest_folder_best_effort<D, V, G, E>(
    pipeline: &RagPipeline<D, V, G, E>,
    folder: &Path,
) -> Result<IngestionReport, IngestError>
where
    D: DocumentStore,
    V: VectorStore,
    G: Generator,
    E: Embedder,
{
    let files = discover_supported_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no supported files found in {}",
            folder.display()
        )));
    }

    Ok(ingest_files_best_effort(pipeline, &files).await)
}

pub async fn ingest_files_best_effort<D, V, G, E>(
    pipeline: &RagPipeline<D, V, G, E>,
    files: &[PathBuf],
) -> IngestionReport
where
    D: DocumentStore,
    V: VectorStore,
    G: Generator,
    E: Embedder,
{
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();

    for path in files {
        match ingest_file(pipeline, path).await {
            Ok(receipt) => succeeded.push(receipt),
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping file");
                failed.push(SkippedFile {
                    path: path.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    IngestionReport { succeeded, failed }
}

async fn ingest_file<D, V, G, E>(
    pipeline: &RagPipeline<D, V, G, E>,
    path: &Path,
) -> Result<IngestReceipt, IngestError>
where
    D: DocumentStore,
    V: VectorStore,
    G: Generator,
    E: Embedder,
{
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    let bytes = tokio::fs::read(path).await?;
    pipeline.ingest_document(filename, bytes).await
}

#[cfg(test)]
mod tests {
    use super::{discover_supported_files, ingest_folder_best_effort};
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::GenerationError;
    use crate::models::PipelineOptions;
    use crate::orchestrator::RagPipeline;
    use crate::stores::InMemoryStore;
    use crate::traits::Generator;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct NeverGenerator;

    #[async_trait]
    impl Generator for NeverGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Err(GenerationError("not expected during ingestion".to_string()))
        }
    }

    fn pipeline() -> RagPipeline<
        Arc<InMemoryStore>,
        Arc<InMemoryStore>,
        NeverGenerator,
        CharacterNgramEmbedder,
    > {
        let embedder = CharacterNgramEmbedder::default();
        let store = Arc::new(InMemoryStore::new(embedder.dimensions));
        RagPipeline::new(
            Arc::clone(&store),
            store,
            NeverGenerator,
            embedder,
            PipelineOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn discovery_is_recursive_and_extension_filtered() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        fs::write(base.join("a.txt"), "plain text")?;
        fs::write(base.join("b.PDF"), b"%PDF-1.4\n%fake")?;
        fs::write(nested.join("c.md"), "# heading")?;
        fs::write(nested.join("ignored.docx"), "not supported")?;

        let files = discover_supported_files(base);
        assert_eq!(files.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn folder_ingestion_fails_without_supported_files(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("ignored.docx"), "not supported")?;

        let result = ingest_folder_best_effort(&pipeline(), dir.path()).await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn best_effort_skips_failing_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("good.txt"), "word ".repeat(100))?;
        fs::write(dir.path().join("tiny.txt"), "too short")?;

        let report = ingest_folder_best_effort(&pipeline(), dir.path()).await?;

        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.succeeded[0].filename, "good.txt");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(
            report.failed[0].path.file_name().and_then(|name| name.to_str()),
            Some("tiny.txt")
        );
        Ok(())
    }
}

use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_rag_core::{
    ingest_folder_best_effort, CharacterNgramEmbedder, Embedder, GeminiGenerator, InMemoryStore,
    PipelineOptions, QdrantVectorStore, RagPipeline, RagQuery,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "doc-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection for document chunks
    #[arg(long, default_value = "doc_chunks")]
    qdrant_collection: String,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest every supported document under a folder.
    Ingest {
        /// Folder searched recursively for pdf, txt, md, and markdown files.
        #[arg(long)]
        folder: String,
    },
    /// Ask a question grounded in previously ingested documents.
    Ask {
        /// The question to answer.
        #[arg(long)]
        question: String,
        /// Restrict retrieval to one document.
        #[arg(long)]
        document_id: Option<Uuid>,
        /// Number of chunks to retrieve.
        #[arg(long, default_value = "3")]
        top_k: usize,
    },
    /// Delete a document and its chunks.
    Delete {
        #[arg(long)]
        document_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let embedder = CharacterNgramEmbedder::default();
    let documents = Arc::new(InMemoryStore::new(embedder.dimensions()));
    let vectors = QdrantVectorStore::new(
        &cli.qdrant_url,
        &cli.qdrant_collection,
        embedder.dimensions(),
    )
    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let generator = GeminiGenerator::from_env();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "doc-rag boot"
    );

    match cli.command {
        Command::Ingest { folder } => {
            vectors
                .ensure_collection()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let pipeline = RagPipeline::new(
                documents,
                vectors,
                generator,
                embedder,
                PipelineOptions::default(),
            )
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let report = ingest_folder_best_effort(&pipeline, Path::new(&folder))
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            for skipped in &report.failed {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
            }

            for receipt in &report.succeeded {
                println!(
                    "ingested {} document_id={} chunks={}",
                    receipt.filename, receipt.document_id, receipt.chunk_count
                );
            }

            println!(
                "{} ingested, {} skipped at {}",
                report.succeeded.len(),
                report.failed.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask {
            question,
            document_id,
            top_k,
        } => {
            let pipeline = RagPipeline::new(
                documents,
                vectors,
                generator,
                embedder,
                PipelineOptions::default(),
            )
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let mut query = RagQuery::new(question).with_top_k(top_k);
            if let Some(scope) = document_id {
                query = query.scoped_to(scope);
            }

            let response = pipeline
                .query(&query)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("{}", response.answer.display_text());

            for (position, source) in response.sources.iter().enumerate() {
                println!(
                    "[source {}] file={} similarity={:.4}",
                    position + 1,
                    source.filename,
                    source.similarity
                );
                println!("  {}", source.text);
            }
        }
        Command::Delete { document_id } => {
            let pipeline = RagPipeline::new(
                documents,
                vectors,
                generator,
                embedder,
                PipelineOptions::default(),
            )
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            pipeline
                .delete_document(document_id)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("deleted document {document_id}");
        }
    }

    Ok(())
}

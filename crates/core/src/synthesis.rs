use crate::error::QueryError;
use crate::models::{Answer, RetrievalResult, SourceSnippet};
use crate::traits::Generator;
use tracing::info;

/// Characters of chunk text exposed per source snippet before truncation.
const SNIPPET_CHARS: usize = 200;

/// Context block: each retrieved chunk labeled in ranked order.
pub fn build_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(position, result)| format!("[Chunk {}]: {}", position + 1, result.chunk_text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Instruction prompt directing the generation capability to stay inside
/// the supplied context.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful assistant answering questions based on the provided document context.\n\
         \n\
         Context from the document:\n\
         {context}\n\
         \n\
         User Question: {question}\n\
         \n\
         Instructions:\n\
         - Answer the question using ONLY the information from the provided context\n\
         - If the context doesn't contain enough information to fully answer the question, say so\n\
         - Be concise and specific\n\
         - If you're making inferences, clearly indicate that\n\
         - Do not make up information that's not in the context\n\
         \n\
         Answer:"
    )
}

/// Source reporting for the caller, built whether or not a gate fired.
pub fn source_snippets(results: &[RetrievalResult]) -> Vec<SourceSnippet> {
    results
        .iter()
        .map(|result| {
            let text = if result.chunk_text.chars().count() > SNIPPET_CHARS {
                let truncated: String = result.chunk_text.chars().take(SNIPPET_CHARS).collect();
                format!("{truncated}...")
            } else {
                result.chunk_text.clone()
            };

            SourceSnippet {
                text,
                similarity: result.similarity,
                filename: result.filename.clone(),
            }
        })
        .collect()
}

/// Confidence-gated answer synthesis: empty results and low-confidence
/// result sets short-circuit without touching the generation capability;
/// otherwise generation runs exactly once over the grounded prompt.
pub async fn synthesize<G: Generator + ?Sized>(
    generator: &G,
    question: &str,
    results: &[RetrievalResult],
    min_similarity: f32,
) -> Result<Answer, QueryError> {
    if results.is_empty() {
        info!("no retrieval results, skipping generation");
        return Ok(Answer::NoContext);
    }

    let max_similarity = results
        .iter()
        .map(|result| result.similarity)
        .fold(f32::MIN, f32::max);

    if max_similarity < min_similarity {
        info!(max_similarity, min_similarity, "below confidence gate, skipping generation");
        return Ok(Answer::LowConfidence { max_similarity });
    }

    let context = build_context(results);
    let prompt = build_prompt(question, &context);
    let text = generator.generate(&prompt).await?;

    Ok(Answer::Grounded(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[derive(Default)]
    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Generator for CountingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("answered: {}", prompt.len()))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Err(GenerationError("model unavailable".to_string()))
        }
    }

    fn hit(text: &str, similarity: f32) -> RetrievalResult {
        RetrievalResult {
            chunk_text: text.to_string(),
            chunk_index: 0,
            document_id: Uuid::new_v4(),
            filename: "doc.pdf".to_string(),
            similarity,
        }
    }

    #[tokio::test]
    async fn empty_results_skip_generation() {
        let generator = CountingGenerator::default();
        let answer = synthesize(&generator, "question?", &[], 0.5).await.unwrap();

        assert_eq!(answer, Answer::NoContext);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn low_confidence_skips_generation_and_names_the_score() {
        let generator = CountingGenerator::default();
        let results = vec![hit("weakly related", 0.3), hit("weaker still", 0.1)];

        let answer = synthesize(&generator, "question?", &results, 0.5)
            .await
            .unwrap();

        assert_eq!(answer, Answer::LowConfidence { max_similarity: 0.3 });
        assert!(answer.display_text().contains("0.30"));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn confident_results_call_generation_once() {
        let generator = CountingGenerator::default();
        let results = vec![hit("highly relevant", 0.9)];

        let answer = synthesize(&generator, "question?", &results, 0.5)
            .await
            .unwrap();

        assert!(matches!(answer, Answer::Grounded(_)));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generation_failure_is_an_error_not_an_answer() {
        let results = vec![hit("relevant", 0.9)];
        let outcome = synthesize(&FailingGenerator, "question?", &results, 0.5).await;

        assert!(matches!(outcome, Err(QueryError::Generation(_))));
    }

    #[test]
    fn context_labels_chunks_in_ranked_order() {
        let results = vec![hit("first text", 0.9), hit("second text", 0.8)];
        let context = build_context(&results);

        assert!(context.contains("[Chunk 1]: first text"));
        assert!(context.contains("[Chunk 2]: second text"));
    }

    #[test]
    fn prompt_embeds_question_and_context() {
        let prompt = build_prompt("what is this?", "[Chunk 1]: content");

        assert!(prompt.contains("User Question: what is this?"));
        assert!(prompt.contains("[Chunk 1]: content"));
        assert!(prompt.contains("ONLY the information from the provided context"));
    }

    #[test]
    fn snippets_truncate_long_chunks_with_an_ellipsis() {
        let long = "x".repeat(250);
        let results = vec![hit(&long, 0.7), hit("short", 0.6)];

        let snippets = source_snippets(&results);
        assert_eq!(snippets[0].text.chars().count(), 203);
        assert!(snippets[0].text.ends_with("..."));
        assert_eq!(snippets[1].text, "short");
        assert_eq!(snippets[0].filename, "doc.pdf");
    }
}

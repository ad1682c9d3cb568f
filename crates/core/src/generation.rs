use crate::error::GenerationError;
use crate::traits::Generator;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Generation client for Gemini-style `generateContent` endpoints. One
/// prompt in, one text completion out; no internal timeout or retry, that
/// policy belongs to the caller.
pub struct GeminiGenerator {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl GeminiGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            client: Client::new(),
        }
    }

    /// Build from `GEMINI_API_KEY`, `GEMINI_ENDPOINT`, and `GEMINI_MODEL`.
    /// A missing key still constructs; `generate` then fails with a
    /// `GenerationError` instead of pretending to answer.
    pub fn from_env() -> Self {
        let endpoint = std::env::var("GEMINI_ENDPOINT")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string());
        let model = std::env::var("GEMINI_MODEL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Self::new(endpoint, model, api_key)
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| GenerationError("GEMINI_API_KEY is not set".to_string()))?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key.as_str())])
            .json(&json!({
                "contents": [ { "parts": [ { "text": prompt } ] } ]
            }))
            .send()
            .await
            .map_err(|error| GenerationError(error.to_string()))?;

        if !response.status().is_success() {
            return Err(GenerationError(format!(
                "generation endpoint returned {}",
                response.status()
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|error| GenerationError(error.to_string()))?;

        extract_answer_text(&parsed)
            .ok_or_else(|| GenerationError("generation response had no text".to_string()))
    }
}

fn extract_answer_text(payload: &Value) -> Option<String> {
    let parts = payload
        .pointer("/candidates/0/content/parts")?
        .as_array()?;

    let text = parts
        .iter()
        .filter_map(|part| part.pointer("/text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

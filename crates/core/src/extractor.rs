use crate::error::{ExtractionAttempt, IngestError};
use crate::models::PipelineOptions;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::content::Content;
use lopdf::{Document, Object};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Normalize extracted text: trim trailing whitespace per line, collapse
/// runs of 3+ newlines to exactly 2, strip NUL and the Unicode replacement
/// character, trim outer whitespace.
pub fn clean_text(text: &str) -> String {
    let mut joined = text
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    while joined.contains("\n\n\n") {
        joined = joined.replace("\n\n\n", "\n\n");
    }

    joined
        .replace('\u{0}', "")
        .replace('\u{fffd}', "")
        .trim()
        .to_string()
}

/// Byte values with no assigned character in Windows-1252. The WHATWG
/// index behind `encoding_rs` maps them to C1 controls instead of
/// reporting an error, so they must be rejected up front.
const WINDOWS_1252_UNMAPPED: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];

/// Decode a plain-text-family file, accepting the first encoding in the
/// ordered list that decodes without error.
pub fn decode_plain_text(bytes: &[u8]) -> Result<String, IngestError> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }

    if !bytes.iter().any(|byte| WINDOWS_1252_UNMAPPED.contains(byte)) {
        let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
        if !had_errors {
            return Ok(decoded.into_owned());
        }
    }

    Err(IngestError::UndecodableText {
        tried: "utf-8, windows-1252".to_string(),
    })
}

/// One PDF extraction strategy: pure bytes-to-text, independently testable.
pub trait PdfStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, bytes: &[u8]) -> Result<String, IngestError>;
}

/// Strategy 1: direct per-page text extraction.
#[derive(Default)]
pub struct PageTextStrategy;

impl PdfStrategy for PageTextStrategy {
    fn name(&self) -> &'static str {
        "pdf-text"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut text = String::new();
        for (page_no, _page_id) in document.get_pages() {
            let page_text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            if !page_text.trim().is_empty() {
                text.push_str(&format!("\n\n--- Page {page_no} ---\n\n"));
                text.push_str(&page_text);
            }
        }

        Ok(text)
    }
}

/// Strategy 2: layout-aware extraction. Walks the content streams directly,
/// groups text runs into rows by vertical position, and linearizes rows with
/// several cells as pipe-delimited columns so tables survive as text.
#[derive(Default)]
pub struct LayoutStrategy;

struct TextRun {
    y: f64,
    x: f64,
    text: String,
}

impl PdfStrategy for LayoutStrategy {
    fn name(&self) -> &'static str {
        "pdf-layout"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut text = String::new();
        for (page_no, page_id) in document.get_pages() {
            let content = document
                .get_page_content(page_id)
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;
            let operations = Content::decode(&content)
                .map_err(|error| IngestError::PdfParse(error.to_string()))?
                .operations;

            let runs = collect_text_runs(&operations);
            let page_text = linearize_rows(runs);

            if !page_text.trim().is_empty() {
                text.push_str(&format!("\n\n--- Page {page_no} ---\n\n"));
                text.push_str(&page_text);
            }
        }

        Ok(text)
    }
}

fn as_number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(*value as f64),
        _ => None,
    }
}

/// PDF strings carry their own encodings; decode defensively without font
/// cmaps: UTF-16BE when BOM-prefixed, UTF-8 when valid, Latin-1 otherwise.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&byte| byte as char).collect(),
    }
}

fn collect_text_runs(operations: &[lopdf::content::Operation]) -> Vec<TextRun> {
    // Nominal line advance for T* when no leading was observed.
    const DEFAULT_LEADING: f64 = 12.0;

    let mut runs = Vec::new();
    let mut cursor_x = 0f64;
    let mut cursor_y = 0f64;
    let mut leading = DEFAULT_LEADING;

    for operation in operations {
        match operation.operator.as_str() {
            "BT" => {
                cursor_x = 0.0;
                cursor_y = 0.0;
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (
                    operation.operands.first().and_then(as_number),
                    operation.operands.get(1).and_then(as_number),
                ) {
                    cursor_x += tx;
                    cursor_y += ty;
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (
                    operation.operands.first().and_then(as_number),
                    operation.operands.get(1).and_then(as_number),
                ) {
                    cursor_x += tx;
                    cursor_y += ty;
                    leading = -ty;
                }
            }
            "Tm" => {
                if let (Some(e), Some(f)) = (
                    operation.operands.get(4).and_then(as_number),
                    operation.operands.get(5).and_then(as_number),
                ) {
                    cursor_x = e;
                    cursor_y = f;
                }
            }
            "TL" => {
                if let Some(value) = operation.operands.first().and_then(as_number) {
                    leading = value;
                }
            }
            "T*" => {
                cursor_y -= leading;
                cursor_x = 0.0;
            }
            "Tj" | "'" => {
                if let Some(Object::String(bytes, _)) = operation.operands.first() {
                    let decoded = decode_pdf_string(bytes);
                    if !decoded.trim().is_empty() {
                        runs.push(TextRun {
                            y: cursor_y,
                            x: cursor_x,
                            text: decoded,
                        });
                    }
                }
            }
            "TJ" => {
                if let Some(Object::Array(parts)) = operation.operands.first() {
                    let mut combined = String::new();
                    for part in parts {
                        if let Object::String(bytes, _) = part {
                            combined.push_str(&decode_pdf_string(bytes));
                        }
                    }
                    if !combined.trim().is_empty() {
                        runs.push(TextRun {
                            y: cursor_y,
                            x: cursor_x,
                            text: combined,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    runs
}

/// Sort runs top-to-bottom, left-to-right, and join runs sharing a baseline
/// into one row. Rows with multiple cells become pipe-delimited columns.
fn linearize_rows(mut runs: Vec<TextRun>) -> String {
    const ROW_TOLERANCE: f64 = 2.0;

    runs.sort_by(|left, right| {
        right
            .y
            .total_cmp(&left.y)
            .then_with(|| left.x.total_cmp(&right.x))
    });

    let mut lines: Vec<String> = Vec::new();
    let mut row: Vec<&TextRun> = Vec::new();
    let mut row_y = f64::INFINITY;

    for run in &runs {
        if row.is_empty() || (row_y - run.y).abs() <= ROW_TOLERANCE {
            if row.is_empty() {
                row_y = run.y;
            }
            row.push(run);
            continue;
        }

        lines.push(join_row(&row));
        row_y = run.y;
        row = vec![run];
    }

    if !row.is_empty() {
        lines.push(join_row(&row));
    }

    lines.join("\n")
}

fn join_row(row: &[&TextRun]) -> String {
    if row.len() >= 2 {
        row.iter()
            .map(|run| run.text.trim())
            .collect::<Vec<_>>()
            .join(" | ")
    } else {
        row.iter()
            .map(|run| run.text.as_str())
            .collect::<Vec<_>>()
            .concat()
    }
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl OcrEndpointConfig {
    /// Read `LLM_OCR_ENDPOINT` / `LLM_OCR_API_KEY`. Returns `None` when no
    /// endpoint is configured, which downgrades OCR to a recorded failed
    /// attempt instead of a hard error.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("LLM_OCR_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = std::env::var("LLM_OCR_API_KEY").ok().and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        Some(Self { endpoint, api_key })
    }
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest {
    pdf_base64: String,
    max_pages: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    pages: Option<Vec<OcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrPage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

/// Strategy 3: optical character recognition through a multimodal OCR
/// endpoint, bounded to the first `max_pages` pages to bound latency.
pub struct OcrStrategy {
    config: Option<OcrEndpointConfig>,
    max_pages: usize,
}

impl OcrStrategy {
    pub fn new(config: Option<OcrEndpointConfig>, max_pages: usize) -> Self {
        Self { config, max_pages }
    }

    fn request(&self, config: &OcrEndpointConfig, bytes: &[u8]) -> Result<String, IngestError> {
        let payload = OcrRequest {
            pdf_base64: STANDARD.encode(bytes),
            max_pages: self.max_pages,
        };

        let mut request = Client::new()
            .post(&config.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(IngestError::OcrFailed(format!(
                "ocr request to {} returned {}",
                config.endpoint,
                response.status()
            )));
        }

        let payload: OcrResponse = response.json()?;
        let text = ocr_payload_to_text(&payload, self.max_pages);

        if text.trim().is_empty() {
            return Err(IngestError::OcrFailed(
                "ocr response had no readable text".to_string(),
            ));
        }

        Ok(text)
    }
}

impl PdfStrategy for OcrStrategy {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, IngestError> {
        let Some(config) = self.config.clone() else {
            return Err(IngestError::OcrFailed(
                "no ocr endpoint configured".to_string(),
            ));
        };

        // The blocking HTTP client must not stall the async runtime.
        tokio::task::block_in_place(|| self.request(&config, bytes))
    }
}

/// Flatten an OCR payload, keeping at most the first `max_pages` pages.
/// Content beyond the cap is dropped; the caller sees the cap in the logs.
fn ocr_payload_to_text(payload: &OcrResponse, max_pages: usize) -> String {
    if let Some(listed) = &payload.pages {
        let mut text = String::new();
        let mut kept = 0usize;

        for page in listed {
            if kept >= max_pages {
                break;
            }
            if let Some(page_text) = page.text.as_ref().map(|value| value.trim()) {
                if !page_text.is_empty() {
                    let number = page.page.unwrap_or((kept + 1) as u32);
                    text.push_str(&format!("\n\n--- Page {number} (OCR) ---\n\n"));
                    text.push_str(page_text);
                    kept += 1;
                }
            }
        }

        if !text.is_empty() {
            return text;
        }
    }

    if let Some(raw_text) = &payload.text {
        return raw_text
            .split('\u{000c}')
            .take(max_pages)
            .enumerate()
            .filter(|(_, chunk)| !chunk.trim().is_empty())
            .map(|(index, chunk)| {
                format!("\n\n--- Page {} (OCR) ---\n\n{}", index + 1, chunk.trim())
            })
            .collect();
    }

    String::new()
}

/// Ordered extraction waterfall with quality gating: the first strategy
/// whose cleaned output clears the acceptance threshold wins; every
/// insufficient or failed attempt is recorded for diagnosis.
pub struct ExtractorChain {
    strategies: Vec<Box<dyn PdfStrategy>>,
    accept_chars: usize,
}

impl ExtractorChain {
    pub fn new(strategies: Vec<Box<dyn PdfStrategy>>, accept_chars: usize) -> Self {
        Self {
            strategies,
            accept_chars,
        }
    }

    /// The standard chain: per-page text, then layout/table-aware
    /// extraction, then page-capped OCR.
    pub fn standard(options: &PipelineOptions) -> Self {
        Self::new(
            vec![
                Box::new(PageTextStrategy),
                Box::new(LayoutStrategy),
                Box::new(OcrStrategy::new(
                    OcrEndpointConfig::from_env(),
                    options.ocr_max_pages,
                )),
            ],
            options.accept_chars,
        )
    }

    pub fn extract(&self, bytes: &[u8]) -> Result<String, IngestError> {
        let mut attempts = Vec::new();

        for strategy in &self.strategies {
            match strategy.extract(bytes) {
                Ok(raw) => {
                    let cleaned = clean_text(&raw);
                    let chars = cleaned.chars().count();

                    if chars > self.accept_chars {
                        info!(method = strategy.name(), chars, "extraction accepted");
                        return Ok(cleaned);
                    }

                    warn!(
                        method = strategy.name(),
                        chars,
                        threshold = self.accept_chars,
                        "insufficient text, trying next strategy"
                    );
                    attempts.push(ExtractionAttempt {
                        method: strategy.name(),
                        chars,
                    });
                }
                Err(error) => {
                    warn!(method = strategy.name(), %error, "extraction strategy failed");
                    attempts.push(ExtractionAttempt {
                        method: strategy.name(),
                        chars: 0,
                    });
                }
            }
        }

        Err(IngestError::AllExtractionMethodsFailed { attempts })
    }
}

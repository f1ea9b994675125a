use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::Annotation;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";

const DETECT_PROMPT: &str = "Identify all distinct text segments in this image. \
    Translate English segments into Simplified Chinese. If a segment is purely \
    numbers (e.g. '2024', '10.5') or symbols, keep the translation identical to \
    the original. Return the result as a JSON list with bounding boxes (0-1000 scale).";

const SYSTEM_INSTRUCTION: &str = "You are an expert OCR and translation assistant. \
    Your goal is to accurately detect text and provide translations. Do not \
    translate numbers, currency symbols, or mathematical notation; keep them \
    exactly as they appear in the original.";

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl GeminiConfig {
    /// `GEMINI_API_KEY` is optional: a proxy set via `GEMINI_BASE_URL` may
    /// inject its own credentials.
    pub fn from_env() -> Self {
        Self {
            base_url: env_or("GEMINI_BASE_URL", DEFAULT_BASE_URL),
            model: env_or("GEMINI_MODEL", DEFAULT_MODEL),
            api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Result of an edit-with-prompt exchange: the model returns either an
/// image or, failing that, plain text.
#[derive(Clone, Debug)]
pub enum EditOutcome {
    Image(Vec<u8>),
    Text(String),
}

/// Detect and translate text regions in the image.
pub fn translate_image(cfg: &GeminiConfig, image: &[u8], mime: &str) -> Result<Vec<Annotation>> {
    let body = json!({
        "contents": [{
            "parts": [
                inline_data_part(image, mime),
                { "text": DETECT_PROMPT }
            ]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "original": { "type": "string" },
                        "translation": { "type": "string" },
                        "box_2d": { "type": "array", "items": { "type": "integer" } }
                    },
                    "required": ["original", "translation", "box_2d"]
                }
            }
        },
        "systemInstruction": {
            "parts": [{ "text": SYSTEM_INSTRUCTION }]
        }
    });

    tracing::info!(model = %cfg.model, bytes = image.len(), "requesting translation");
    let response = call(cfg, &body)?;
    annotations_from_response(response)
}

/// Apply a free-form edit prompt to the image.
pub fn edit_image(
    cfg: &GeminiConfig,
    image: &[u8],
    mime: &str,
    prompt: &str,
) -> Result<EditOutcome> {
    let body = json!({
        "contents": [{
            "parts": [
                inline_data_part(image, mime),
                { "text": prompt }
            ]
        }]
    });

    tracing::info!(model = %cfg.model, bytes = image.len(), "requesting image edit");
    let response = call(cfg, &body)?;
    edit_outcome_from_response(response)
}

fn inline_data_part(image: &[u8], mime: &str) -> Value {
    json!({
        "inlineData": {
            "mimeType": mime,
            "data": BASE64.encode(image)
        }
    })
}

fn call(cfg: &GeminiConfig, body: &Value) -> Result<GenerateResponse> {
    let client = reqwest::blocking::Client::new();
    let mut request = client.post(cfg.endpoint()).json(body);
    if let Some(key) = &cfg.api_key {
        request = request.header("x-goog-api-key", key);
    }
    let response = request.send().context("request to Gemini failed")?;

    let status = response.status();
    let text = response.text().unwrap_or_default();
    if !status.is_success() {
        tracing::warn!(%status, "Gemini request rejected");
        return Err(anyhow!(
            "Gemini API error ({}): {}",
            status,
            extract_api_error(&text).unwrap_or(text)
        ));
    }
    parse_response(&text)
}

fn parse_response(text: &str) -> Result<GenerateResponse> {
    serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Gemini response JSON: {}", err))
}

fn annotations_from_response(response: GenerateResponse) -> Result<Vec<Annotation>> {
    let Some(text) = response.first_text() else {
        tracing::warn!("translate response carried no text part");
        return Ok(Vec::new());
    };
    serde_json::from_str(text).context("malformed annotation list in Gemini response")
}

fn edit_outcome_from_response(response: GenerateResponse) -> Result<EditOutcome> {
    let parts = response.first_candidate_parts();

    // Prefer a returned image; fall back to the first text part.
    for part in parts {
        if let Some(data) = &part.inline_data {
            let decoded = BASE64
                .decode(&data.data)
                .context("invalid base64 image in edit response")?;
            return Ok(EditOutcome::Image(decoded));
        }
    }
    let text = parts
        .iter()
        .find_map(|part| part.text.clone())
        .unwrap_or_else(|| "No response content".to_string());
    Ok(EditOutcome::Text(text))
}

fn extract_api_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ApiError>,
    }

    #[derive(Deserialize)]
    struct ApiError {
        message: Option<String>,
        status: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message.filter(|m| !m.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(status) = error.status.filter(|s| !s.trim().is_empty()) {
        parts.push(format!("status: {}", status));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    fn first_candidate_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.as_slice())
            .unwrap_or(&[])
    }

    fn first_text(&self) -> Option<&str> {
        self.first_candidate_parts()
            .iter()
            .find_map(|part| part.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(rename = "inlineData", alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

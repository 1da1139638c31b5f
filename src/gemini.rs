//! Remote digitization over the Gemini `generateContent` endpoint.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::{config::Config, encoder::EncodedPayload, DigitizerError, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// One-shot call to an image model: photo + instructions in, base64 image out.
#[async_trait]
pub trait DigitizationClient: Send + Sync {
    async fn generate_blueprint(&self, payload: &EncodedPayload, prompt: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    pub fn endpoint(&self) -> String {
        let model = self.model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

/// Image part first, then the instructions; asks for image and text back.
pub fn build_request_body(payload: &EncodedPayload, prompt: &str) -> Value {
    json!({
        "contents": [{
            "parts": [
                {
                    "inlineData": {
                        "mimeType": payload.media_type,
                        "data": payload.data
                    }
                },
                {
                    "text": prompt
                }
            ]
        }],
        "generationConfig": {
            "responseModalities": ["IMAGE", "TEXT"]
        }
    })
}

/// Walks every candidate's parts in order and returns the first non-empty
/// inline image payload. Accepts both camelCase and snake_case keys.
pub fn first_inline_image(response: &Value) -> Option<&str> {
    let candidates = response.get("candidates")?.as_array()?;
    candidates
        .iter()
        .filter_map(|candidate| {
            candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
        })
        .flatten()
        .filter_map(|part| part.get("inlineData").or_else(|| part.get("inline_data")))
        .filter_map(|inline| inline.get("data").and_then(Value::as_str))
        .find(|data| !data.is_empty())
}

fn check_request(payload: &EncodedPayload, prompt: &str) -> Result<()> {
    if payload.data.is_empty() {
        return Err(DigitizerError::Validation("Image data is empty.".into()));
    }
    if payload.media_type.trim().is_empty() {
        return Err(DigitizerError::Validation("Image media type is missing.".into()));
    }
    if prompt.trim().is_empty() {
        return Err(DigitizerError::Validation("Instruction text is empty.".into()));
    }
    Ok(())
}

#[async_trait]
impl DigitizationClient for GeminiClient {
    async fn generate_blueprint(&self, payload: &EncodedPayload, prompt: &str) -> Result<String> {
        check_request(payload, prompt)?;

        let endpoint = self.endpoint();
        let body = build_request_body(payload, prompt);

        info!(
            model = %self.model,
            media_type = %payload.media_type,
            encoded_len = payload.data.len(),
            "sending digitize request to Gemini"
        );

        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                let err = err.without_url();
                error!(error = %err, "Gemini request failed");
                DigitizerError::remote(format!("request to {endpoint} failed: {err}"))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|err| {
            let err = err.without_url();
            error!(error = %err, "failed to read Gemini response body");
            DigitizerError::remote(format!("reading response body failed: {err}"))
        })?;

        if !status.is_success() {
            let snippet: String = text.chars().take(500).collect();
            error!(%status, body = %snippet, "Gemini returned an error status");
            return Err(DigitizerError::remote(format!("API error {status}: {snippet}")));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|err| {
            error!(error = %err, "Gemini response is not JSON");
            DigitizerError::remote(format!("unparsable response: {err}"))
        })?;

        match first_inline_image(&parsed) {
            Some(data) => {
                info!(encoded_len = data.len(), "Gemini returned an image");
                Ok(data.to_string())
            }
            None => {
                warn!("Gemini response carried no inline image");
                Err(DigitizerError::NoImageReturned)
            }
        }
    }
}

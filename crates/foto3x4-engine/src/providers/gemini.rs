use std::env;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use foto3x4_contracts::images::{BackgroundRequest, EncodedImage};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use super::{background_prompt, BackgroundGenerator, GenerationOutput};
use crate::codec::probe;
use crate::config::{DEFAULT_GEMINI_MODEL, DEFAULT_REQUEST_TIMEOUT_S};
use crate::error::GenerationError;
use crate::{map_object, non_empty_env, truncate_text};

const PROVIDER: &str = "gemini";
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];
const ASPECT_RATIO: &str = "3:4";

/// Background replacement through the Gemini `generateContent` endpoint.
pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
    model: String,
    timeout: Duration,
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new(
            DEFAULT_GEMINI_MODEL,
            Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_S),
        )
    }
}

impl GeminiProvider {
    pub fn new(model: &str, timeout: Duration) -> Self {
        Self {
            api_base: env::var("GEMINI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key: Self::api_key_from(non_empty_env),
            http: HttpClient::new(),
            model: model.trim().to_string(),
            timeout,
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    fn api_key_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        API_KEY_VARS.iter().find_map(|name| lookup(name))
    }

    fn endpoint(&self) -> String {
        let model_path = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(image: &EncodedImage, prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": image.mime_type(),
                            "data": BASE64.encode(image.bytes()),
                        }
                    },
                    { "text": prompt },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": ASPECT_RATIO },
            },
        })
    }

    /// Map a non-2xx answer to the failure the user should see.
    fn classify_status(status: u16, body: &str) -> GenerationError {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|parsed| {
                parsed
                    .get("error")
                    .and_then(|error| error.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| truncate_text(body.trim(), 512));
        let provider = PROVIDER.to_string();
        match status {
            401 | 403 => GenerationError::Auth {
                provider,
                status,
                message,
            },
            400 => GenerationError::Rejected { provider, message },
            _ => GenerationError::Service {
                provider,
                status,
                message,
            },
        }
    }

    fn unexpected(message: impl Into<String>) -> GenerationError {
        GenerationError::UnexpectedResponse {
            provider: PROVIDER.to_string(),
            message: message.into(),
        }
    }

    /// First inline image of the response; block reasons become `Rejected`.
    fn extract_image(response: &Value) -> Result<EncodedImage, GenerationError> {
        let candidates = response
            .get("candidates")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for part in parts {
                let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                else {
                    continue;
                };
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let bytes = BASE64
                    .decode(data.as_bytes())
                    .map_err(|err| Self::unexpected(format!("image base64 decode failed: {err}")))?;
                return probe(bytes).map_err(|err| Self::unexpected(err.to_string()));
            }
        }

        if let Some(reason) = response
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            return Err(GenerationError::Rejected {
                provider: PROVIDER.to_string(),
                message: format!("prompt blocked ({reason})"),
            });
        }
        if let Some(reason) = candidates
            .iter()
            .filter_map(|candidate| candidate.get("finishReason").and_then(Value::as_str))
            .find(|reason| *reason != "STOP")
        {
            return Err(GenerationError::Rejected {
                provider: PROVIDER.to_string(),
                message: format!("generation stopped ({reason})"),
            });
        }

        let text = candidates
            .iter()
            .filter_map(|candidate| candidate.get("content")?.get("parts")?.as_array())
            .flatten()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        if text.trim().is_empty() {
            Err(Self::unexpected("response contained no image"))
        } else {
            Err(Self::unexpected(format!(
                "response contained no image: {}",
                truncate_text(text.trim(), 200)
            )))
        }
    }

    fn response_summary(response: &Value) -> Map<String, Value> {
        map_object(json!({
            "candidates": response
                .get("candidates")
                .and_then(Value::as_array)
                .map(|rows| rows.len())
                .unwrap_or(0),
            "finish_reasons": response
                .get("candidates")
                .and_then(Value::as_array)
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| row.get("finishReason").cloned())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
            "usage_metadata": response.get("usageMetadata").cloned().unwrap_or(Value::Null),
            "model_version": response.get("modelVersion").cloned().unwrap_or(Value::Null),
        }))
    }
}

impl BackgroundGenerator for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn generate(
        &self,
        image: &EncodedImage,
        background: BackgroundRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GenerationError::MissingCredentials {
                provider: PROVIDER.to_string(),
                hint: API_KEY_VARS.join(" or "),
            });
        };

        let endpoint = self.endpoint();
        let prompt = background_prompt(background);
        let payload = Self::build_payload(image, &prompt);

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .map_err(|err| GenerationError::Transport {
                provider: PROVIDER.to_string(),
                message: if err.is_timeout() {
                    format!("timed out after {}s", self.timeout.as_secs())
                } else {
                    err.to_string()
                },
            })?;

        let status = response.status();
        let body = response.text().map_err(|err| GenerationError::Transport {
            provider: PROVIDER.to_string(),
            message: format!("response body read failed: {err}"),
        })?;
        if !status.is_success() {
            return Err(Self::classify_status(status.as_u16(), &body));
        }
        let parsed: Value = serde_json::from_str(&body)
            .map_err(|err| Self::unexpected(format!("invalid JSON payload: {err}")))?;
        let generated = Self::extract_image(&parsed)?;

        Ok(GenerationOutput {
            image: generated,
            prompt,
            model: Some(self.model.clone()),
            provider_request: map_object(json!({
                "endpoint": endpoint,
                "payload": payload,
            })),
            provider_response: Self::response_summary(&parsed),
            warnings: Vec::new(),
        })
    }
}

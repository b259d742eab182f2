//! Gemini provider adapter (generateContent API).

use std::future::Future;
use std::pin::Pin;

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::sse::SseStream;
use super::types::{GenerationRequest, GenerationResponse, Provider};
use super::{AdapterError, DeltaStream, ModelAdapter, build_prompt};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

/// Response and stream chunks share this shape; a chunk just carries a
/// partial candidate.
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateContentResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct GeminiAdapter {
    http: Client,
}

impl GeminiAdapter {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    fn convert_request(req: &GenerationRequest) -> GenerateContentRequest {
        let opts = req.options_or_default();
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(build_prompt(req)),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: opts.temperature_or_default(),
                max_output_tokens: opts.max_tokens_or_default(),
            },
        }
    }

    async fn send(&self, url: String, body: &GenerateContentRequest, api_key: &str)
    -> Result<reqwest::Response, AdapterError> {
        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AdapterError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }
}

impl ModelAdapter for GeminiAdapter {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn generate(
        &self,
        req: &GenerationRequest,
        api_key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<GenerationResponse, AdapterError>> + Send + '_>> {
        let req = req.clone();
        let api_key = api_key.to_string();
        Box::pin(async move {
            if api_key.is_empty() {
                return Err(AdapterError::MissingKey(Provider::Gemini));
            }
            let body = Self::convert_request(&req);
            let url = format!("{API_BASE}/models/{}:generateContent", req.model);
            let resp = self.send(url, &body, &api_key).await?;

            let api_resp: GenerateContentResponse = resp
                .json()
                .await
                .map_err(|e| AdapterError::Malformed(e.to_string()))?;

            Ok(GenerationResponse {
                id: Uuid::new_v4().to_string(),
                text: api_resp.text(),
                model: req.model,
                provider: Provider::Gemini,
            })
        })
    }

    fn generate_stream(
        &self,
        req: &GenerationRequest,
        api_key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream, AdapterError>> + Send + '_>> {
        let req = req.clone();
        let api_key = api_key.to_string();
        Box::pin(async move {
            if api_key.is_empty() {
                return Err(AdapterError::MissingKey(Provider::Gemini));
            }
            let body = Self::convert_request(&req);
            let url = format!(
                "{API_BASE}/models/{}:streamGenerateContent?alt=sse",
                req.model
            );
            let resp = self.send(url, &body, &api_key).await?;

            let deltas = SseStream::new(resp.bytes_stream()).filter_map(|event| async move {
                match event {
                    Ok(event) => {
                        match serde_json::from_str::<GenerateContentResponse>(&event.data) {
                            Ok(chunk) => {
                                let text = chunk.text();
                                if text.is_empty() { None } else { Some(Ok(text)) }
                            }
                            Err(e) => {
                                debug!(raw = %event.data, error = %e, "Skipping unparseable chunk");
                                None
                            }
                        }
                    }
                    Err(e) => Some(Err(AdapterError::Stream(e.to_string()))),
                }
            });

            Ok(Box::pin(deltas) as DeltaStream)
        })
    }
}

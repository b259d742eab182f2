//! Anthropic provider adapter (Messages API).

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

const API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: StreamDelta },
    #[serde(rename = "error")]
    Error { error: StreamError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct AnthropicAdapter {
    http: Client,
}

impl AnthropicAdapter {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    fn convert_request(req: &GenerationRequest, stream: bool) -> MessagesRequest {
        let opts = req.options_or_default();
        MessagesRequest {
            model: req.model.clone(),
            messages: vec![Message {
                role: "user",
                content: build_prompt(req),
            }],
            max_tokens: opts.max_tokens_or_default(),
            temperature: opts.temperature_or_default(),
            stream,
        }
    }

    async fn send(
        &self,
        body: &MessagesRequest,
        api_key: &str,
    ) -> Result<reqwest::Response, AdapterError> {
        let resp = self
            .http
            .post(format!("{API_BASE}/messages"))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
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

impl ModelAdapter for AnthropicAdapter {
    fn provider(&self) -> Provider {
        Provider::Anthropic
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
                return Err(AdapterError::MissingKey(Provider::Anthropic));
            }
            let body = Self::convert_request(&req, false);
            let resp = self.send(&body, &api_key).await?;

            let api_resp: MessagesResponse = resp
                .json()
                .await
                .map_err(|e| AdapterError::Malformed(e.to_string()))?;
            let text: String = api_resp
                .content
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text),
                    ContentBlock::Other => None,
                })
                .collect();

            Ok(GenerationResponse {
                id: Uuid::new_v4().to_string(),
                text,
                model: req.model,
                provider: Provider::Anthropic,
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
                return Err(AdapterError::MissingKey(Provider::Anthropic));
            }
            let body = Self::convert_request(&req, true);
            let resp = self.send(&body, &api_key).await?;

            let deltas = SseStream::new(resp.bytes_stream()).filter_map(|event| async move {
                match event {
                    Ok(event) => match serde_json::from_str::<StreamEvent>(&event.data) {
                        Ok(StreamEvent::ContentBlockDelta {
                            delta: StreamDelta::TextDelta { text },
                        }) if !text.is_empty() => Some(Ok(text)),
                        Ok(StreamEvent::Error { error }) => {
                            Some(Err(AdapterError::Stream(error.message)))
                        }
                        Ok(_) => None,
                        Err(e) => {
                            debug!(raw = %event.data, error = %e, "Skipping unparseable event");
                            None
                        }
                    },
                    Err(e) => Some(Err(AdapterError::Stream(e.to_string()))),
                }
            });

            Ok(Box::pin(deltas) as DeltaStream)
        })
    }
}

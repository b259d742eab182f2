//! OpenAI provider adapter (Chat Completions API).

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

const API_BASE: &str = "https://api.openai.com/v1";
const SYSTEM_PROMPT: &str = "You write concise, context-aware replies.";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct OpenAiAdapter {
    http: Client,
}

impl OpenAiAdapter {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    fn convert_request(req: &GenerationRequest, stream: bool) -> ChatRequest {
        let opts = req.options_or_default();
        ChatRequest {
            model: req.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(req),
                },
            ],
            temperature: opts.temperature_or_default(),
            max_tokens: opts.max_tokens_or_default(),
            stream,
        }
    }

    async fn send(
        &self,
        body: &ChatRequest,
        api_key: &str,
    ) -> Result<reqwest::Response, AdapterError> {
        let resp = self
            .http
            .post(format!("{API_BASE}/chat/completions"))
            .bearer_auth(api_key)
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

impl ModelAdapter for OpenAiAdapter {
    fn provider(&self) -> Provider {
        Provider::OpenAi
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
                return Err(AdapterError::MissingKey(Provider::OpenAi));
            }
            let body = Self::convert_request(&req, false);
            let resp = self.send(&body, &api_key).await?;

            let api_resp: ChatResponse = resp
                .json()
                .await
                .map_err(|e| AdapterError::Malformed(e.to_string()))?;
            let text = api_resp
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();

            Ok(GenerationResponse {
                id: Uuid::new_v4().to_string(),
                text,
                model: req.model,
                provider: Provider::OpenAi,
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
                return Err(AdapterError::MissingKey(Provider::OpenAi));
            }
            let body = Self::convert_request(&req, true);
            let resp = self.send(&body, &api_key).await?;

            let deltas = SseStream::new(resp.bytes_stream())
                .take_while(|event| {
                    let done = matches!(event, Ok(e) if e.data.trim() == "[DONE]");
                    futures::future::ready(!done)
                })
                .filter_map(|event| async move {
                    match event {
                        Ok(event) => match serde_json::from_str::<ChatChunk>(&event.data) {
                            Ok(chunk) => chunk
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content)
                                .filter(|s| !s.is_empty())
                                .map(Ok),
                            Err(e) => {
                                debug!(raw = %event.data, error = %e, "Skipping unparseable chunk");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::GenerationOptions;

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "gpt-4o-mini".into(),
            provider: Provider::OpenAi,
            prompt: "write a reply".into(),
            context: None,
            options: Some(GenerationOptions {
                tone: None,
                max_tokens: Some(100),
                temperature: Some(0.2),
            }),
            use_user_key: true,
            stream: false,
        }
    }

    #[test]
    fn test_convert_request_shape() {
        let body = OpenAiAdapter::convert_request(&request(), false);
        assert_eq!(body.model, "gpt-4o-mini");
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[0].content, SYSTEM_PROMPT);
        assert_eq!(body.messages[1].content, "write a reply");
        assert_eq!(body.max_tokens, 100);
        assert_eq!(body.temperature, 0.2);
        assert!(!body.stream);
    }

    #[test]
    fn test_convert_request_defaults() {
        let mut req = request();
        req.options = None;
        let body = OpenAiAdapter::convert_request(&req, true);
        assert_eq!(body.max_tokens, 512);
        assert_eq!(body.temperature, 0.7);
        assert!(body.stream);
    }

    #[tokio::test]
    async fn test_empty_key_is_fatal() {
        let adapter = OpenAiAdapter::new(Client::new());
        let err = adapter.generate(&request(), "").await.unwrap_err();
        assert!(matches!(err, AdapterError::MissingKey(Provider::OpenAi)));

        let err = adapter.generate_stream(&request(), "").await.err().unwrap();
        assert!(matches!(err, AdapterError::MissingKey(Provider::OpenAi)));
    }
}

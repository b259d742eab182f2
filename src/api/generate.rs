//! The generation endpoint: blocking JSON or SSE streaming depending on the
//! request's `stream` flag.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures::StreamExt;

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::generate::stream::StreamEvent;
use crate::providers::GenerationRequest;

pub async fn generate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<GenerationRequest>,
) -> Result<Response, AppError> {
    if req.prompt.trim().is_empty() {
        return Err(AppError::BadRequest("prompt must not be empty".into()));
    }

    if req.stream {
        let deltas = state.orchestrator.generate_stream(&user.id, &req).await?;
        let events = deltas.map(|event| {
            Ok::<_, Infallible>(match event {
                StreamEvent::Delta(text) => {
                    Event::default().data(serde_json::json!({ "delta": text }).to_string())
                }
                StreamEvent::Error(message) => Event::default()
                    .event("error")
                    .data(serde_json::json!({ "error": message }).to_string()),
                StreamEvent::Done => Event::default().data("[DONE]"),
            })
        });
        Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response())
    } else {
        let response = state.orchestrator.generate(&user.id, &req).await?;
        Ok(Json(response).into_response())
    }
}

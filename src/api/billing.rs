//! Billing webhook: plan-change events from the payment processor.
//!
//! The event addresses the user by their first-class id. Processor-side
//! subscription state is the processor's business; the backend's only
//! obligation is updating the plan tag.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::users;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub user_id: String,
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub updated: bool,
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<WebhookResponse>, AppError> {
    let Some(expected) = state.config.billing.webhook_secret.as_deref() else {
        return Err(AppError::Unauthorized("billing webhook not configured".into()));
    };
    let provided = headers
        .get("x-webhook-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided != expected {
        return Err(AppError::Unauthorized("bad webhook secret".into()));
    }

    if event.plan.trim().is_empty() {
        return Err(AppError::BadRequest("plan must not be empty".into()));
    }

    let updated = users::update_plan(&state.db, &event.user_id, event.plan.trim())?;
    if !updated {
        return Err(AppError::NotFound(format!("user {}", event.user_id)));
    }

    tracing::info!(user_id = %event.user_id, plan = %event.plan, "Plan updated via webhook");
    Ok(Json(WebhookResponse { updated }))
}

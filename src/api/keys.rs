//! Provider key management endpoints. Plaintext keys go in, metadata comes
//! out; neither plaintext nor ciphertext is ever returned.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::keys;
use crate::providers::Provider;

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub provider: Provider,
    pub api_key: String,
}

pub async fn create_key(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateKeyRequest>,
) -> Result<Json<keys::CredentialSummary>, AppError> {
    if body.api_key.trim().is_empty() {
        return Err(AppError::BadRequest("api_key must not be empty".into()));
    }

    let summary = keys::create_key(
        &state.db,
        &state.cipher,
        &user.id,
        body.provider,
        body.api_key.trim(),
    )?;
    tracing::info!(user_id = %user.id, provider = %body.provider, "Provider key stored");
    Ok(Json(summary))
}

pub async fn list_keys(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<keys::CredentialSummary>>, AppError> {
    Ok(Json(keys::list_keys(&state.db, &user.id)?))
}

pub async fn delete_key(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(key_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if keys::delete_key(&state.db, &user.id, &key_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("key {key_id}")))
    }
}

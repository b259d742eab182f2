//! Request history endpoint.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::generate::records::{self, RequestRecord};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub requests: Vec<RequestRecord>,
    pub total: u64,
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let requests = records::list_for_user(&state.db, &user.id, limit)?;
    let total = records::count_for_user(&state.db, &user.id)?;
    Ok(Json(ListResponse { requests, total }))
}

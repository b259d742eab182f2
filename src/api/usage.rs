//! Monthly usage reporting against the caller's plan quota.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::{Datelike, Utc};
use serde::Serialize;

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::generate::records;
use crate::plans;

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub plan: String,
    pub period_start: String,
    pub tokens_used: u64,
    pub token_quota: u64,
    pub tokens_remaining: u64,
}

pub async fn usage(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UsageResponse>, AppError> {
    let now = Utc::now();
    // Matches SQLite's datetime('now') column format.
    let period_start = format!("{:04}-{:02}-01 00:00:00", now.year(), now.month());

    let tokens_used = records::tokens_used_since(&state.db, &user.id, &period_start)?;
    let token_quota = plans::token_quota(&state.db, &user.plan)?;

    Ok(Json(UsageResponse {
        plan: user.plan,
        period_start,
        tokens_used,
        token_quota,
        tokens_remaining: token_quota.saturating_sub(tokens_used),
    }))
}

//! Signup, login, and the current-user endpoint.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::auth::{passwords, tokens, users};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub plan: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let email = body.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("invalid email address".into()));
    }
    if body.password.len() < 8 {
        return Err(AppError::BadRequest(
            "password must be at least 8 characters".into(),
        ));
    }
    if users::find_by_email(&state.db, &email)?.is_some() {
        return Err(AppError::BadRequest("email already registered".into()));
    }

    let hash = passwords::hash_password(&body.password)?;
    let user = users::create_user(&state.db, &email, &hash)?;
    tracing::info!(user_id = %user.id, "User signed up");

    Ok(Json(UserResponse {
        id: user.id,
        email: user.email,
        plan: user.plan,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let email = body.email.trim().to_lowercase();
    let user = users::find_by_email(&state.db, &email)?
        .filter(|u| passwords::verify_password(&body.password, &u.password_hash))
        .ok_or_else(|| AppError::Unauthorized("invalid email or password".into()))?;

    let token = tokens::issue(
        &user.id,
        &user.email,
        &state.config.auth.jwt_secret,
        state.config.auth.token_expiry_minutes,
    )
    .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer",
    }))
}

pub async fn me(Extension(user): Extension<AuthUser>) -> Json<UserResponse> {
    Json(UserResponse {
        id: user.id,
        email: user.email,
        plan: user.plan,
    })
}

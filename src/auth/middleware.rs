//! Bearer-token authentication middleware.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::auth::{tokens, users};
use crate::error::AppError;

/// The authenticated caller, attached as a request extension.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub plan: String,
}

/// Reject requests without a valid `Authorization: Bearer <jwt>` header.
///
/// The token's subject must still exist in the database; a deleted account
/// cannot keep using an unexpired token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

    let claims = tokens::verify(token, &state.config.auth.jwt_secret)
        .map_err(|_| AppError::Unauthorized("invalid or expired token".into()))?;

    let user = users::find_by_id(&state.db, &claims.sub)?
        .ok_or_else(|| AppError::Unauthorized("unknown user".into()))?;

    request.extensions_mut().insert(AuthUser {
        id: user.id,
        email: user.email,
        plan: user.plan,
    });

    Ok(next.run(request).await)
}

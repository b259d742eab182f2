use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::providers::AdapterError;

/// Unified application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("No API key configured: {0}")]
    CredentialNotFound(String),

    #[error("Stored API key could not be decrypted: {0}")]
    CredentialInvalid(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Provider error ({status}): {message}")]
    ProviderWithStatus { status: u16, message: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body returned to the extension client.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    r#type: String,
    code: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::CredentialNotFound(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ProviderWithStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::CredentialInvalid(_)
            | Self::UnsupportedProvider(_)
            | Self::Database(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Unauthorized(_) => "authentication_error",
            Self::Forbidden(_) => "permission_error",
            Self::NotFound(_) => "not_found_error",
            Self::BadRequest(_) => "invalid_request_error",
            Self::RateLimited(_) => "rate_limit_error",
            Self::CredentialNotFound(_) | Self::CredentialInvalid(_) => "credential_error",
            Self::UnsupportedProvider(_) => "configuration_error",
            Self::Provider(_) | Self::ProviderWithStatus { .. } => "api_error",
            Self::Database(_) | Self::Internal(_) => "server_error",
        }
    }

    fn error_code(&self) -> Option<&str> {
        match self {
            Self::RateLimited(_) => Some("rate_limit_exceeded"),
            Self::CredentialNotFound(_) => Some("no_provider_key"),
            Self::CredentialInvalid(_) => Some("invalid_provider_key"),
            Self::UnsupportedProvider(_) => Some("unsupported_provider"),
            Self::Unauthorized(_) => Some("invalid_token"),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: self.error_type().to_string(),
                code: self.error_code().map(String::from),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        tracing::error!(error = %err, "Database error");
        Self::Database(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!(error = %err, "HTTP client error");
        Self::Provider(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {err}"))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<AdapterError> for AppError {
    fn from(err: AdapterError) -> Self {
        match &err {
            // Missing key at adapter level means the precondition was violated
            // upstream: a configuration fault, not a provider fault.
            AdapterError::MissingKey(_) => Self::Internal(err.to_string()),

            // API errors preserve upstream status so the extension can tell
            // a provider-side 401 from a provider-side 429.
            AdapterError::Api { status, message } => Self::ProviderWithStatus {
                status: *status,
                message: message.clone(),
            },

            // Everything else -> 502 (Bad Gateway), surfacing the provider's
            // own error text to the end user.
            _ => Self::Provider(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_maps_to_429() {
        let err = AppError::RateLimited("30 requests per minute".into());
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_code(), Some("rate_limit_exceeded"));
    }

    #[test]
    fn test_credential_not_found_is_user_remediable() {
        let err = AppError::CredentialNotFound("openai".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_type(), "credential_error");
    }

    #[test]
    fn test_credential_invalid_is_fatal() {
        let err = AppError::CredentialInvalid("corrupted ciphertext".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_adapter_api_error_preserves_status() {
        let err = AppError::from(AdapterError::Api {
            status: 401,
            message: "bad key".into(),
        });
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_unsupported_provider_is_configuration_error() {
        let err = AppError::UnsupportedProvider("mystery".into());
        assert_eq!(err.error_type(), "configuration_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// AppError
///
/// The single error type returned by controller actions. Every variant maps to a
/// terminal HTTP response; nothing here is retried or recovered locally. Capability
/// failures (unauthenticated / unverified) are NOT errors — the route guard turns
/// those into responses before a handler ever runs.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("These credentials do not match our records.")]
    InvalidCredentials,

    #[error("The email has already been taken.")]
    EmailTaken,

    #[error("This password reset token is invalid.")]
    InvalidToken,

    #[error("CSRF token mismatch.")]
    CsrfMismatch,

    #[error("The given locale is not supported.")]
    UnsupportedLocale,

    #[error("Internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidCredentials => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::EmailTaken => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidToken => StatusCode::UNPROCESSABLE_ENTITY,
            // 419 is the conventional "authenticity token expired" status for
            // cookie-based web sessions; there is no named constant for it.
            AppError::CsrfMismatch => StatusCode::from_u16(419).unwrap_or(StatusCode::FORBIDDEN),
            AppError::UnsupportedLocale => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(serde_json::json!({ "message": self.to_string() }))).into_response()
    }
}

//! Application error type and its HTTP rendering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::{jwt::TokenError, validation::FieldErrors};

pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const NO_ACTIVE_ACCOUNT: &str = "No active account found with the given credentials";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("identity already registered")]
    DuplicateIdentity(FieldErrors),

    #[error("email and password are required")]
    MissingCredentials,

    /// Login failure. Never says whether the account exists.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Token-obtain failure; same meaning as `InvalidCredentials`.
    #[error("no active account")]
    NoActiveAccount,

    #[error(transparent)]
    Token(TokenError),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            // Failing to mint a token is our fault, not the caller's.
            TokenError::Signing(e) => {
                AppError::Internal(anyhow::Error::new(e).context("sign token"))
            }
            other => AppError::Token(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Validation(errors) | AppError::DuplicateIdentity(errors) => (
                StatusCode::BAD_REQUEST,
                json!({ "message": "Registration failed", "errors": errors }),
            ),
            AppError::MissingCredentials => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Email and password are required" }),
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": INVALID_CREDENTIALS }),
            ),
            AppError::NoActiveAccount => (
                StatusCode::UNAUTHORIZED,
                json!({ "message": NO_ACTIVE_ACCOUNT }),
            ),
            AppError::Token(e) => {
                let message = match e {
                    TokenError::MissingBearer => "Authentication credentials were not provided.",
                    _ => "Token is invalid or expired",
                };
                (
                    StatusCode::UNAUTHORIZED,
                    json!({ "message": message, "code": "token_not_valid" }),
                )
            }
            AppError::Internal(e) => {
                tracing::error!(error = %format!("{e:#}"), "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

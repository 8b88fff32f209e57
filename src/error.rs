use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::relayer::{RelayError, RevertCode};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Rejected by contract: {0}")]
    BusinessRevert(RevertCode),

    #[error("Chain unavailable: {0}")]
    Chain(String),

    #[error("Transaction {tx_hash} sent but not confirmed")]
    OutcomeUnknown { tx_hash: String },

    #[error("Transaction failed: {0}")]
    UnknownFailure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Mission belongs to another player")]
    Forbidden,

    #[error("Mission not completed yet")]
    NotEligible,

    #[error("Mission already claimed")]
    AlreadyClaimed,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::BusinessRevert(code) => AppError::BusinessRevert(code),
            RelayError::Chain(msg) => AppError::Chain(msg),
            RelayError::OutcomeUnknown { tx_hash } => AppError::OutcomeUnknown { tx_hash },
            RelayError::Unknown(msg) => AppError::UnknownFailure(msg),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::AuthError(_) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
            AppError::InvalidSignature => (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE"),
            AppError::BusinessRevert(code) => (code.http_status(), code.as_str()),
            AppError::Chain(_) => (StatusCode::SERVICE_UNAVAILABLE, "CHAIN_UNAVAILABLE"),
            AppError::OutcomeUnknown { .. } => (StatusCode::ACCEPTED, "OUTCOME_UNKNOWN"),
            AppError::UnknownFailure(_) => (StatusCode::BAD_GATEWAY, "TRANSACTION_FAILED"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::NotEligible => (StatusCode::CONFLICT, "NOT_ELIGIBLE"),
            AppError::AlreadyClaimed => (StatusCode::CONFLICT, "ALREADY_CLAIMED"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let (message, details) = match &self {
            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_) => {
                tracing::error!("{}", self);
                ("Internal server error".to_string(), None)
            }
            AppError::OutcomeUnknown { tx_hash } => (
                self.to_string(),
                Some(serde_json::json!({ "txHash": tx_hash, "retryable": false })),
            ),
            AppError::Chain(_) => (
                self.to_string(),
                Some(serde_json::json!({ "retryable": true })),
            ),
            _ => (self.to_string(), None),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::TicketStatus;
use crate::utils::response::error as error_response;

/// A policy rejection: the request was well formed and the ticket exists, but
/// the lifecycle rules forbid the operation. Each variant has its own code so
/// clients can react differently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("You cannot transfer a ticket to yourself")]
    SelfTransfer,

    #[error("You can only transfer tickets you currently hold")]
    NotTicketOwner,

    #[error("Only active tickets can be transferred (ticket is {0})")]
    TicketNotActive(TicketStatus),

    #[error("Ticket is no longer active")]
    TicketNoLongerActive,

    #[error("The recipient must have a registered account")]
    RecipientHasNoAccount,

    #[error("Ticket already used on {}", .0.format("%Y-%m-%d %H:%M:%S UTC"))]
    AlreadyValidated(DateTime<Utc>),

    #[error("Ticket is cancelled")]
    TicketCancelled,

    #[error("Ticket is expired")]
    TicketExpired,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::SelfTransfer => "SELF_TRANSFER",
            Rejection::NotTicketOwner => "NOT_TICKET_OWNER",
            Rejection::TicketNotActive(_) => "TICKET_NOT_ACTIVE",
            Rejection::TicketNoLongerActive => "TICKET_NO_LONGER_ACTIVE",
            Rejection::RecipientHasNoAccount => "RECIPIENT_NOT_REGISTERED",
            Rejection::AlreadyValidated(_) => "ALREADY_VALIDATED",
            Rejection::TicketCancelled => "TICKET_CANCELLED",
            Rejection::TicketExpired => "TICKET_EXPIRED",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Rejected(Rejection::RecipientHasNoAccount) => StatusCode::NOT_FOUND,
            AppError::Rejected(_) => StatusCode::CONFLICT,
            AppError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            AppError::DatabaseError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Rejected(rejection) => rejection.code(),
            AppError::InvalidSignature(_) => "INVALID_SIGNATURE",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Transient infrastructure failures. The caller may retry the same
    /// request; no partial state was left behind.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseError(_) | AppError::ExternalServiceError(_)
        )
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::ExternalServiceError(msg)
            | AppError::InvalidSignature(msg) => msg.clone(),
            AppError::Rejected(rejection) => rejection.to_string(),
            AppError::DatabaseError(_) => "A database error occurred, please retry".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        }
    }

    fn log(&self) {
        match self {
            AppError::Rejected(rejection) => {
                warn!(code = rejection.code(), reason = %rejection, "Request rejected");
            }
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidSignature(msg) => {
                warn!(code = self.code(), message = %msg, "Client error");
            }
            AppError::ExternalServiceError(msg) | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        let details = self.is_retryable().then(|| json!({ "retryable": true }));

        error_response(code, self.public_message(), details, status)
    }
}

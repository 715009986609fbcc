//! Error types for the library server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Numeric error codes carried in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NotFound = 4,
    BadValue = 5,
    Duplicate = 6,
    AccountInactive = 7,
    MaxLoansReached = 8,
    BookNotAvailable = 9,
    DuplicateLoan = 10,
    InvalidLoanState = 11,
    NoFineToPay = 12,
    CopiesOnLoan = 13,
    InvalidRole = 14,
}

/// Business-rule violations reported to the caller as-is
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("account inactive")]
    AccountInactive,
    #[error("limit reached")]
    LimitReached,
    #[error("unavailable")]
    Unavailable,
    #[error("duplicate loan")]
    DuplicateLoan,
    #[error("loan already returned")]
    AlreadyReturned,
    #[error("loan is not active")]
    LoanNotActive,
    #[error("loan is overdue, pay fine first")]
    LoanOverdue,
    #[error("no fine to pay")]
    NoFineToPay,
    #[error("cannot reduce total copies below loaned copies")]
    CopiesBelowLoaned,
    #[error("book has copies on loan")]
    BookOnLoan,
    #[error("book has loan history")]
    BookHasLoanHistory,
    #[error("invalid role")]
    InvalidRole,
}

impl Rejection {
    pub fn code(&self) -> ErrorCode {
        match self {
            Rejection::AccountInactive => ErrorCode::AccountInactive,
            Rejection::LimitReached => ErrorCode::MaxLoansReached,
            Rejection::Unavailable => ErrorCode::BookNotAvailable,
            Rejection::DuplicateLoan => ErrorCode::DuplicateLoan,
            Rejection::AlreadyReturned | Rejection::LoanNotActive | Rejection::LoanOverdue => {
                ErrorCode::InvalidLoanState
            }
            Rejection::NoFineToPay => ErrorCode::NoFineToPay,
            Rejection::CopiesBelowLoaned | Rejection::BookOnLoan | Rejection::BookHasLoanHistory => {
                ErrorCode::CopiesOnLoan
            }
            Rejection::InvalidRole => ErrorCode::InvalidRole,
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = e {
            if db.is_unique_violation() {
                return AppError::Conflict("Resource already exists".to_string());
            }
            if db.is_foreign_key_violation() {
                return AppError::Conflict("Resource is still referenced".to_string());
            }
            // serialization_failure / deadlock_detected
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
                return AppError::Conflict("Concurrent update, retry the request".to_string());
            }
        }
        AppError::Database(e)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NotFound, msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Rejected(reason) => {
                (StatusCode::UNPROCESSABLE_ENTITY, reason.code(), reason.to_string())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorCode::Duplicate, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages() {
        assert_eq!(Rejection::AccountInactive.to_string(), "account inactive");
        assert_eq!(Rejection::LimitReached.to_string(), "limit reached");
        assert_eq!(Rejection::Unavailable.to_string(), "unavailable");
        assert_eq!(Rejection::DuplicateLoan.to_string(), "duplicate loan");
        assert_eq!(Rejection::NoFineToPay.to_string(), "no fine to pay");
    }

    #[test]
    fn test_rejected_maps_to_unprocessable() {
        let response = AppError::from(Rejection::Unavailable).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_not_found_status() {
        let response = AppError::NotFound("Loan with id 1 not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_row_not_found_is_database_error() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::Database(_)));
    }
}

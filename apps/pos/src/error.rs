//! # API Error Type
//!
//! Unified error type for commands.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Bistro POS                             │
//! │                                                                         │
//! │  Shell line "order pay 3f2c.. cash"                                     │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Command Function                                                │  │
//! │  │  Result<T, ApiError>                                             │  │
//! │  │         │                                                        │  │
//! │  │  No session?      ─── Unauthorized ──────────────────┐           │  │
//! │  │  Role lacks it?   ─── CoreError::PermissionDenied ───┤           │  │
//! │  │  Bad input?       ─── ValidationError ───────────────┤           │  │
//! │  │  Rule broken?     ─── CoreError::InvalidOrderState ──┼─► ApiError│  │
//! │  │  Storage failed?  ─── DbError::QueryFailed ──────────┘           │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Shell prints:  error [BUSINESS_LOGIC] Order 260307-0001 is paid, ...   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage failures are logged with their detail where they are converted
//! and reach the operator only as a generic message.

use serde::Serialize;

use bistro_core::{CoreError, ValidationError};
use bistro_db::DbError;

use crate::mail::MailError;
use crate::printing::PrinterError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned from every command.
///
/// ```json
/// { "code": "NOT_FOUND", "message": "Order not found: 3f2c..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found
    NotFound,

    /// Input validation failed
    ValidationError,

    /// Nobody is logged in, or the credentials were wrong
    Unauthorized,

    /// The logged-in role may not do this
    Forbidden,

    /// Database operation failed
    DatabaseError,

    /// Business rule refused the operation
    BusinessLogic,

    /// Receipt could not be printed
    PrinterError,

    /// Message could not be handed to the mail spool
    MailError,

    /// Configuration could not be read or is invalid
    ConfigError,

    /// Internal error
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::BusinessLogic => "BUSINESS_LOGIC",
            ErrorCode::PrinterError => "PRINTER_ERROR",
            ErrorCode::MailError => "MAIL_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Unauthorized, message)
    }

    pub fn business(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::BusinessLogic, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ConfigError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::ValidationError,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::new(ErrorCode::ValidationError, "Invalid reference")
            }
            DbError::CheckViolation { message } => {
                tracing::error!("Constraint failed: {}", message);
                ApiError::new(ErrorCode::ValidationError, "Value rejected by the database")
            }
            DbError::ConnectionFailed(e) => {
                tracing::error!("Database connection failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(e) => {
                tracing::error!("Database migration failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::TransactionFailed(e) => {
                tracing::error!("Transaction failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database transaction failed")
            }
            DbError::BackupFailed(e) => {
                tracing::warn!("Backup failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, format!("Backup failed: {}", e))
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::PermissionDenied { .. } => {
                ApiError::new(ErrorCode::Forbidden, err.to_string())
            }
            CoreError::InvalidCredentials | CoreError::InvalidCode => {
                ApiError::new(ErrorCode::Unauthorized, err.to_string())
            }
            CoreError::Validation(e) => ApiError::validation(e.to_string()),
            CoreError::InvalidTableTransition { .. }
            | CoreError::InvalidOrderState { .. }
            | CoreError::OrderTooLarge { .. }
            | CoreError::ProductUnavailable(_)
            | CoreError::EmptyOrder(_) => ApiError::business(err.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        tracing::error!("Mail delivery failed: {}", err);
        ApiError::new(ErrorCode::MailError, err.to_string())
    }
}

impl From<PrinterError> for ApiError {
    fn from(err: PrinterError) -> Self {
        tracing::error!("Printing failed: {}", err);
        ApiError::new(ErrorCode::PrinterError, err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

//! # Error Types
//!
//! Domain-specific error types for bistro-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  bistro-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                        │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  bistro-db errors                                                       │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  bistro-pos errors                                                      │
//! │  └── ApiError         - What the operator sees                          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Screen        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::table_state::{TableEvent, TableStatus};

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The table cannot take the requested transition.
    ///
    /// ## When This Occurs
    /// - Opening an order on a table that is already Busy
    /// - Clearing a table that was never paid
    #[error("Table cannot go from {from:?} via {event:?}")]
    InvalidTableTransition { from: TableStatus, event: TableEvent },

    /// The order is not in a state that allows the operation.
    ///
    /// ## When This Occurs
    /// - Adding items to a paid or cancelled order
    /// - Paying an order twice
    #[error("Order {order_number} is {status}, cannot {operation}")]
    InvalidOrderState {
        order_number: String,
        status: String,
        operation: String,
    },

    /// Order already carries the maximum number of lines.
    #[error("Order cannot have more than {max} lines")]
    OrderTooLarge { max: usize },

    /// Product exists but cannot currently be ordered.
    #[error("Product '{0}' is not available")]
    ProductUnavailable(String),

    /// Order has no lines to send or pay.
    #[error("Order {0} has no items")]
    EmptyOrder(String),

    /// Caller lacks the permission for the operation.
    #[error("Role {role} is not allowed to {permission}")]
    PermissionDenied { role: String, permission: String },

    /// Login failed. Deliberately does not say which part was wrong.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// A verification or reset code is unknown, used or expired.
    #[error("Code is invalid or expired")]
    InvalidCode,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., bad email, unknown enum value).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

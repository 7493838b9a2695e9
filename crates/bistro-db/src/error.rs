//! # Database Error Types
//!
//! SQLite failures are sorted by constraint kind before they leave the
//! crate, so callers can match on what went wrong instead of parsing text.
//!
//! ```text
//!   sqlx::Error::Database ──kind()──┬─ UniqueViolation     → DbError::UniqueViolation { field }
//!                                   │   (field named after the schema constraint below)
//!                                   ├─ ForeignKeyViolation → DbError::ForeignKeyViolation
//!                                   ├─ CheckViolation      → DbError::CheckViolation
//!                                   │  NotNullViolation
//!                                   └─ anything else       → DbError::QueryFailed
//! ```
//!
//! SQLite does not say which key a foreign key failure was about, so the
//! repositories that write references attach one with
//! [`DbError::with_reference`].

use sqlx::error::{DatabaseError, ErrorKind};
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// Soft-deleted rows count as missing for live-only lookups.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A unique key already holds this value.
    ///
    /// `field` is the domain name of the key (`username`, `email`,
    /// `table`, `category`, ...). Repositories fill in `value`.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// A row points at a missing row, or a row that is still referenced
    /// was deleted.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A CHECK or NOT NULL constraint rejected a value.
    ///
    /// Business rules catch these first; reaching the schema means a
    /// caller skipped validation.
    #[error("Constraint failed: {message}")]
    CheckViolation { message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Backup or restore could not be completed: target exists, source is
    /// not a Bistro database, or a file operation failed.
    #[error("Backup failed: {0}")]
    BackupFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Unique constraints of the schema and the field name reported for each.
///
/// SQLite names column constraints `table.column` and expression indexes
/// by index name; both spellings are listed where they can occur.
const UNIQUE_KEYS: &[(&str, &str)] = &[
    ("users.username", "username"),
    ("users.email", "email"),
    ("orders.order_number", "order_number"),
    ("app_settings.key", "setting"),
    ("categories.name", "category"),
    ("idx_categories_name", "category"),
    ("restaurant_tables.name", "table"),
    ("idx_tables_name", "table"),
];

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Replaces SQLite's bare foreign key message with `message`.
    /// Other errors pass through unchanged.
    pub fn with_reference(self, message: impl Into<String>) -> Self {
        match self {
            DbError::ForeignKeyViolation { .. } => DbError::ForeignKeyViolation {
                message: message.into(),
            },
            other => other,
        }
    }
}

/// Maps the constraint target in a SQLite message to its field name.
///
/// `"UNIQUE constraint failed: users.email"` → `email`. Unknown targets
/// fall back to the column name, composite keys to their first column.
fn unique_field(message: &str) -> String {
    let target = message
        .split_once("constraint failed: ")
        .map(|(_, target)| target.trim())
        .unwrap_or(message);
    let target = target
        .strip_prefix("index '")
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(target);
    let first = target.split(", ").next().unwrap_or(target);

    UNIQUE_KEYS
        .iter()
        .find(|(key, _)| *key == first)
        .map(|(_, field)| (*field).to_string())
        .unwrap_or_else(|| first.rsplit('.').next().unwrap_or(first).to_string())
}

fn classify(err: &dyn DatabaseError) -> DbError {
    let message = err.message();
    match err.kind() {
        ErrorKind::UniqueViolation => DbError::UniqueViolation {
            field: unique_field(message),
            value: "unknown".to_string(),
        },
        ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation {
            message: message.to_string(),
        },
        ErrorKind::CheckViolation | ErrorKind::NotNullViolation => DbError::CheckViolation {
            message: message.to_string(),
        },
        _ => DbError::QueryFailed(message.to_string()),
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => classify(&*db_err),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::BackupFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

//! # Database Migrations
//!
//! Embedded SQL migrations for Bistro POS.
//!
//! ```text
//! migrations/sqlite/
//! ├── 001_initial_schema.sql       # Core tables, audit_logs
//! ├── 002_product_search.sql       # FTS5 index + triggers
//! └── 003_tokens_and_settings.sql  # user_tokens, default settings
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/sqlite/` with the next sequence number
//! 2. Name format: `NNN_description.sql`
//! 3. Write idempotent SQL (use `IF NOT EXISTS` where possible)
//! 4. **NEVER** modify existing migrations - always add new ones

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/sqlite` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations.
///
/// Idempotent, and each migration runs in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Migration counts for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    pub total: usize,
    pub applied: usize,
}

impl MigrationStatus {
    pub fn is_current(&self) -> bool {
        self.applied >= self.total
    }
}

/// Returns how many embedded migrations exist and how many are applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let total = MIGRATOR.migrations.len();

    // A database that never ran migrations has no bookkeeping table yet
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok(MigrationStatus {
        total,
        applied: applied as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_fresh_database_is_current() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let status = migration_status(db.pool()).await.unwrap();
        assert_eq!(status.total, 3);
        assert!(status.is_current());

        // running again is a no-op
        run_migrations(db.pool()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unmigrated_database_reports_zero() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();
        let status = migration_status(db.pool()).await.unwrap();
        assert_eq!(status.applied, 0);
        assert!(!status.is_current());
    }
}

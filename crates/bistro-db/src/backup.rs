//! # Backup and Restore
//!
//! ```text
//!   backup(target)                      restore(source)
//!   ──────────────                      ───────────────
//!   refuse if target exists             validate source:
//!   VACUUM INTO 'target'                  • opens as SQLite
//!   (consistent snapshot while            • quick_check = ok
//!    the app keeps running)               • has _sqlx_migrations + audit_logs
//!                                       copy source to <live>.restore
//!                                       close pool
//!                                       rename staged file over live
//!                                       drop stale -wal / -shm
//!                                       reconnect + migrate (always)
//! ```

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::Database;

/// Tables a file must contain to be accepted as a backup.
const REQUIRED_TABLES: &[&str] = &["_sqlx_migrations", "audit_logs", "orders"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Checks that `path` is a readable Bistro database.
pub async fn validate_backup(path: &Path) -> DbResult<()> {
    if !tokio::fs::try_exists(path).await? {
        return Err(DbError::BackupFailed(format!(
            "{} does not exist",
            path.display()
        )));
    }

    let options = SqliteConnectOptions::new().filename(path).read_only(true);
    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .map_err(|e| DbError::BackupFailed(format!("{}: {e}", path.display())))?;

    let result = check_contents(&mut conn, path).await;
    let _ = conn.close().await;
    result
}

async fn check_contents(conn: &mut SqliteConnection, path: &Path) -> DbResult<()> {
    let not_a_database = |e: sqlx::Error| {
        DbError::BackupFailed(format!("{} is not a SQLite database: {e}", path.display()))
    };

    let check: String = sqlx::query_scalar("PRAGMA quick_check")
        .fetch_one(&mut *conn)
        .await
        .map_err(not_a_database)?;
    if check != "ok" {
        return Err(DbError::BackupFailed(format!(
            "{} failed integrity check: {check}",
            path.display()
        )));
    }

    for table in REQUIRED_TABLES {
        let found: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        )
        .bind(table)
        .fetch_one(&mut *conn)
        .await
        .map_err(not_a_database)?;
        if found == 0 {
            return Err(DbError::BackupFailed(format!(
                "{} is not a Bistro database (missing {table})",
                path.display()
            )));
        }
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> DbResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Moves the staged copy over the live file and drops the old journal.
async fn swap_in(staged: &Path, live: &Path) -> DbResult<()> {
    tokio::fs::rename(staged, live).await?;
    remove_if_present(&sidecar(live, "-wal")).await?;
    remove_if_present(&sidecar(live, "-shm")).await
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

impl Database {
    /// Writes a consistent snapshot of the live database to `target`.
    pub async fn backup(&self, target: &Path) -> DbResult<BackupInfo> {
        if tokio::fs::try_exists(target).await? {
            return Err(DbError::BackupFailed(format!(
                "{} already exists",
                target.display()
            )));
        }
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(target = %target.display(), "Backing up database");

        // VACUUM INTO takes an expression; the path is quoted as a literal
        let literal = target.to_string_lossy().replace('\'', "''");
        sqlx::query(&format!("VACUUM INTO '{literal}'"))
            .execute(self.pool())
            .await
            .map_err(|e| DbError::BackupFailed(e.to_string()))?;

        let size_bytes = tokio::fs::metadata(target).await?.len();
        info!(target = %target.display(), size_bytes, "Backup complete");

        Ok(BackupInfo {
            path: target.to_path_buf(),
            size_bytes,
        })
    }

    /// Replaces the live database with `source` and reconnects.
    ///
    /// The source is copied next to the live file before the pool closes, so
    /// a failed copy leaves the pool untouched. Once closed, the pool is
    /// reopened whether or not the swap succeeded.
    ///
    /// Every clone of this handle shares the closed pool and must be
    /// replaced by the caller.
    pub async fn restore(&mut self, source: &Path) -> DbResult<()> {
        if self.config().is_in_memory() {
            return Err(DbError::BackupFailed(
                "cannot restore into an in-memory database".to_string(),
            ));
        }

        validate_backup(source).await?;

        let live = self.config().database_path.clone();
        let same_file = match (
            tokio::fs::canonicalize(source).await,
            tokio::fs::canonicalize(&live).await,
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if same_file {
            return Err(DbError::BackupFailed(
                "source is the live database".to_string(),
            ));
        }

        warn!(
            source = %source.display(),
            live = %live.display(),
            "Restoring database; current data will be replaced"
        );

        let staged = sidecar(&live, ".restore");
        if let Err(e) = tokio::fs::copy(source, &staged).await {
            let _ = remove_if_present(&staged).await;
            return Err(DbError::BackupFailed(format!(
                "cannot stage {}: {e}",
                source.display()
            )));
        }

        self.close().await;
        let swapped = swap_in(&staged, &live).await;
        let reopened = self.reconnect().await;

        if let Err(e) = swapped {
            error!(error = %e, "Restore failed; live database kept");
            let _ = remove_if_present(&staged).await;
            reopened?;
            return Err(e);
        }
        reopened?;
        info!("Restore complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, insert_product};
    use crate::DbConfig;

    #[tokio::test]
    async fn test_backup_refuses_existing_file() {
        let db = db().await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("snap.db");

        let info = db.backup(&target).await.unwrap();
        assert!(info.size_bytes > 0);
        validate_backup(&target).await.unwrap();

        let err = db.backup(&target).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("bistro.db");
        let snapshot = dir.path().join("snapshot.db");

        let mut db = Database::new(DbConfig::new(&live)).await.unwrap();
        let soup = insert_product(&db, "Soup", 650).await;
        db.backup(&snapshot).await.unwrap();
        insert_product(&db, "Steak", 2400).await;
        assert_eq!(db.products().list(None).await.unwrap().len(), 2);

        db.restore(&snapshot).await.unwrap();

        let products = db.products().list(None).await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, soup.id);
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_restore_rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("bistro.db");
        let mut db = Database::new(DbConfig::new(&live)).await.unwrap();

        let junk = dir.path().join("junk.db");
        tokio::fs::write(&junk, b"definitely not sqlite, just some bytes padded out to look like a file")
            .await
            .unwrap();
        assert!(db.restore(&junk).await.is_err());

        let other = dir.path().join("other.db");
        let conn_opts = SqliteConnectOptions::new().filename(&other).create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&conn_opts).await.unwrap();
        sqlx::query("CREATE TABLE notes (body TEXT)").execute(&mut conn).await.unwrap();
        conn.close().await.unwrap();
        let err = db.restore(&other).await.unwrap_err();
        assert!(err.to_string().contains("missing _sqlx_migrations"));

        assert!(db.restore(&dir.path().join("absent.db")).await.is_err());
        assert!(db.restore(&live).await.is_err());

        // the live database is untouched by rejected restores
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_the_pool_open() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("bistro.db");
        let snapshot = dir.path().join("snapshot.db");

        let mut db = Database::new(DbConfig::new(&live)).await.unwrap();
        insert_product(&db, "Soup", 650).await;
        db.backup(&snapshot).await.unwrap();
        insert_product(&db, "Steak", 2400).await;

        // a directory in the staging slot makes the copy fail
        tokio::fs::create_dir(sidecar(&live, ".restore")).await.unwrap();

        let err = db.restore(&snapshot).await.unwrap_err();
        assert!(matches!(err, DbError::BackupFailed(_)));
        assert!(db.health_check().await);
        assert_eq!(db.products().list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_restore_leaves_no_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("bistro.db");
        let snapshot = dir.path().join("snapshot.db");

        let mut db = Database::new(DbConfig::new(&live)).await.unwrap();
        db.backup(&snapshot).await.unwrap();
        db.restore(&snapshot).await.unwrap();

        assert!(!tokio::fs::try_exists(sidecar(&live, ".restore")).await.unwrap());
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_restore_into_memory_refused() {
        let mut db = db().await;
        let err = db.restore(Path::new("/nonexistent.db")).await.unwrap_err();
        assert!(err.to_string().contains("in-memory"));
    }
}

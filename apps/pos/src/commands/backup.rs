//! # Backup and Restore Commands
//!
//! Admin only. A restore swaps the database under every other command, so
//! it takes the database handle exclusively and signs the operator out: the
//! restored file may not know their account.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use bistro_core::Permission;
use bistro_db::reconcile_table_status;

use crate::error::ApiResult;
use crate::state::{DbState, SessionState};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDto {
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub source: PathBuf,
    /// Tables whose status was re-derived from the restored orders.
    pub repaired_tables: Vec<String>,
}

/// Snapshots the live database into `target`, which must not exist yet.
pub async fn backup_database(db: &DbState, session: &SessionState, target: &Path) -> ApiResult<BackupDto> {
    let me = session.require(Permission::Backup).await?;

    let db = db.read().await;
    let backup = db.backup(target).await?;

    info!(path = %backup.path.display(), by = %me.username, "Backup written");
    Ok(BackupDto {
        path: backup.path,
        size_bytes: backup.size_bytes,
    })
}

/// Replaces the live database with `source`.
pub async fn restore_database(
    db: &DbState,
    session: &SessionState,
    source: &Path,
) -> ApiResult<RestoreSummary> {
    let me = session.require(Permission::Backup).await?;

    let mut db = db.write().await;
    db.restore(source).await?;
    let repairs = reconcile_table_status(&db).await?;
    drop(db);

    session.clear().await;
    warn!(source = %source.display(), by = %me.username, "Database restored, session closed");

    Ok(RestoreSummary {
        source: source.to_path_buf(),
        repaired_tables: repairs.into_iter().map(|r| r.table_name).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{add_user, app, PASSWORD};
    use crate::commands::{auth, menu};
    use crate::error::ErrorCode;
    use crate::state::Session;
    use bistro_core::UserRole;
    use bistro_db::{Database, DbConfig};
    use chrono::Utc;

    #[tokio::test]
    async fn test_backup_needs_admin() {
        let app = app().await;
        let mgr = add_user(&app, "mgr", UserRole::Manager).await;
        app.session.set(Session::from_user(&mgr, Utc::now())).await;

        let dir = tempfile::tempdir().unwrap();
        let err = backup_database(&app.db, &app.session, &dir.path().join("b.db"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_backup_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("bistro.db");
        let db = Database::new(DbConfig::new(&live)).await.unwrap();

        let app = app().await;
        let app = crate::commands::test_support::TestApp {
            db: DbState::new(db),
            ..app
        };
        let admin = add_user(&app, "boss", UserRole::Admin).await;
        app.session.set(Session::from_user(&admin, Utc::now())).await;

        let snapshot = dir.path().join("snap.db");
        let backup = backup_database(&app.db, &app.session, &snapshot).await.unwrap();
        assert!(backup.size_bytes > 0);

        // A second backup to the same file is refused.
        let err = backup_database(&app.db, &app.session, &snapshot).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);

        // Changes after the snapshot disappear on restore.
        let input = menu::NewProduct {
            name: "Tiramisu".to_string(),
            category_id: None,
            description: None,
            price_cents: 650,
        };
        menu::create_product(&app.db, &app.session, input).await.unwrap();

        restore_database(&app.db, &app.session, &snapshot).await.unwrap();
        assert!(app.session.get().await.is_none());

        auth::login(&app.db, &app.session, "boss", PASSWORD).await.unwrap();
        let products = menu::list_products(&app.db, &app.session, None).await.unwrap();
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn test_restore_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("bistro.db");
        let db = Database::new(DbConfig::new(&live)).await.unwrap();

        let app = app().await;
        let app = crate::commands::test_support::TestApp {
            db: DbState::new(db),
            ..app
        };
        let admin = add_user(&app, "boss", UserRole::Admin).await;
        app.session.set(Session::from_user(&admin, Utc::now())).await;

        let junk = dir.path().join("junk.db");
        std::fs::write(&junk, b"not a database").unwrap();
        let err = restore_database(&app.db, &app.session, &junk).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);

        // Still signed in, still working.
        assert!(app.session.get().await.is_some());
    }
}

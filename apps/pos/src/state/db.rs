//! # Database State
//!
//! Wraps the `Database` handle for use in commands.
//!
//! Most commands only read the handle (`db.read().await`) and share the
//! connection pool. Restore swaps the file underneath the pool and needs
//! the handle exclusively, so the wrapper is a `RwLock`.
//!
//! ```rust,ignore
//! pub async fn list_tables(db: &DbState, session: &SessionState) -> ApiResult<Vec<TableDto>> {
//!     session.current().await?;
//!     let db = db.read().await;
//!     let tables = db.tables().list().await?;
//!     Ok(tables.into_iter().map(TableDto::from).collect())
//! }
//! ```

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bistro_db::Database;

#[derive(Debug)]
pub struct DbState {
    db: RwLock<Database>,
}

impl DbState {
    pub fn new(db: Database) -> Self {
        DbState {
            db: RwLock::new(db),
        }
    }

    /// Shared access for ordinary commands.
    pub async fn read(&self) -> RwLockReadGuard<'_, Database> {
        self.db.read().await
    }

    /// Exclusive access for restore. Waits for running commands to finish.
    pub async fn write(&self) -> RwLockWriteGuard<'_, Database> {
        self.db.write().await
    }
}

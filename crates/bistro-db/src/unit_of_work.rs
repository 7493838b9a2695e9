//! # Unit of Work
//!
//! One transaction plus the entity changes made in it.
//!
//! ```text
//!   db.begin(actor)
//!        │
//!        ▼
//!   ┌──────────────────────── UnitOfWork ─────────────────────────┐
//!   │  Transaction<'static, Sqlite>                               │
//!   │  ChangeSet  ◄── repo writes call uow.track(before/after)    │
//!   │  Actor                                                      │
//!   └──────────────────────────┬──────────────────────────────────┘
//!                              │ commit()
//!                              ▼
//!        ChangeSet::audit_entries(actor, now)   (policy)
//!                              │
//!                              ▼
//!        INSERT INTO audit_logs ... (same transaction)
//!                              │
//!                              ▼
//!                           COMMIT
//! ```
//!
//! Dropping a unit of work without committing rolls everything back,
//! audit rows included.

use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::{debug, warn};

use bistro_core::audit::AuditEntry;
use bistro_core::{Actor, ChangeSet, TrackedChange};

use crate::error::{DbError, DbResult};
use crate::repository::audit::append_entry;

pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    changes: ChangeSet,
    actor: Actor,
}

impl UnitOfWork {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>, actor: Actor) -> Self {
        UnitOfWork {
            tx,
            changes: ChangeSet::new(),
            actor,
        }
    }

    /// The transaction's connection, for queries inside this unit of work.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Records a pending entity change.
    pub fn track(&mut self, change: TrackedChange) {
        self.changes.track(change);
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// The audit rows a commit would write right now.
    pub fn pending_audit(&self) -> Vec<AuditEntry> {
        self.changes.audit_entries(&self.actor, Utc::now())
    }

    /// Writes the audit rows and commits. Returns how many rows were written.
    ///
    /// If an audit row cannot be written the transaction is rolled back and
    /// nothing is saved.
    pub async fn commit(mut self) -> DbResult<usize> {
        let entries = self.changes.audit_entries(&self.actor, Utc::now());

        for entry in &entries {
            if let Err(e) = append_entry(&mut self.tx, entry).await {
                warn!(
                    entity_type = %entry.entity_type,
                    entity_key = %entry.entity_key,
                    error = %e,
                    "Audit write failed, rolling back"
                );
                self.tx
                    .rollback()
                    .await
                    .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
                return Err(e);
            }
        }

        self.tx
            .commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(
            changes = self.changes.len(),
            audited = entries.len(),
            actor = %self.actor.name(),
            "Unit of work committed"
        );
        Ok(entries.len())
    }

    /// Discards every change made in this unit of work.
    pub async fn rollback(self) -> DbResult<()> {
        debug!(changes = self.changes.len(), "Unit of work rolled back");
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("changes", &self.changes.len())
            .field("actor", &self.actor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::audit::AuditFilter;
    use crate::{Database, DbConfig};
    use bistro_core::{new_id, AppSetting, AuditAction, Product};

    fn product(name: &str, price: i64) -> Product {
        let now = Utc::now();
        Product {
            id: new_id(),
            category_id: None,
            name: name.to_string(),
            description: None,
            price_cents: price,
            is_available: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_commit_writes_audit_rows() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut uow = db.begin(Actor::user("u1", "Alice")).await.unwrap();
        let soup = db.products().insert(&mut uow, &product("Soup", 650)).await.unwrap();
        assert_eq!(uow.pending_audit().len(), 1);
        assert_eq!(uow.commit().await.unwrap(), 1);

        let rows = db.audit_logs().query(&AuditFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_name, "Alice");
        assert_eq!(rows[0].action, AuditAction::Insert);
        assert_eq!(rows[0].entity_type, "Product");
        assert_eq!(rows[0].entity_key, soup.id);
    }

    #[tokio::test]
    async fn test_rollback_discards_change_and_audit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut uow = db.begin(Actor::system()).await.unwrap();
        let soup = db.products().insert(&mut uow, &product("Soup", 650)).await.unwrap();
        uow.rollback().await.unwrap();

        assert!(db.products().find(&soup.id).await.unwrap().is_none());
        assert_eq!(db.audit_logs().count(&AuditFilter::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_rolls_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        {
            let mut uow = db.begin(Actor::system()).await.unwrap();
            db.products().insert(&mut uow, &product("Soup", 650)).await.unwrap();
        }

        assert!(db.products().list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_audit_write_rolls_back_save() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        // the CHECK on audit_logs.action makes every audit insert fail
        sqlx::query("DROP TABLE audit_logs")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE audit_logs (id TEXT, user_name TEXT, timestamp TEXT, action TEXT CHECK (action = 'never'), entity_type TEXT, entity_key TEXT, changes TEXT)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let mut uow = db.begin(Actor::system()).await.unwrap();
        let setting = AppSetting {
            key: "receipt_footer".to_string(),
            value: "Ciao".to_string(),
            updated_at: Utc::now(),
        };
        db.settings().upsert(&mut uow, &setting.key, &setting.value).await.unwrap();
        assert!(uow.commit().await.is_err());

        let footer = db.settings().get("receipt_footer").await.unwrap();
        assert_eq!(footer.as_deref(), Some("Thank you!"));
    }

    #[tokio::test]
    async fn test_unaudited_changes_commit_without_rows() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut uow = db.begin(Actor::system()).await.unwrap();
        db.tables().create(&mut uow, "T1", 4).await.unwrap();
        assert_eq!(uow.commit().await.unwrap(), 0);
        assert_eq!(db.tables().list().await.unwrap().len(), 1);
    }
}

//! # Audit Log Repository
//!
//! Audit rows are only ever appended by [`crate::UnitOfWork::commit`]; this
//! repository reads them back for the audit viewer.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use bistro_core::audit::AuditEntry;
use bistro_core::{new_id, AuditAction, AuditLog};

use crate::error::DbResult;

/// Default page size of the audit viewer.
pub const DEFAULT_AUDIT_LIMIT: u32 = 50;

/// Filter for [`AuditLogRepository::query`]. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_key: Option<String>,
    pub action: Option<AuditAction>,
    pub user_name: Option<String>,
    /// Inclusive.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive.
    pub to: Option<DateTime<Utc>>,
    /// `None` means [`DEFAULT_AUDIT_LIMIT`].
    pub limit: Option<u32>,
    pub offset: u32,
}

impl AuditFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(entity_type) = &self.entity_type {
            qb.push(" AND entity_type = ").push_bind(entity_type.clone());
        }
        if let Some(entity_key) = &self.entity_key {
            qb.push(" AND entity_key = ").push_bind(entity_key.clone());
        }
        if let Some(action) = self.action {
            qb.push(" AND action = ").push_bind(action);
        }
        if let Some(user_name) = &self.user_name {
            qb.push(" AND user_name = ")
                .push_bind(user_name.clone())
                .push(" COLLATE NOCASE");
        }
        if let Some(from) = self.from {
            qb.push(" AND timestamp >= ").push_bind(from);
        }
        if let Some(to) = self.to {
            qb.push(" AND timestamp < ").push_bind(to);
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: SqlitePool,
}

/// Appends one audit row on the unit of work's connection.
pub(crate) async fn append_entry(conn: &mut SqliteConnection, entry: &AuditEntry) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_name, timestamp, action, entity_type, entity_key, changes)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(new_id())
    .bind(&entry.user_name)
    .bind(entry.timestamp)
    .bind(entry.action)
    .bind(&entry.entity_type)
    .bind(&entry.entity_key)
    .bind(entry.changes.to_string())
    .execute(conn)
    .await?;
    Ok(())
}

impl AuditLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AuditLogRepository { pool }
    }

    /// Matching rows, newest first.
    pub async fn query(&self, filter: &AuditFilter) -> DbResult<Vec<AuditLog>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM audit_logs");
        filter.push_where(&mut qb);
        qb.push(" ORDER BY timestamp DESC, rowid DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(DEFAULT_AUDIT_LIMIT))
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = qb.build_query_as::<AuditLog>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Number of matching rows, ignoring limit and offset.
    pub async fn count(&self, filter: &AuditFilter) -> DbResult<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM audit_logs");
        filter.push_where(&mut qb);

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::db;
    use bistro_core::Actor;
    use chrono::Duration;

    #[tokio::test]
    async fn test_filters_and_paging() {
        let db = db().await;
        let start = Utc::now();

        for (who, value) in [("Boss", "1"), ("Maria", "2"), ("Boss", "3")] {
            let mut uow = db.begin(Actor::user("id", who)).await.unwrap();
            db.settings().upsert(&mut uow, "receipt_footer", value).await.unwrap();
            uow.commit().await.unwrap();
        }

        let repo = db.audit_logs();
        assert_eq!(repo.count(&AuditFilter::default()).await.unwrap(), 3);

        let boss = AuditFilter {
            user_name: Some("boss".to_string()),
            ..AuditFilter::default()
        };
        assert_eq!(repo.count(&boss).await.unwrap(), 2);

        let inserts = AuditFilter {
            action: Some(AuditAction::Insert),
            ..AuditFilter::default()
        };
        assert_eq!(repo.count(&inserts).await.unwrap(), 0);

        let page = repo
            .query(&AuditFilter {
                limit: Some(1),
                offset: 1,
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].user_name, "Maria");

        let future = AuditFilter {
            from: Some(Utc::now() + Duration::hours(1)),
            ..AuditFilter::default()
        };
        assert_eq!(repo.count(&future).await.unwrap(), 0);

        let window = AuditFilter {
            entity_type: Some("AppSetting".to_string()),
            entity_key: Some("receipt_footer".to_string()),
            from: Some(start),
            to: Some(Utc::now() + Duration::seconds(1)),
            ..AuditFilter::default()
        };
        assert_eq!(repo.count(&window).await.unwrap(), 3);
    }
}

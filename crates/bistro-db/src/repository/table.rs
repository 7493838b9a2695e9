//! # Table Repository
//!
//! Dining tables and their occupancy. The status column is written only
//! through [`TableRepository::update`] after the caller has applied a
//! [`bistro_core::TableEvent`].

use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use bistro_core::{new_id, RestaurantTable, TableStatus, TrackedChange};

use crate::error::{DbError, DbResult};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone)]
pub struct TableRepository {
    pool: SqlitePool,
}

/// A live table with the number of open orders on it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TableOccupancy {
    pub id: String,
    pub name: String,
    pub status: TableStatus,
    pub open_orders: i64,
}

async fn fetch<'e, E>(executor: E, id: &str) -> DbResult<Option<RestaurantTable>>
where
    E: SqliteExecutor<'e>,
{
    let table = sqlx::query_as::<_, RestaurantTable>("SELECT * FROM restaurant_tables WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(table)
}

impl TableRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TableRepository { pool }
    }

    /// The floor plan: live tables by name.
    pub async fn list(&self) -> DbResult<Vec<RestaurantTable>> {
        let tables = sqlx::query_as::<_, RestaurantTable>(
            "SELECT * FROM restaurant_tables WHERE is_deleted = 0 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    pub async fn find(&self, id: &str) -> DbResult<Option<RestaurantTable>> {
        Ok(fetch(&self.pool, id).await?.filter(|t| !t.is_deleted))
    }

    pub async fn find_by_name(&self, name: &str) -> DbResult<Option<RestaurantTable>> {
        let table = sqlx::query_as::<_, RestaurantTable>(
            "SELECT * FROM restaurant_tables WHERE name = ?1 COLLATE NOCASE AND is_deleted = 0",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(table)
    }

    pub async fn load(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<Option<RestaurantTable>> {
        fetch(uow.conn(), id).await
    }

    pub async fn create(&self, uow: &mut UnitOfWork, name: &str, seats: i64) -> DbResult<RestaurantTable> {
        let now = Utc::now();
        let table = RestaurantTable {
            id: new_id(),
            name: name.to_string(),
            seats,
            status: TableStatus::Free,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %table.id, name = %table.name, "Inserting table");

        sqlx::query(
            r#"
            INSERT INTO restaurant_tables (id, name, seats, status, is_deleted, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&table.id)
        .bind(&table.name)
        .bind(table.seats)
        .bind(table.status)
        .bind(table.is_deleted)
        .bind(table.created_at)
        .bind(table.updated_at)
        .execute(uow.conn())
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("table", name),
            other => other,
        })?;

        uow.track(TrackedChange::added(&table));
        Ok(table)
    }

    pub async fn update(&self, uow: &mut UnitOfWork, table: &RestaurantTable) -> DbResult<RestaurantTable> {
        let before = self
            .load(uow, &table.id)
            .await?
            .ok_or_else(|| DbError::not_found("Table", &table.id))?;

        let mut after = table.clone();
        after.updated_at = Utc::now();

        if before.status != after.status {
            debug!(
                table = %after.name,
                from = before.status.label(),
                to = after.status.label(),
                "Table status change"
            );
        }

        sqlx::query(
            r#"
            UPDATE restaurant_tables SET
                name = ?2,
                seats = ?3,
                status = ?4,
                is_deleted = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(&after.id)
        .bind(&after.name)
        .bind(after.seats)
        .bind(after.status)
        .bind(after.is_deleted)
        .bind(after.updated_at)
        .execute(uow.conn())
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("table", &after.name),
            other => other,
        })?;

        uow.track(TrackedChange::modified(&before, &after));
        Ok(after)
    }

    /// Live tables with their open-order counts, for reconciliation.
    pub async fn occupancy(&self, uow: &mut UnitOfWork) -> DbResult<Vec<TableOccupancy>> {
        let rows = sqlx::query_as::<_, TableOccupancy>(
            r#"
            SELECT
                t.id,
                t.name,
                t.status,
                (SELECT COUNT(*) FROM orders o
                  WHERE o.table_id = t.id
                    AND o.status = 'open'
                    AND o.is_deleted = 0) AS open_orders
            FROM restaurant_tables t
            WHERE t.is_deleted = 0
            ORDER BY t.name
            "#,
        )
        .fetch_all(uow.conn())
        .await?;
        Ok(rows)
    }
}

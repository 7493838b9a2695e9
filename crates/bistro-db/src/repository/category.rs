//! # Category Repository
//!
//! Menu sections. Categories are only ever soft-deleted.

use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use bistro_core::{new_id, Category, TrackedChange};

use crate::error::{DbError, DbResult};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

async fn fetch<'e, E>(executor: E, id: &str) -> DbResult<Option<Category>>
where
    E: SqliteExecutor<'e>,
{
    let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(category)
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    /// Live categories in menu order.
    pub async fn list(&self) -> DbResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            WHERE is_deleted = 0
            ORDER BY sort_order, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    pub async fn find(&self, id: &str) -> DbResult<Option<Category>> {
        Ok(fetch(&self.pool, id).await?.filter(|c| !c.is_deleted))
    }

    pub async fn load(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<Option<Category>> {
        fetch(uow.conn(), id).await
    }

    pub async fn create(
        &self,
        uow: &mut UnitOfWork,
        name: &str,
        description: Option<&str>,
        sort_order: i64,
    ) -> DbResult<Category> {
        let now = Utc::now();
        let category = Category {
            id: new_id(),
            name: name.to_string(),
            description: description.map(str::to_string),
            sort_order,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %category.id, name = %category.name, "Inserting category");

        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description, sort_order, is_deleted, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.sort_order)
        .bind(category.is_deleted)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(uow.conn())
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("category", name),
            other => other,
        })?;

        uow.track(TrackedChange::added(&category));
        Ok(category)
    }

    /// Saves name, description, sort order and delete flag.
    pub async fn update(&self, uow: &mut UnitOfWork, category: &Category) -> DbResult<Category> {
        let before = self
            .load(uow, &category.id)
            .await?
            .ok_or_else(|| DbError::not_found("Category", &category.id))?;

        let mut after = category.clone();
        after.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE categories SET
                name = ?2,
                description = ?3,
                sort_order = ?4,
                is_deleted = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(&after.id)
        .bind(&after.name)
        .bind(&after.description)
        .bind(after.sort_order)
        .bind(after.is_deleted)
        .bind(after.updated_at)
        .execute(uow.conn())
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("category", &after.name),
            other => other,
        })?;

        uow.track(TrackedChange::modified(&before, &after));
        Ok(after)
    }

    pub async fn soft_delete(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<Category> {
        let mut category = self
            .load(uow, id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| DbError::not_found("Category", id))?;
        category.is_deleted = true;
        self.update(uow, &category).await
    }

    /// Live products still filed under the category.
    pub async fn count_products(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products WHERE category_id = ?1 AND is_deleted = 0",
        )
        .bind(id)
        .fetch_one(uow.conn())
        .await?;
        Ok(count)
    }
}

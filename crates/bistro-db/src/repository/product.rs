//! # Product Repository
//!
//! Database operations for menu items.
//!
//! ## FTS5 Search
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    How FTS5 Search Works                                │
//! │                                                                         │
//! │  Waiter types: "tom sou"                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  fts_query() → "tom"* "sou"*     (each word a quoted prefix)            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                            │
//! │  │ products_fts (name, description)        │                            │
//! │  │                                         │                            │
//! │  │ Tomato soup   | with basil             │ ← MATCH!                   │
//! │  │ Tom yum       | spicy soup             │ ← MATCH!                   │
//! │  │ Caesar salad  | romaine, parmesan      │                            │
//! │  └─────────────────────────────────────────┘                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  JOIN products ON rowid, skip soft-deleted, ORDER BY rank               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use bistro_core::{Product, TrackedChange};

use crate::error::{DbError, DbResult};
use crate::unit_of_work::UnitOfWork;

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let results = db.products().search("soup", 20).await?;
/// let product = db.products().find("uuid-here").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

async fn fetch<'e, E>(executor: E, id: &str) -> DbResult<Option<Product>>
where
    E: SqliteExecutor<'e>,
{
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(product)
}

/// Turns operator input into an FTS5 query: every word becomes a quoted
/// prefix term, so punctuation in the input cannot break the syntax.
pub fn fts_query(input: &str) -> Option<String> {
    let terms: Vec<String> = input
        .split_whitespace()
        .map(|word| format!("\"{}\"*", word.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Searches live products by name and description prefix.
    ///
    /// An empty query lists the menu instead.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        debug!(query = %query, limit = %limit, "Searching products");

        let Some(fts) = fts_query(query) else {
            let mut products = self.list(None).await?;
            products.truncate(limit as usize);
            return Ok(products);
        };

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT p.*
            FROM products_fts
            INNER JOIN products p ON p.rowid = products_fts.rowid
            WHERE products_fts MATCH ?1
              AND p.is_deleted = 0
            ORDER BY products_fts.rank
            LIMIT ?2
            "#,
        )
        .bind(fts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Live products, optionally of one category, sorted by name.
    pub async fn list(&self, category_id: Option<&str>) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE is_deleted = 0
              AND (?1 IS NULL OR category_id = ?1)
            ORDER BY name
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    pub async fn find(&self, id: &str) -> DbResult<Option<Product>> {
        Ok(fetch(&self.pool, id).await?.filter(|p| !p.is_deleted))
    }

    pub async fn find_including_deleted(&self, id: &str) -> DbResult<Option<Product>> {
        fetch(&self.pool, id).await
    }

    pub async fn load(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<Option<Product>> {
        fetch(uow.conn(), id).await
    }

    /// Inserts a new product (id generated beforehand).
    pub async fn insert(&self, uow: &mut UnitOfWork, product: &Product) -> DbResult<Product> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, category_id, name, description, price_cents,
                is_available, is_deleted, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.category_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.is_available)
        .bind(product.is_deleted)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(uow.conn())
        .await?;

        uow.track(TrackedChange::added(product));
        Ok(product.clone())
    }

    /// Updates an existing product and tracks the change.
    pub async fn update(&self, uow: &mut UnitOfWork, product: &Product) -> DbResult<Product> {
        debug!(id = %product.id, "Updating product");

        let before = self
            .load(uow, &product.id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &product.id))?;

        let mut after = product.clone();
        after.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE products SET
                category_id = ?2,
                name = ?3,
                description = ?4,
                price_cents = ?5,
                is_available = ?6,
                is_deleted = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(&after.id)
        .bind(&after.category_id)
        .bind(&after.name)
        .bind(&after.description)
        .bind(after.price_cents)
        .bind(after.is_available)
        .bind(after.is_deleted)
        .bind(after.updated_at)
        .execute(uow.conn())
        .await?;

        uow.track(TrackedChange::modified(&before, &after));
        Ok(after)
    }

    /// Takes a product off the menu for good, keeping the row for history.
    pub async fn soft_delete(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<Product> {
        let mut product = self
            .load(uow, id)
            .await?
            .filter(|p| !p.is_deleted)
            .ok_or_else(|| DbError::not_found("Product", id))?;
        product.is_deleted = true;
        self.update(uow, &product).await
    }

    /// Removes the row. Order lines keep their snapshot and lose the link.
    pub async fn hard_delete(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<Product> {
        let product = self
            .load(uow, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;

        debug!(id = %id, name = %product.name, "Deleting product");

        sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(uow.conn())
            .await?;

        uow.track(TrackedChange::deleted(&product));
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::audit::AuditFilter;
    use crate::repository::test_support::{db, insert_product};
    use bistro_core::{Actor, AuditAction};

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("  tom  sou ").unwrap(), "\"tom\"* \"sou\"*");
        assert_eq!(fts_query("a\"b").unwrap(), "\"a\"\"b\"*");
        assert_eq!(fts_query("   "), None);
    }

    #[tokio::test]
    async fn test_search_by_prefix() {
        let db = db().await;
        insert_product(&db, "Tomato soup", 650).await;
        insert_product(&db, "Tom yum", 900).await;
        insert_product(&db, "Caesar salad", 1100).await;

        let hits = db.products().search("tom", 10).await.unwrap();
        assert_eq!(hits.len(), 2);

        let hits = db.products().search("tom sou", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Tomato soup");

        // punctuation is harmless
        assert_eq!(db.products().search("soup)", 10).await.unwrap().len(), 1);

        let all = db.products().search("", 2).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_search_follows_renames_and_deletes() {
        let db = db().await;
        let soup = insert_product(&db, "Tomato soup", 650).await;

        let mut uow = db.begin(Actor::system()).await.unwrap();
        let mut renamed = soup.clone();
        renamed.name = "Gazpacho".to_string();
        db.products().update(&mut uow, &renamed).await.unwrap();
        uow.commit().await.unwrap();

        assert!(db.products().search("tomato", 10).await.unwrap().is_empty());
        assert_eq!(db.products().search("gazp", 10).await.unwrap().len(), 1);

        let mut uow = db.begin(Actor::system()).await.unwrap();
        db.products().soft_delete(&mut uow, &soup.id).await.unwrap();
        uow.commit().await.unwrap();

        assert!(db.products().search("gazp", 10).await.unwrap().is_empty());
        assert!(db.products().find(&soup.id).await.unwrap().is_none());
        assert!(db
            .products()
            .find_including_deleted(&soup.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_product_audit_trail() {
        let db = db().await;
        let soup = insert_product(&db, "Soup", 650).await;

        // availability alone is not audited
        let mut uow = db.begin(Actor::user("u1", "Maria")).await.unwrap();
        let mut sold_out = soup.clone();
        sold_out.is_available = false;
        db.products().update(&mut uow, &sold_out).await.unwrap();
        assert_eq!(uow.commit().await.unwrap(), 0);

        let mut uow = db.begin(Actor::user("u1", "Maria")).await.unwrap();
        let mut repriced = sold_out.clone();
        repriced.price_cents = 700;
        db.products().update(&mut uow, &repriced).await.unwrap();
        db.products().soft_delete(&mut uow, &soup.id).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = db.begin(Actor::user("u1", "Maria")).await.unwrap();
        db.products().hard_delete(&mut uow, &soup.id).await.unwrap();
        uow.commit().await.unwrap();

        let rows = db
            .audit_logs()
            .query(&AuditFilter {
                entity_type: Some("Product".to_string()),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        let actions: Vec<_> = rows.iter().map(|r| r.action).collect();
        // newest first; the price change and the soft delete folded into one
        assert_eq!(
            actions,
            vec![AuditAction::HardDelete, AuditAction::SoftDelete, AuditAction::Insert]
        );
        let changes: serde_json::Value = serde_json::from_str(&rows[1].changes).unwrap();
        assert_eq!(changes["price_cents"]["new"], 700);
    }
}

//! # Reports
//!
//! Sales figures over a `[from, to)` range of payment times. Only paid,
//! non-deleted orders count.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use bistro_core::Money;

use crate::error::DbResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SalesSummary {
    pub order_count: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

impl SalesSummary {
    /// Average ticket, truncated to the cent.
    pub fn average_ticket(&self) -> Money {
        if self.order_count == 0 {
            Money::zero()
        } else {
            Money::from_cents(self.total_cents / self.order_count)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TopProduct {
    pub name: String,
    pub quantity: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct WaiterSales {
    pub waiter_name: String,
    pub order_count: i64,
    pub total_cents: i64,
}

#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    pub async fn sales_summary(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> DbResult<SalesSummary> {
        let summary = sqlx::query_as::<_, SalesSummary>(
            r#"
            SELECT
                COUNT(*) AS order_count,
                COALESCE(SUM(subtotal_cents), 0) AS subtotal_cents,
                COALESCE(SUM(tax_cents), 0) AS tax_cents,
                COALESCE(SUM(total_cents), 0) AS total_cents
            FROM orders
            WHERE status = 'paid'
              AND is_deleted = 0
              AND paid_at >= ?1
              AND paid_at < ?2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(summary)
    }

    /// Best sellers by quantity. Lines of purged products group by name.
    pub async fn top_products(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<TopProduct>> {
        let rows = sqlx::query_as::<_, TopProduct>(
            r#"
            SELECT
                MAX(d.name_snapshot) AS name,
                SUM(d.quantity) AS quantity,
                SUM(d.line_total_cents) AS revenue_cents
            FROM order_details d
            INNER JOIN orders o ON o.id = d.order_id
            WHERE o.status = 'paid'
              AND o.is_deleted = 0
              AND d.is_deleted = 0
              AND o.paid_at >= ?1
              AND o.paid_at < ?2
            GROUP BY COALESCE(d.product_id, d.name_snapshot)
            ORDER BY quantity DESC, revenue_cents DESC, name
            LIMIT ?3
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn sales_by_waiter(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> DbResult<Vec<WaiterSales>> {
        let rows = sqlx::query_as::<_, WaiterSales>(
            r#"
            SELECT
                COALESCE(u.display_name, '(none)') AS waiter_name,
                COUNT(*) AS order_count,
                SUM(o.total_cents) AS total_cents
            FROM orders o
            LEFT JOIN users u ON u.id = o.waiter_id
            WHERE o.status = 'paid'
              AND o.is_deleted = 0
              AND o.paid_at >= ?1
              AND o.paid_at < ?2
            GROUP BY o.waiter_id
            ORDER BY total_cents DESC, waiter_name
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

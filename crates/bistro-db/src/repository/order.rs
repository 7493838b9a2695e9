//! # Order Repository
//!
//! Orders and their lines.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. OPEN          insert()            Order { status: open }            │
//! │  2. EDIT          insert_line() / update_line()                         │
//! │  3. SEND          update()            sent_to_kitchen = true            │
//! │                   └── from here on every edit is audited                │
//! │  4a. PAY          update()            status: paid                      │
//! │  4b. CANCEL       update() + update_line() for each line                │
//! │                   (soft delete; the lines' cascade is not audited)      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use bistro_core::{format_order_number, Order, OrderDetail, TrackedChange};

use crate::error::{DbError, DbResult};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

async fn fetch<'e, E>(executor: E, id: &str) -> DbResult<Option<Order>>
where
    E: SqliteExecutor<'e>,
{
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(order)
}

async fn fetch_line<'e, E>(executor: E, id: &str) -> DbResult<Option<OrderDetail>>
where
    E: SqliteExecutor<'e>,
{
    let line = sqlx::query_as::<_, OrderDetail>("SELECT * FROM order_details WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(line)
}

async fn fetch_lines<'e, E>(executor: E, order_id: &str) -> DbResult<Vec<OrderDetail>>
where
    E: SqliteExecutor<'e>,
{
    let lines = sqlx::query_as::<_, OrderDetail>(
        r#"
        SELECT * FROM order_details
        WHERE order_id = ?1 AND is_deleted = 0
        ORDER BY created_at, id
        "#,
    )
    .bind(order_id)
    .fetch_all(executor)
    .await?;
    Ok(lines)
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn find(&self, id: &str) -> DbResult<Option<Order>> {
        Ok(fetch(&self.pool, id).await?.filter(|o| !o.is_deleted))
    }

    pub async fn find_including_deleted(&self, id: &str) -> DbResult<Option<Order>> {
        fetch(&self.pool, id).await
    }

    pub async fn find_by_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE order_number = ?1 AND is_deleted = 0",
        )
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    /// Live lines of an order, in the order they were added.
    pub async fn lines(&self, order_id: &str) -> DbResult<Vec<OrderDetail>> {
        fetch_lines(&self.pool, order_id).await
    }

    pub async fn find_line(&self, id: &str) -> DbResult<Option<OrderDetail>> {
        Ok(fetch_line(&self.pool, id).await?.filter(|l| !l.is_deleted))
    }

    /// Open orders, oldest first.
    pub async fn list_open(&self) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE status = 'open' AND is_deleted = 0
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    /// The open order on a table, if any.
    pub async fn open_for_table(&self, table_id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE table_id = ?1 AND status = 'open' AND is_deleted = 0
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(table_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    /// Orders sent to the kitchen and not yet served, oldest first.
    pub async fn kitchen_queue(&self) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE sent_to_kitchen = 1
              AND kitchen_status != 'served'
              AND status != 'cancelled'
              AND is_deleted = 0
            ORDER BY sent_at, created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    /// Whether a user has ever been put on an order.
    pub async fn count_for_waiter(&self, uow: &mut UnitOfWork, user_id: &str) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE waiter_id = ?1")
            .bind(user_id)
            .fetch_one(uow.conn())
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Reads inside a unit of work
    // =========================================================================

    pub async fn load(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<Option<Order>> {
        fetch(uow.conn(), id).await
    }

    pub async fn load_line(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<Option<OrderDetail>> {
        fetch_line(uow.conn(), id).await
    }

    pub async fn load_lines(&self, uow: &mut UnitOfWork, order_id: &str) -> DbResult<Vec<OrderDetail>> {
        fetch_lines(uow.conn(), order_id).await
    }

    /// Live open orders on a table, excluding `except_order_id`.
    pub async fn count_open_for_table(
        &self,
        uow: &mut UnitOfWork,
        table_id: &str,
        except_order_id: Option<&str>,
    ) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE table_id = ?1
              AND status = 'open'
              AND is_deleted = 0
              AND (?2 IS NULL OR id != ?2)
            "#,
        )
        .bind(table_id)
        .bind(except_order_id)
        .fetch_one(uow.conn())
        .await?;
        Ok(count)
    }

    /// Next printed number for the business date: `YYMMDD-NNNN`.
    pub async fn next_order_number(&self, uow: &mut UnitOfWork, date: NaiveDate) -> DbResult<String> {
        let prefix = date.format("%y%m%d").to_string();

        let taken = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM orders WHERE order_number LIKE ?1 || '-%'",
        )
        .bind(&prefix)
        .fetch_one(uow.conn())
        .await?;

        Ok(format_order_number(date, taken + 1))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub async fn insert(&self, uow: &mut UnitOfWork, order: &Order) -> DbResult<Order> {
        debug!(id = %order.id, order_number = %order.order_number, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, table_id, waiter_id, status,
                sent_to_kitchen, sent_at, kitchen_status,
                subtotal_cents, tax_cents, total_cents,
                payment_method, paid_at, note, is_deleted,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10, ?11,
                ?12, ?13, ?14, ?15,
                ?16, ?17
            )
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(&order.table_id)
        .bind(&order.waiter_id)
        .bind(order.status)
        .bind(order.sent_to_kitchen)
        .bind(order.sent_at)
        .bind(order.kitchen_status)
        .bind(order.subtotal_cents)
        .bind(order.tax_cents)
        .bind(order.total_cents)
        .bind(order.payment_method)
        .bind(order.paid_at)
        .bind(&order.note)
        .bind(order.is_deleted)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(uow.conn())
        .await?;

        uow.track(TrackedChange::added(order));
        Ok(order.clone())
    }

    pub async fn update(&self, uow: &mut UnitOfWork, order: &Order) -> DbResult<Order> {
        let before = self
            .load(uow, &order.id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", &order.id))?;

        let mut after = order.clone();
        after.updated_at = Utc::now();

        debug!(id = %after.id, order_number = %after.order_number, "Updating order");

        sqlx::query(
            r#"
            UPDATE orders SET
                table_id = ?2,
                waiter_id = ?3,
                status = ?4,
                sent_to_kitchen = ?5,
                sent_at = ?6,
                kitchen_status = ?7,
                subtotal_cents = ?8,
                tax_cents = ?9,
                total_cents = ?10,
                payment_method = ?11,
                paid_at = ?12,
                note = ?13,
                is_deleted = ?14,
                updated_at = ?15
            WHERE id = ?1
            "#,
        )
        .bind(&after.id)
        .bind(&after.table_id)
        .bind(&after.waiter_id)
        .bind(after.status)
        .bind(after.sent_to_kitchen)
        .bind(after.sent_at)
        .bind(after.kitchen_status)
        .bind(after.subtotal_cents)
        .bind(after.tax_cents)
        .bind(after.total_cents)
        .bind(after.payment_method)
        .bind(after.paid_at)
        .bind(&after.note)
        .bind(after.is_deleted)
        .bind(after.updated_at)
        .execute(uow.conn())
        .await?;

        uow.track(TrackedChange::modified(&before, &after));
        Ok(after)
    }

    pub async fn insert_line(&self, uow: &mut UnitOfWork, line: &OrderDetail) -> DbResult<OrderDetail> {
        debug!(order_id = %line.order_id, name = %line.name_snapshot, "Inserting order line");

        sqlx::query(
            r#"
            INSERT INTO order_details (
                id, order_id, product_id, name_snapshot, unit_price_cents,
                quantity, line_total_cents, note, kitchen_status, is_deleted,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&line.id)
        .bind(&line.order_id)
        .bind(&line.product_id)
        .bind(&line.name_snapshot)
        .bind(line.unit_price_cents)
        .bind(line.quantity)
        .bind(line.line_total_cents)
        .bind(&line.note)
        .bind(line.kitchen_status)
        .bind(line.is_deleted)
        .bind(line.created_at)
        .bind(line.updated_at)
        .execute(uow.conn())
        .await
        .map_err(|e| {
            DbError::from(e).with_reference(format!(
                "order line points at a missing order ({}) or product",
                line.order_id
            ))
        })?;

        uow.track(TrackedChange::added(line));
        Ok(line.clone())
    }

    /// Saves a line. The parent order's stored `sent_to_kitchen` travels
    /// with the tracked change.
    pub async fn update_line(&self, uow: &mut UnitOfWork, line: &OrderDetail) -> DbResult<OrderDetail> {
        let before = self
            .load_line(uow, &line.id)
            .await?
            .ok_or_else(|| DbError::not_found("Order line", &line.id))?;

        let parent_sent = sqlx::query_scalar::<_, bool>("SELECT sent_to_kitchen FROM orders WHERE id = ?1")
            .bind(&before.order_id)
            .fetch_optional(uow.conn())
            .await?
            .unwrap_or(false);

        let mut after = line.clone();
        after.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE order_details SET
                quantity = ?2,
                line_total_cents = ?3,
                note = ?4,
                kitchen_status = ?5,
                is_deleted = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&after.id)
        .bind(after.quantity)
        .bind(after.line_total_cents)
        .bind(&after.note)
        .bind(after.kitchen_status)
        .bind(after.is_deleted)
        .bind(after.updated_at)
        .execute(uow.conn())
        .await?;

        uow.track(TrackedChange::modified(&before, &after).with_parent_sent(parent_sent));
        Ok(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::audit::AuditFilter;
    use crate::repository::test_support::{db, insert_product, insert_user};
    use crate::Database;
    use bistro_core::{new_id, Actor, AuditAction, KitchenStatus, OrderStatus};
    use chrono::Utc;

    fn new_order(number: &str) -> Order {
        let now = Utc::now();
        Order {
            id: new_id(),
            order_number: number.to_string(),
            table_id: None,
            waiter_id: None,
            status: OrderStatus::Open,
            sent_to_kitchen: false,
            sent_at: None,
            kitchen_status: KitchenStatus::Pending,
            subtotal_cents: 0,
            tax_cents: 0,
            total_cents: 0,
            payment_method: None,
            paid_at: None,
            note: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn new_line(order: &Order, name: &str, price: i64, qty: i64) -> OrderDetail {
        let now = Utc::now();
        OrderDetail {
            id: new_id(),
            order_id: order.id.clone(),
            product_id: None,
            name_snapshot: name.to_string(),
            unit_price_cents: price,
            quantity: qty,
            line_total_cents: price * qty,
            note: None,
            kitchen_status: KitchenStatus::Pending,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    async fn order_with_lines(db: &Database) -> (Order, Vec<OrderDetail>) {
        let mut uow = db.begin(Actor::system()).await.unwrap();
        let order = db.orders().insert(&mut uow, &new_order("260101-0001")).await.unwrap();
        let a = db.orders().insert_line(&mut uow, &new_line(&order, "Soup", 650, 1)).await.unwrap();
        let b = db.orders().insert_line(&mut uow, &new_line(&order, "Bread", 200, 2)).await.unwrap();
        assert_eq!(uow.commit().await.unwrap(), 0);
        (order, vec![a, b])
    }

    async fn waiter_uow(db: &Database) -> UnitOfWork {
        db.begin(Actor::user("w1", "Walt")).await.unwrap()
    }

    async fn audit_types(db: &Database) -> Vec<(String, AuditAction)> {
        db.audit_logs()
            .query(&AuditFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.entity_type, r.action))
            .collect()
    }

    #[tokio::test]
    async fn test_edits_before_sending_are_not_audited() {
        let db = db().await;
        let (order, lines) = order_with_lines(&db).await;

        let mut uow = waiter_uow(&db).await;
        let mut line = lines[0].clone();
        line.set_quantity(3);
        db.orders().update_line(&mut uow, &line).await.unwrap();
        let mut order = order.clone();
        order.note = Some("window seat".to_string());
        db.orders().update(&mut uow, &order).await.unwrap();
        assert_eq!(uow.commit().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_edits_after_sending_are_audited() {
        let db = db().await;
        let (order, lines) = order_with_lines(&db).await;

        let mut uow = waiter_uow(&db).await;
        let mut sent = order.clone();
        sent.sent_to_kitchen = true;
        sent.sent_at = Some(Utc::now());
        db.orders().update(&mut uow, &sent).await.unwrap();
        assert_eq!(uow.commit().await.unwrap(), 1);

        // the parent is not part of this unit of work: its stored flag counts
        let mut uow = waiter_uow(&db).await;
        let mut line = lines[1].clone();
        line.set_quantity(4);
        db.orders().update_line(&mut uow, &line).await.unwrap();
        assert_eq!(uow.commit().await.unwrap(), 1);

        assert_eq!(
            audit_types(&db).await,
            vec![
                ("OrderDetail".to_string(), AuditAction::Update),
                ("Order".to_string(), AuditAction::Update),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_cascade_audits_order_only() {
        let db = db().await;
        let (order, _) = order_with_lines(&db).await;

        let mut uow = waiter_uow(&db).await;
        let mut sent = order.clone();
        sent.sent_to_kitchen = true;
        let sent = db.orders().update(&mut uow, &sent).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = waiter_uow(&db).await;
        let mut cancelled = sent.clone();
        cancelled.status = OrderStatus::Cancelled;
        cancelled.is_deleted = true;
        db.orders().update(&mut uow, &cancelled).await.unwrap();
        for mut line in db.orders().load_lines(&mut uow, &order.id).await.unwrap() {
            line.is_deleted = true;
            db.orders().update_line(&mut uow, &line).await.unwrap();
        }
        assert_eq!(uow.commit().await.unwrap(), 1);

        let types = audit_types(&db).await;
        assert_eq!(types[0], ("Order".to_string(), AuditAction::SoftDelete));
        assert!(db.orders().find(&order.id).await.unwrap().is_none());
        assert!(db.orders().lines(&order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kitchen_queue_and_numbers() {
        let db = db().await;
        let (order, _) = order_with_lines(&db).await;
        assert!(db.orders().kitchen_queue().await.unwrap().is_empty());

        let mut uow = waiter_uow(&db).await;
        let mut sent = order.clone();
        sent.sent_to_kitchen = true;
        sent.sent_at = Some(Utc::now());
        db.orders().update(&mut uow, &sent).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let number = db.orders().next_order_number(&mut uow, date).await.unwrap();
        assert_eq!(number, "260101-0002");
        uow.commit().await.unwrap();

        let queue = db.orders().kitchen_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, order.id);
        assert_eq!(db.orders().lines(&order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_purged_product_leaves_line_snapshot() {
        let db = db().await;
        let soup = insert_product(&db, "Soup", 650).await;

        let mut uow = waiter_uow(&db).await;
        let order = db.orders().insert(&mut uow, &new_order("260101-0001")).await.unwrap();
        let mut line = new_line(&order, "Soup", 650, 1);
        line.product_id = Some(soup.id.clone());
        let line = db.orders().insert_line(&mut uow, &line).await.unwrap();
        db.products().hard_delete(&mut uow, &soup.id).await.unwrap();
        uow.commit().await.unwrap();

        let kept = db.orders().find_line(&line.id).await.unwrap().unwrap();
        assert_eq!(kept.product_id, None);
        assert_eq!(kept.name_snapshot, "Soup");
    }

    #[tokio::test]
    async fn test_line_for_missing_order_is_a_reference_error() {
        let db = db().await;
        let ghost = new_order("260101-0009");

        let mut uow = waiter_uow(&db).await;
        let err = db
            .orders()
            .insert_line(&mut uow, &new_line(&ghost, "Soup", 650, 1))
            .await
            .unwrap_err();
        match err {
            DbError::ForeignKeyViolation { message } => assert!(message.contains(&ghost.id)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_purging_a_waiter_with_orders_names_the_user() {
        let db = db().await;
        let walt = insert_user(&db, "walt", bistro_core::UserRole::Waiter).await;

        let mut uow = waiter_uow(&db).await;
        let mut order = new_order("260101-0001");
        order.waiter_id = Some(walt.id.clone());
        db.orders().insert(&mut uow, &order).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = db.begin(Actor::system()).await.unwrap();
        let err = db.users().purge(&mut uow, &walt.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Foreign key violation: user walt still has orders");
    }
}

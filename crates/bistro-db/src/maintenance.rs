//! Startup maintenance.

use tracing::{info, warn};

use bistro_core::table_state::derive_status;
use bistro_core::{Actor, TableStatus};

use crate::error::{DbError, DbResult};
use crate::pool::Database;

/// A table whose stored status disagreed with its orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRepair {
    pub table_id: String,
    pub table_name: String,
    pub from: TableStatus,
    pub to: TableStatus,
}

/// Re-derives every table's status from its open orders and fixes drift.
///
/// A table with an open order is Busy, a Busy table without one is Free, and
/// a Paid table keeps waiting to be cleared.
pub async fn reconcile_table_status(db: &Database) -> DbResult<Vec<TableRepair>> {
    let mut uow = db.begin(Actor::system()).await?;
    let tables = db.tables();
    let mut repairs = Vec::new();

    for row in tables.occupancy(&mut uow).await? {
        let derived = derive_status(row.status, row.open_orders);
        if derived == row.status {
            continue;
        }

        warn!(
            table = %row.name,
            from = row.status.label(),
            to = derived.label(),
            open_orders = row.open_orders,
            "Repairing table status"
        );

        let mut table = tables
            .load(&mut uow, &row.id)
            .await?
            .ok_or_else(|| DbError::not_found("Table", &row.id))?;
        table.status = derived;
        tables.update(&mut uow, &table).await?;

        repairs.push(TableRepair {
            table_id: row.id,
            table_name: row.name,
            from: row.status,
            to: derived,
        });
    }

    uow.commit().await?;
    info!(repaired = repairs.len(), "Table status reconciliation finished");
    Ok(repairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, insert_table};
    use bistro_core::{new_id, KitchenStatus, Order, OrderStatus};
    use chrono::Utc;

    #[tokio::test]
    async fn test_drift_is_repaired() {
        let db = db().await;
        let busy_without_order = insert_table(&db, "T1").await;
        let free_with_order = insert_table(&db, "T2").await;
        let paid = insert_table(&db, "T3").await;

        let mut uow = db.begin(Actor::system()).await.unwrap();
        let mut t1 = busy_without_order.clone();
        t1.status = TableStatus::Busy;
        db.tables().update(&mut uow, &t1).await.unwrap();
        let mut t3 = paid.clone();
        t3.status = TableStatus::Paid;
        db.tables().update(&mut uow, &t3).await.unwrap();

        let now = Utc::now();
        let order = Order {
            id: new_id(),
            order_number: "260101-0001".to_string(),
            table_id: Some(free_with_order.id.clone()),
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
        };
        db.orders().insert(&mut uow, &order).await.unwrap();
        uow.commit().await.unwrap();

        let repairs = reconcile_table_status(&db).await.unwrap();
        assert_eq!(repairs.len(), 2);
        assert_eq!(repairs[0].table_name, "T1");
        assert_eq!(repairs[0].to, TableStatus::Free);
        assert_eq!(repairs[1].table_name, "T2");
        assert_eq!(repairs[1].to, TableStatus::Busy);

        let t3 = db.tables().find(&paid.id).await.unwrap().unwrap();
        assert_eq!(t3.status, TableStatus::Paid);

        assert!(reconcile_table_status(&db).await.unwrap().is_empty());
    }
}

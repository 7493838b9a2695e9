//! # Order Commands
//!
//! The order editor: open a check on a table, add and edit lines, send to
//! the kitchen, take payment or cancel.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  open_order ──► add_item / update_item / remove_item ──┐                │
//! │   (table Busy)        ▲                                │                │
//! │                       │                                ▼                │
//! │                       └──────────────────────── send_to_kitchen         │
//! │                                                        │                │
//! │           ┌────────────────────────────────────────────┤                │
//! │           ▼                                            ▼                │
//! │     pay_order (table Paid)              cancel_order (table Free)       │
//! │                                                                         │
//! │  Before sending, edits are invisible to the audit log.                  │
//! │  After sending, every edit of the order or its lines is audited.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each command runs in one unit of work: the line change, the recomputed
//! totals and the table status commit (and get audited) together.
//!
//! Orders can be addressed by id or by their printed number.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use bistro_core::validation::{validate_note, validate_quantity};
use bistro_core::{
    new_id, CoreError, KitchenStatus, Money, Order, OrderDetail, OrderStatus, OrderTotals,
    PaymentMethod, Permission, TableEvent, TableStatus, MAX_ORDER_LINES,
};
use bistro_db::{Database, UnitOfWork};

use crate::commands::tables::resolve_table;
use crate::error::{ApiError, ApiResult};
use crate::state::{DbState, SessionState};

// =============================================================================
// DTOs
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineDto {
    pub id: String,
    pub product_id: Option<String>,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
    pub note: Option<String>,
    pub kitchen_status: KitchenStatus,
}

impl From<OrderDetail> for OrderLineDto {
    fn from(d: OrderDetail) -> Self {
        OrderLineDto {
            id: d.id,
            product_id: d.product_id,
            name: d.name_snapshot,
            unit_price_cents: d.unit_price_cents,
            quantity: d.quantity,
            line_total_cents: d.line_total_cents,
            note: d.note,
            kitchen_status: d.kitchen_status,
        }
    }
}

/// An order with its live lines, as shown on the order editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub id: String,
    pub order_number: String,
    pub table_id: Option<String>,
    pub table_name: Option<String>,
    pub waiter_id: Option<String>,
    pub waiter_name: Option<String>,
    pub status: OrderStatus,
    pub sent_to_kitchen: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub kitchen_status: KitchenStatus,
    pub lines: Vec<OrderLineDto>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub paid_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderDto {
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItem {
    pub order: String,
    pub product_id: String,
    pub quantity: i64,
    pub note: Option<String>,
}

// =============================================================================
// Helpers
// =============================================================================

/// Builds the DTO through the pool. Call only after the unit of work is
/// committed or dropped.
pub(crate) async fn order_dto(db: &Database, order: Order) -> ApiResult<OrderDto> {
    let lines = db.orders().lines(&order.id).await?;

    let table_name = match &order.table_id {
        Some(id) => db.tables().find(id).await?.map(|t| t.name),
        None => None,
    };
    let waiter_name = match &order.waiter_id {
        Some(id) => db
            .users()
            .find_including_deleted(id)
            .await?
            .map(|u| u.display_name),
        None => None,
    };

    Ok(OrderDto {
        id: order.id,
        order_number: order.order_number,
        table_id: order.table_id,
        table_name,
        waiter_id: order.waiter_id,
        waiter_name,
        status: order.status,
        sent_to_kitchen: order.sent_to_kitchen,
        sent_at: order.sent_at,
        kitchen_status: order.kitchen_status,
        lines: lines.into_iter().map(OrderLineDto::from).collect(),
        subtotal_cents: order.subtotal_cents,
        tax_cents: order.tax_cents,
        total_cents: order.total_cents,
        payment_method: order.payment_method,
        paid_at: order.paid_at,
        note: order.note,
        created_at: order.created_at,
    })
}

/// Looks an order up by id or, failing that, by printed number.
pub(crate) async fn resolve_order(db: &Database, id_or_number: &str) -> ApiResult<Order> {
    if let Some(order) = db.orders().find(id_or_number).await? {
        return Ok(order);
    }
    db.orders()
        .find_by_number(id_or_number)
        .await?
        .ok_or_else(|| ApiError::not_found("Order", id_or_number))
}

/// Reloads the order inside the unit of work and checks it is still open.
async fn load_open(
    db: &Database,
    uow: &mut UnitOfWork,
    order_id: &str,
    operation: &str,
) -> ApiResult<Order> {
    let order = db
        .orders()
        .load(uow, order_id)
        .await?
        .filter(|o| !o.is_deleted)
        .ok_or_else(|| ApiError::not_found("Order", order_id))?;

    if !order.is_open() {
        return Err(CoreError::InvalidOrderState {
            order_number: order.order_number,
            status: order.status.as_str().to_string(),
            operation: operation.to_string(),
        }
        .into());
    }
    Ok(order)
}

/// Recomputes the order's totals from its live lines.
async fn refresh_totals(db: &Database, uow: &mut UnitOfWork, order: &mut Order) -> ApiResult<usize> {
    let lines = db.orders().load_lines(uow, &order.id).await?;
    let bps = db.settings().tax_rate_bps_in(uow).await?;
    let totals = OrderTotals::compute(&lines, bps);

    order.subtotal_cents = totals.subtotal.cents();
    order.tax_cents = totals.tax.cents();
    order.total_cents = totals.total.cents();
    Ok(lines.len())
}

// =============================================================================
// Commands
// =============================================================================

/// Opens a new check on a free table and seats it.
pub async fn open_order(
    db: &DbState,
    session: &SessionState,
    table: &str,
    note: Option<&str>,
) -> ApiResult<OrderDto> {
    let me = session.require(Permission::TakeOrders).await?;
    let note = validate_note(note)?;

    let db = db.read().await;
    let table_id = resolve_table(&db, table).await?.id;

    let mut uow = db.begin(me.actor()).await?;
    let mut table = db
        .tables()
        .load(&mut uow, &table_id)
        .await?
        .filter(|t| !t.is_deleted)
        .ok_or_else(|| ApiError::not_found("Table", &table_id))?;
    table.status = table.status.apply(TableEvent::Open)?;

    let now = Utc::now();
    let order_number = db
        .orders()
        .next_order_number(&mut uow, Local::now().date_naive())
        .await?;
    let order = Order {
        id: new_id(),
        order_number,
        table_id: Some(table.id.clone()),
        waiter_id: Some(me.user_id.clone()),
        status: OrderStatus::Open,
        sent_to_kitchen: false,
        sent_at: None,
        kitchen_status: KitchenStatus::Pending,
        subtotal_cents: 0,
        tax_cents: 0,
        total_cents: 0,
        payment_method: None,
        paid_at: None,
        note,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };
    let order = db.orders().insert(&mut uow, &order).await?;
    db.tables().update(&mut uow, &table).await?;
    uow.commit().await?;

    info!(order = %order.order_number, table = %table.name, waiter = %me.username, "Order opened");
    order_dto(&db, order).await
}

/// Adds a product to an order.
///
/// Before the order is sent, another unit of the same product without a
/// note is merged into its existing line. Name and price are copied from
/// the menu at this moment.
pub async fn add_item(db: &DbState, session: &SessionState, input: AddItem) -> ApiResult<OrderDto> {
    let me = session.require(Permission::TakeOrders).await?;
    let quantity = validate_quantity(input.quantity)?;
    let note = validate_note(input.note.as_deref())?;

    let db = db.read().await;
    let order_id = resolve_order(&db, &input.order).await?.id;

    let mut uow = db.begin(me.actor()).await?;
    let mut order = load_open(&db, &mut uow, &order_id, "add items").await?;

    let product = db
        .products()
        .load(&mut uow, &input.product_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", &input.product_id))?;
    if !product.can_order() {
        return Err(CoreError::ProductUnavailable(product.name).into());
    }

    let lines = db.orders().load_lines(&mut uow, &order.id).await?;
    let line_count = lines.len();
    let mergeable = lines.into_iter().find(|line| {
        !order.sent_to_kitchen
            && note.is_none()
            && line.note.is_none()
            && line.product_id.as_deref() == Some(product.id.as_str())
    });

    match mergeable {
        Some(mut line) => {
            let merged = validate_quantity(line.quantity + quantity)?;
            line.set_quantity(merged);
            debug!(line = %line.id, quantity = merged, "Merging into existing line");
            db.orders().update_line(&mut uow, &line).await?;
        }
        None => {
            if line_count >= MAX_ORDER_LINES {
                return Err(CoreError::OrderTooLarge { max: MAX_ORDER_LINES }.into());
            }
            let now = Utc::now();
            let line = OrderDetail {
                id: new_id(),
                order_id: order.id.clone(),
                product_id: Some(product.id.clone()),
                name_snapshot: product.name.clone(),
                unit_price_cents: product.price_cents,
                quantity,
                line_total_cents: product.price_cents * quantity,
                note,
                kitchen_status: KitchenStatus::Pending,
                is_deleted: false,
                created_at: now,
                updated_at: now,
            };
            db.orders().insert_line(&mut uow, &line).await?;
        }
    }

    // New food on a finished ticket puts it back in the queue.
    if order.sent_to_kitchen
        && matches!(order.kitchen_status, KitchenStatus::Ready | KitchenStatus::Served)
    {
        order.kitchen_status = KitchenStatus::Pending;
    }
    refresh_totals(&db, &mut uow, &mut order).await?;
    let order = db.orders().update(&mut uow, &order).await?;
    uow.commit().await?;

    info!(order = %order.order_number, product = %product.name, quantity, "Item added");
    order_dto(&db, order).await
}

/// Changes a line's quantity and note. Quantity 0 removes the line.
pub async fn update_item(
    db: &DbState,
    session: &SessionState,
    line_id: &str,
    quantity: i64,
    note: Option<&str>,
) -> ApiResult<OrderDto> {
    let me = session.require(Permission::TakeOrders).await?;
    let quantity = if quantity == 0 { 0 } else { validate_quantity(quantity)? };
    let note = note.map(|n| validate_note(Some(n))).transpose()?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let mut line = db
        .orders()
        .load_line(&mut uow, line_id)
        .await?
        .filter(|l| !l.is_deleted)
        .ok_or_else(|| ApiError::not_found("Order line", line_id))?;
    let mut order = load_open(&db, &mut uow, &line.order_id, "edit items").await?;

    if quantity == 0 {
        line.is_deleted = true;
    } else {
        line.set_quantity(quantity);
    }
    if let Some(note) = note {
        line.note = note;
    }
    db.orders().update_line(&mut uow, &line).await?;

    refresh_totals(&db, &mut uow, &mut order).await?;
    let order = db.orders().update(&mut uow, &order).await?;
    uow.commit().await?;

    debug!(order = %order.order_number, line = %line.id, quantity, "Item updated");
    order_dto(&db, order).await
}

/// Takes a line off the order.
pub async fn remove_item(db: &DbState, session: &SessionState, line_id: &str) -> ApiResult<OrderDto> {
    update_item(db, session, line_id, 0, None).await
}

/// Hands the order to the kitchen. From here on every edit is audited.
pub async fn send_to_kitchen(db: &DbState, session: &SessionState, order: &str) -> ApiResult<OrderDto> {
    let me = session.require(Permission::TakeOrders).await?;

    let db = db.read().await;
    let order_id = resolve_order(&db, order).await?.id;

    let mut uow = db.begin(me.actor()).await?;
    let mut order = load_open(&db, &mut uow, &order_id, "send to the kitchen").await?;
    if order.sent_to_kitchen {
        return Err(ApiError::business(format!(
            "Order {} is already in the kitchen",
            order.order_number
        )));
    }
    if refresh_totals(&db, &mut uow, &mut order).await? == 0 {
        return Err(CoreError::EmptyOrder(order.order_number).into());
    }

    order.sent_to_kitchen = true;
    order.sent_at = Some(Utc::now());
    order.kitchen_status = KitchenStatus::Pending;
    let order = db.orders().update(&mut uow, &order).await?;
    uow.commit().await?;

    info!(order = %order.order_number, "Order sent to kitchen");
    order_dto(&db, order).await
}

/// Settles the order and marks its table Paid.
pub async fn pay_order(
    db: &DbState,
    session: &SessionState,
    order: &str,
    method: PaymentMethod,
) -> ApiResult<OrderDto> {
    let me = session.require(Permission::TakePayments).await?;

    let db = db.read().await;
    let order_id = resolve_order(&db, order).await?.id;

    let mut uow = db.begin(me.actor()).await?;
    let mut order = load_open(&db, &mut uow, &order_id, "take payment").await?;
    if refresh_totals(&db, &mut uow, &mut order).await? == 0 {
        return Err(CoreError::EmptyOrder(order.order_number).into());
    }

    order.status = OrderStatus::Paid;
    order.payment_method = Some(method);
    order.paid_at = Some(Utc::now());
    let order = db.orders().update(&mut uow, &order).await?;

    if let Some(table_id) = &order.table_id {
        let others = db
            .orders()
            .count_open_for_table(&mut uow, table_id, Some(&order.id))
            .await?;
        if let Some(mut table) = db.tables().load(&mut uow, table_id).await? {
            if others == 0 && table.status == TableStatus::Busy {
                table.status = table.status.apply(TableEvent::Pay)?;
                db.tables().update(&mut uow, &table).await?;
            }
        }
    }
    uow.commit().await?;

    info!(
        order = %order.order_number,
        total = %order.total(),
        method = method.as_str(),
        "Order paid"
    );
    order_dto(&db, order).await
}

/// Cancels an open order: the order and all its lines are soft-deleted in
/// one unit of work, and the table is freed when nothing else is open on it.
pub async fn cancel_order(db: &DbState, session: &SessionState, order: &str) -> ApiResult<()> {
    let me = session.require(Permission::TakeOrders).await?;

    let db = db.read().await;
    let order_id = resolve_order(&db, order).await?.id;

    let mut uow = db.begin(me.actor()).await?;
    let mut order = load_open(&db, &mut uow, &order_id, "cancel").await?;

    order.status = OrderStatus::Cancelled;
    order.is_deleted = true;
    let order = db.orders().update(&mut uow, &order).await?;

    for mut line in db.orders().load_lines(&mut uow, &order.id).await? {
        line.is_deleted = true;
        db.orders().update_line(&mut uow, &line).await?;
    }

    if let Some(table_id) = &order.table_id {
        let others = db
            .orders()
            .count_open_for_table(&mut uow, table_id, Some(&order.id))
            .await?;
        if let Some(mut table) = db.tables().load(&mut uow, table_id).await? {
            if others == 0 && table.status == TableStatus::Busy {
                table.status = table.status.apply(TableEvent::Cancel)?;
                db.tables().update(&mut uow, &table).await?;
            }
        }
    }
    uow.commit().await?;

    info!(order = %order.order_number, by = %me.username, "Order cancelled");
    Ok(())
}

pub async fn get_order(db: &DbState, session: &SessionState, order: &str) -> ApiResult<OrderDto> {
    session.require(Permission::TakeOrders).await?;
    let db = db.read().await;
    let order = resolve_order(&db, order).await?;
    order_dto(&db, order).await
}

/// Open orders, oldest first.
pub async fn list_open_orders(db: &DbState, session: &SessionState) -> ApiResult<Vec<OrderDto>> {
    session.require(Permission::TakeOrders).await?;
    let db = db.read().await;

    let mut dtos = Vec::new();
    for order in db.orders().list_open().await? {
        dtos.push(order_dto(&db, order).await?);
    }
    Ok(dtos)
}

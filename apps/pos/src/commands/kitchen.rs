//! # Kitchen Display
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  260307-0004  T3  Maria              12 min   PREPARING                 │
//! │    2x Margherita Pizza                        ready                     │
//! │    1x Grilled Salmon                          preparing                 │
//! │       * no butter                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The queue holds every order sent to the kitchen and not yet served,
//! oldest first. Status changes on lines roll up to the order: the first
//! line started moves the ticket to preparing, and once every line is
//! ready or served the ticket follows. Serving a whole ticket serves its
//! lines.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use bistro_core::{KitchenStatus, OrderDetail, Permission};

use crate::commands::orders::{order_dto, resolve_order, OrderLineDto};
use crate::error::{ApiError, ApiResult};
use crate::state::{DbState, SessionState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitchenTicket {
    pub order_id: String,
    pub order_number: String,
    pub table_name: Option<String>,
    pub waiter_name: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub kitchen_status: KitchenStatus,
    pub lines: Vec<OrderLineDto>,
}

fn rank(status: KitchenStatus) -> u8 {
    match status {
        KitchenStatus::Pending => 0,
        KitchenStatus::Preparing => 1,
        KitchenStatus::Ready => 2,
        KitchenStatus::Served => 3,
    }
}

/// Ticket status implied by its lines. `None` for an order without lines.
fn rolled_up(lines: &[OrderDetail]) -> Option<KitchenStatus> {
    let slowest = lines.iter().map(|l| l.kitchen_status).min_by_key(|s| rank(*s))?;
    let started = lines
        .iter()
        .any(|l| l.kitchen_status != KitchenStatus::Pending);

    Some(if slowest == KitchenStatus::Pending && started {
        KitchenStatus::Preparing
    } else {
        slowest
    })
}

pub async fn kitchen_queue(db: &DbState, session: &SessionState) -> ApiResult<Vec<KitchenTicket>> {
    session.require(Permission::ViewKitchen).await?;
    let db = db.read().await;

    let mut tickets = Vec::new();
    for order in db.orders().kitchen_queue().await? {
        let dto = order_dto(&db, order).await?;
        tickets.push(KitchenTicket {
            order_id: dto.id,
            order_number: dto.order_number,
            table_name: dto.table_name,
            waiter_name: dto.waiter_name,
            sent_at: dto.sent_at,
            kitchen_status: dto.kitchen_status,
            lines: dto.lines,
        });
    }
    Ok(tickets)
}

/// Sets the status of a whole ticket. Serving it serves every line.
pub async fn set_order_kitchen_status(
    db: &DbState,
    session: &SessionState,
    order: &str,
    status: KitchenStatus,
) -> ApiResult<()> {
    let me = session.require(Permission::UpdateKitchen).await?;

    let db = db.read().await;
    let order_id = resolve_order(&db, order).await?.id;

    let mut uow = db.begin(me.actor()).await?;
    let mut order = db
        .orders()
        .load(&mut uow, &order_id)
        .await?
        .filter(|o| !o.is_deleted)
        .ok_or_else(|| ApiError::not_found("Order", &order_id))?;
    if !order.sent_to_kitchen {
        return Err(ApiError::business(format!(
            "Order {} has not been sent to the kitchen",
            order.order_number
        )));
    }

    if status == KitchenStatus::Served {
        for mut line in db.orders().load_lines(&mut uow, &order.id).await? {
            if line.kitchen_status != KitchenStatus::Served {
                line.kitchen_status = KitchenStatus::Served;
                db.orders().update_line(&mut uow, &line).await?;
            }
        }
    }
    order.kitchen_status = status;
    let order = db.orders().update(&mut uow, &order).await?;
    uow.commit().await?;

    info!(order = %order.order_number, status = status.as_str(), "Ticket status changed");
    Ok(())
}

/// Sets the status of one line and rolls the change up to its ticket.
pub async fn set_line_kitchen_status(
    db: &DbState,
    session: &SessionState,
    line_id: &str,
    status: KitchenStatus,
) -> ApiResult<()> {
    let me = session.require(Permission::UpdateKitchen).await?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let mut line = db
        .orders()
        .load_line(&mut uow, line_id)
        .await?
        .filter(|l| !l.is_deleted)
        .ok_or_else(|| ApiError::not_found("Order line", line_id))?;
    let mut order = db
        .orders()
        .load(&mut uow, &line.order_id)
        .await?
        .filter(|o| !o.is_deleted)
        .ok_or_else(|| ApiError::not_found("Order", &line.order_id))?;
    if !order.sent_to_kitchen {
        return Err(ApiError::business(format!(
            "Order {} has not been sent to the kitchen",
            order.order_number
        )));
    }

    line.kitchen_status = status;
    db.orders().update_line(&mut uow, &line).await?;

    let lines = db.orders().load_lines(&mut uow, &order.id).await?;
    if let Some(rolled) = rolled_up(&lines) {
        if rolled != order.kitchen_status {
            order.kitchen_status = rolled;
            db.orders().update(&mut uow, &order).await?;
        }
    }
    uow.commit().await?;

    info!(line = %line.name_snapshot, order = %order.order_number, status = status.as_str(), "Line status changed");
    Ok(())
}

/// Plain-text rendering of the queue for the terminal display.
pub fn render_queue(tickets: &[KitchenTicket], now: DateTime<Utc>) -> String {
    if tickets.is_empty() {
        return "Kitchen queue is empty\n".to_string();
    }

    let mut out = String::new();
    for ticket in tickets {
        let waiting = ticket
            .sent_at
            .map(|sent| (now - sent).num_minutes().max(0))
            .unwrap_or(0);
        let _ = writeln!(
            out,
            "{:<12} {:<6} {:<16} {:>4} min   {}",
            ticket.order_number,
            ticket.table_name.as_deref().unwrap_or("-"),
            ticket.waiter_name.as_deref().unwrap_or("-"),
            waiting,
            ticket.kitchen_status.as_str().to_uppercase()
        );
        for line in &ticket.lines {
            let _ = writeln!(
                out,
                "  {:>2}x {:<38} {}  [{}]",
                line.quantity,
                line.name,
                line.kitchen_status.as_str(),
                line.id
            );
            if let Some(note) = &line.note {
                let _ = writeln!(out, "       * {}", note);
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::orders::{add_item, get_order, open_order, send_to_kitchen, AddItem};
    use crate::commands::test_support::{add_product, add_table, add_user, app, audit_actions, login_as};
    use crate::error::ErrorCode;
    use crate::state::Session;
    use bistro_core::UserRole;

    /// Opens a sent order with two lines as a waiter, then hands the
    /// session to a chef.
    async fn sent_order(app: &crate::commands::test_support::TestApp) -> (String, Vec<String>) {
        login_as(app, "walt", UserRole::Waiter).await;
        add_table(app, "T1").await;
        let soup = add_product(app, "Soup", 650).await;
        let fish = add_product(app, "Fish", 1890).await;

        let order = open_order(&app.db, &app.session, "T1", None).await.unwrap();
        for product in [&soup, &fish] {
            let input = AddItem {
                order: order.id.clone(),
                product_id: product.id.clone(),
                quantity: 1,
                note: None,
            };
            add_item(&app.db, &app.session, input).await.unwrap();
        }
        let order = send_to_kitchen(&app.db, &app.session, &order.id).await.unwrap();
        let lines = order.lines.iter().map(|l| l.id.clone()).collect();

        let chef = add_user(app, "chef", UserRole::Chef).await;
        app.session.set(Session::from_user(&chef, Utc::now())).await;
        (order.id, lines)
    }

    #[tokio::test]
    async fn test_queue_shows_sent_orders() {
        let app = app().await;
        let (order_id, _) = sent_order(&app).await;

        let queue = kitchen_queue(&app.db, &app.session).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].order_id, order_id);
        assert_eq!(queue[0].lines.len(), 2);
        assert_eq!(queue[0].kitchen_status, KitchenStatus::Pending);

        let text = render_queue(&queue, Utc::now());
        assert!(text.contains("PENDING"));
        assert!(text.contains("Soup"));
    }

    #[tokio::test]
    async fn test_line_status_rolls_up() {
        let app = app().await;
        let (order_id, lines) = sent_order(&app).await;

        set_line_kitchen_status(&app.db, &app.session, &lines[0], KitchenStatus::Ready)
            .await
            .unwrap();
        let queue = kitchen_queue(&app.db, &app.session).await.unwrap();
        assert_eq!(queue[0].kitchen_status, KitchenStatus::Preparing);

        set_line_kitchen_status(&app.db, &app.session, &lines[1], KitchenStatus::Ready)
            .await
            .unwrap();
        let queue = kitchen_queue(&app.db, &app.session).await.unwrap();
        assert_eq!(queue[0].kitchen_status, KitchenStatus::Ready);

        // Line changes on a sent order are audited.
        assert_eq!(audit_actions(&app, &lines[0]).await, vec!["update"]);
        assert_eq!(audit_actions(&app, &order_id).await.len(), 3);
    }

    #[tokio::test]
    async fn test_serving_the_ticket_serves_lines() {
        let app = app().await;
        let (order_id, lines) = sent_order(&app).await;

        set_order_kitchen_status(&app.db, &app.session, &order_id, KitchenStatus::Served)
            .await
            .unwrap();
        assert!(kitchen_queue(&app.db, &app.session).await.unwrap().is_empty());

        // Back to the waiter to look at the order.
        login_as(&app, "mgr", UserRole::Manager).await;
        let order = get_order(&app.db, &app.session, &order_id).await.unwrap();
        assert!(order.lines.iter().all(|l| l.kitchen_status == KitchenStatus::Served));
        assert_eq!(audit_actions(&app, &lines[1]).await, vec!["update"]);
    }

    #[tokio::test]
    async fn test_unsent_order_rejected() {
        let app = app().await;
        login_as(&app, "mgr", UserRole::Manager).await;
        add_table(&app, "T1").await;
        let order = open_order(&app.db, &app.session, "T1", None).await.unwrap();

        let err = set_order_kitchen_status(&app.db, &app.session, &order.id, KitchenStatus::Ready)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BusinessLogic);
    }

    #[tokio::test]
    async fn test_waiter_cannot_update_kitchen() {
        let app = app().await;
        let (order_id, _) = sent_order(&app).await;
        login_as(&app, "wanda", UserRole::Waiter).await;

        // Waiters see the queue but cannot change it.
        assert_eq!(kitchen_queue(&app.db, &app.session).await.unwrap().len(), 1);
        let err = set_order_kitchen_status(&app.db, &app.session, &order_id, KitchenStatus::Ready)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[test]
    fn test_render_empty_queue() {
        assert_eq!(render_queue(&[], Utc::now()), "Kitchen queue is empty\n");
    }
}

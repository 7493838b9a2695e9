//! # Receipt Command
//!
//! Prints the bill of an order: a pro-forma while it is open, the receipt
//! once it is paid. Without a configured printer, or when only a preview is
//! asked for, the text rendering is returned and nothing is sent.

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use bistro_core::{setting_keys, Money, Permission};

use crate::commands::orders::{order_dto, resolve_order, OrderDto};
use crate::error::ApiResult;
use crate::printing::{self, Receipt, ReceiptLine};
use crate::state::{DbState, PrinterConfig, SessionState};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintedReceipt {
    pub order_number: String,
    pub preview: String,
    /// Device the bytes were sent to, `None` for a preview.
    pub device: Option<String>,
    pub bytes: usize,
}

async fn build_receipt(db: &bistro_db::Database, order: &OrderDto) -> ApiResult<Receipt> {
    let settings = db.settings();
    Ok(Receipt {
        restaurant_name: settings.get_or(setting_keys::RESTAURANT_NAME, "Bistro").await?,
        restaurant_address: settings.get_or(setting_keys::RESTAURANT_ADDRESS, "").await?,
        order_number: order.order_number.clone(),
        table_name: order.table_name.clone(),
        waiter_name: order.waiter_name.clone(),
        printed_at: Utc::now(),
        lines: order
            .lines
            .iter()
            .map(|l| ReceiptLine {
                quantity: l.quantity,
                name: l.name.clone(),
                note: l.note.clone(),
                amount: Money::from_cents(l.line_total_cents),
            })
            .collect(),
        subtotal: Money::from_cents(order.subtotal_cents),
        tax: Money::from_cents(order.tax_cents),
        tax_rate_bps: settings.tax_rate_bps().await?,
        total: order.total(),
        payment_method: order.payment_method,
        currency_symbol: settings.get_or(setting_keys::CURRENCY_SYMBOL, "$").await?,
        footer: settings.get_or(setting_keys::RECEIPT_FOOTER, "").await?,
    })
}

pub async fn print_receipt(
    db: &DbState,
    session: &SessionState,
    printer: &PrinterConfig,
    order: &str,
    preview_only: bool,
) -> ApiResult<PrintedReceipt> {
    session.require(Permission::TakePayments).await?;

    let db = db.read().await;
    let order = resolve_order(&db, order).await?;
    let order = order_dto(&db, order).await?;
    let receipt = build_receipt(&db, &order).await?;
    drop(db);

    let (bytes, preview) = printing::render(&receipt, printer.paper_width);
    debug!(order = %order.order_number, bytes = bytes.len(), "Receipt rendered");

    let device = match (&printer.device, preview_only) {
        (Some(device), false) => {
            printing::send_to_device(device, &bytes).await?;
            Some(device.display().to_string())
        }
        _ => None,
    };

    Ok(PrintedReceipt {
        order_number: order.order_number,
        preview,
        device,
        bytes: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::orders::{add_item, open_order, pay_order, AddItem};
    use crate::commands::test_support::{add_product, add_table, app, login_as};
    use crate::error::ErrorCode;
    use bistro_core::{PaymentMethod, UserRole};

    async fn order_with_soup(app: &crate::commands::test_support::TestApp) -> String {
        login_as(app, "walt", UserRole::Waiter).await;
        add_table(app, "T1").await;
        let soup = add_product(app, "Soup of the Day", 650).await;
        let order = open_order(&app.db, &app.session, "T1", None).await.unwrap();
        let input = AddItem {
            order: order.id.clone(),
            product_id: soup.id,
            quantity: 2,
            note: Some("no croutons".to_string()),
        };
        add_item(&app.db, &app.session, input).await.unwrap();
        order.id
    }

    #[tokio::test]
    async fn test_preview_of_open_order() {
        let app = app().await;
        let order_id = order_with_soup(&app).await;

        let printed = print_receipt(&app.db, &app.session, &app.config.printer, &order_id, true)
            .await
            .unwrap();
        assert!(printed.device.is_none());
        assert!(printed.preview.contains("PRO-FORMA"));
        assert!(printed.preview.contains("Soup of the Day"));
        assert!(printed.preview.contains("* no croutons"));
        assert!(printed.preview.contains("Waiter"));
        assert!(printed.preview.contains("$14.30"));
    }

    #[tokio::test]
    async fn test_paid_receipt_goes_to_device() {
        let app = app().await;
        let order_id = order_with_soup(&app).await;
        pay_order(&app.db, &app.session, &order_id, PaymentMethod::Cash)
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let printer = PrinterConfig {
            device: Some(dir.path().join("lp0")),
            paper_width: 32,
        };
        let printed = print_receipt(&app.db, &app.session, &printer, &order_id, false)
            .await
            .unwrap();

        assert!(printed.device.is_some());
        assert!(printed.preview.contains("Paid by"));
        let written = std::fs::read(dir.path().join("lp0")).unwrap();
        assert_eq!(written.len(), printed.bytes);
    }

    #[tokio::test]
    async fn test_missing_printer_is_reported() {
        let app = app().await;
        let order_id = order_with_soup(&app).await;

        let dir = tempfile::tempdir().unwrap();
        let printer = PrinterConfig {
            device: Some(dir.path().join("missing").join("lp0")),
            paper_width: 48,
        };
        let err = print_receipt(&app.db, &app.session, &printer, &order_id, false)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PrinterError);
    }
}

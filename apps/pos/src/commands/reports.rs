//! # Report Commands
//!
//! Sales over an inclusive range of business days. Days run midnight to
//! midnight in the terminal's local time. Only paid orders count.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use bistro_core::Permission;
use bistro_db::{TopProduct, WaiterSales};

use crate::error::{ApiError, ApiResult};
use crate::state::{DbState, SessionState};

const DEFAULT_TOP_PRODUCTS: u32 = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub order_count: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub average_ticket_cents: i64,
    pub top_products: Vec<TopProduct>,
    pub by_waiter: Vec<WaiterSales>,
}

/// Start of a local business day as a UTC instant.
pub(crate) fn day_start(date: NaiveDate) -> ApiResult<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| ApiError::validation(format!("{} has no local midnight", date)))
}

/// `[from 00:00, to + 1 day 00:00)` in UTC.
fn range(from: NaiveDate, to: NaiveDate) -> ApiResult<(DateTime<Utc>, DateTime<Utc>)> {
    if from > to {
        return Err(ApiError::validation(format!(
            "Report range starts after it ends ({} > {})",
            from, to
        )));
    }
    let end = to
        .succ_opt()
        .ok_or_else(|| ApiError::validation("Report range ends too late"))?;
    Ok((day_start(from)?, day_start(end)?))
}

/// Summary, best sellers and per-waiter totals for `from..=to`.
pub async fn sales_report(
    db: &DbState,
    session: &SessionState,
    from: NaiveDate,
    to: NaiveDate,
    top: Option<u32>,
) -> ApiResult<SalesReport> {
    session.require(Permission::ViewReports).await?;
    let (start, end) = range(from, to)?;
    let top = top.unwrap_or(DEFAULT_TOP_PRODUCTS).clamp(1, 100);

    debug!(%start, %end, "Building sales report");

    let db = db.read().await;
    let reports = db.reports();
    let summary = reports.sales_summary(start, end).await?;
    let top_products = reports.top_products(start, end, top).await?;
    let by_waiter = reports.sales_by_waiter(start, end).await?;

    Ok(SalesReport {
        from,
        to,
        order_count: summary.order_count,
        subtotal_cents: summary.subtotal_cents,
        tax_cents: summary.tax_cents,
        total_cents: summary.total_cents,
        average_ticket_cents: summary.average_ticket().cents(),
        top_products,
        by_waiter,
    })
}

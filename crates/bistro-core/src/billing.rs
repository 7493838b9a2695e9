//! Order totals.

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::OrderDetail;

/// Subtotal, tax and total of an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

impl OrderTotals {
    /// Totals over the live lines. Tax is charged once on the subtotal.
    pub fn compute<'a, I>(lines: I, tax_rate_bps: u32) -> Self
    where
        I: IntoIterator<Item = &'a OrderDetail>,
    {
        let subtotal: Money = lines
            .into_iter()
            .filter(|line| !line.is_deleted)
            .map(|line| Money::from_cents(line.line_total_cents))
            .sum();
        Self::from_subtotal(subtotal, tax_rate_bps)
    }

    pub fn from_subtotal(subtotal: Money, tax_rate_bps: u32) -> Self {
        let tax = subtotal.calculate_tax(tax_rate_bps);
        OrderTotals {
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KitchenStatus;
    use chrono::Utc;

    fn line(price: i64, qty: i64, deleted: bool) -> OrderDetail {
        let now = Utc::now();
        OrderDetail {
            id: crate::new_id(),
            order_id: "o".to_string(),
            product_id: None,
            name_snapshot: "x".to_string(),
            unit_price_cents: price,
            quantity: qty,
            line_total_cents: price * qty,
            note: None,
            kitchen_status: KitchenStatus::Pending,
            is_deleted: deleted,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_totals_skip_removed_lines() {
        let lines = vec![line(450, 2, false), line(1200, 1, false), line(999, 5, true)];
        let totals = OrderTotals::compute(&lines, 1000);
        assert_eq!(totals.subtotal.cents(), 2100);
        assert_eq!(totals.tax.cents(), 210);
        assert_eq!(totals.total.cents(), 2310);
    }

    #[test]
    fn test_tax_rounds_half_up_on_subtotal() {
        // 3 × 1.15 = 3.45, 5% = 0.1725 → 0.17
        let lines = vec![line(115, 3, false)];
        let totals = OrderTotals::compute(&lines, 500);
        assert_eq!(totals.tax.cents(), 17);
        assert_eq!(totals.total.cents(), 362);
    }

    #[test]
    fn test_empty_order() {
        let totals = OrderTotals::compute(&Vec::new(), 825);
        assert_eq!(totals, OrderTotals::default());
    }
}

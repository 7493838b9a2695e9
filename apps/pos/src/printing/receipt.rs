//! # Receipt Layout
//!
//! ```text
//! ┌────────────────────────────────┐
//! │          Bistro Centrale       │  restaurant name, address
//! │         12 Market Street       │
//! │================================│
//! │Order               260307-0004 │  order number, table, waiter, time
//! │Table                        T3 │
//! │Waiter                    Maria │
//! │Date           2026-03-07 20:41 │
//! │--------------------------------│
//! │2x  Margherita Pizza      23.80 │  qty · name · amount
//! │1x  Grilled Salmon with         │  long names wrap under the name
//! │    Seasonal Vegetables   18.90 │
//! │    * no butter                 │  kitchen note
//! │--------------------------------│
//! │Subtotal                  42.70 │
//! │Tax 10.00%                 4.27 │
//! │TOTAL                    $46.97 │
//! │Paid by                    card │
//! │================================│
//! │           Thank you!           │
//! └────────────────────────────────┘
//! ```
//!
//! An unpaid order prints as a bill with a "PRO-FORMA" banner and no
//! payment row.

use chrono::{DateTime, Utc};

use bistro_core::{Money, PaymentMethod};

use super::escpos::{text_width, EscPosBuilder};

/// Width of the "12x " column.
const QTY_COL: usize = 4;
/// Width reserved for the amount, including one separating space.
const AMOUNT_COL: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLine {
    pub quantity: i64,
    pub name: String,
    pub note: Option<String>,
    pub amount: Money,
}

/// Everything printed on one receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub restaurant_name: String,
    pub restaurant_address: String,
    pub order_number: String,
    pub table_name: Option<String>,
    pub waiter_name: Option<String>,
    pub printed_at: DateTime<Utc>,
    pub lines: Vec<ReceiptLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub tax_rate_bps: u32,
    pub total: Money,
    pub payment_method: Option<PaymentMethod>,
    pub currency_symbol: String,
    pub footer: String,
}

impl Receipt {
    pub fn is_paid(&self) -> bool {
        self.payment_method.is_some()
    }
}

/// Renders `receipt` for a `width`-column printer.
///
/// Returns the ESC/POS bytes and the plain-text preview.
pub fn render(receipt: &Receipt, width: usize) -> (Vec<u8>, String) {
    let mut b = EscPosBuilder::new(width);

    b.bold().double_height();
    b.line_center(&receipt.restaurant_name);
    b.reset_size().bold_off();
    for line in wrap(&receipt.restaurant_address, width) {
        b.line_center(&line);
    }
    if !receipt.is_paid() {
        b.bold();
        b.line_center("PRO-FORMA");
        b.bold_off();
    }
    b.sep_double();

    b.line_lr("Order", &receipt.order_number);
    if let Some(table) = &receipt.table_name {
        b.line_lr("Table", table);
    }
    if let Some(waiter) = &receipt.waiter_name {
        b.line_lr("Waiter", waiter);
    }
    b.line_lr("Date", &receipt.printed_at.format("%Y-%m-%d %H:%M").to_string());
    b.sep_single();

    let name_width = width.saturating_sub(QTY_COL + AMOUNT_COL).max(1);
    for item in &receipt.lines {
        let name_rows = wrap(&item.name, name_width);
        let last = name_rows.len().saturating_sub(1);
        for (i, row) in name_rows.iter().enumerate() {
            let qty = if i == 0 {
                format!("{:<width$}", format!("{}x", item.quantity), width = QTY_COL)
            } else {
                " ".repeat(QTY_COL)
            };
            if i == last {
                b.line_lr(&format!("{}{}", qty, row), &item.amount.to_string());
            } else {
                b.line(&format!("{}{}", qty, row));
            }
        }
        if let Some(note) = &item.note {
            for row in wrap(&format!("* {}", note), width.saturating_sub(QTY_COL).max(1)) {
                b.line(&format!("{}{}", " ".repeat(QTY_COL), row));
            }
        }
    }
    b.sep_single();

    b.line_lr("Subtotal", &receipt.subtotal.to_string());
    b.line_lr(&format!("Tax {}", format_rate(receipt.tax_rate_bps)), &receipt.tax.to_string());
    b.bold();
    b.line_lr("TOTAL", &receipt.total.format_with(&receipt.currency_symbol));
    b.bold_off();
    if let Some(method) = receipt.payment_method {
        b.line_lr("Paid by", method.as_str());
    }
    b.sep_double();

    for line in wrap(&receipt.footer, width) {
        b.line_center(&line);
    }
    b.cut_feed(3);

    b.build()
}

/// `825` → `8.25%`.
fn format_rate(bps: u32) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}

/// Word-wraps `text` to `width` columns, splitting words longer than a
/// row. Empty text gives no rows.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut rows = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while text_width(&word) > width {
            if !current.is_empty() {
                rows.push(std::mem::take(&mut current));
            }
            let (head, tail) = split_at_width(&word, width);
            let (head, tail) = (head.to_string(), tail.to_string());
            word = tail;
            rows.push(head);
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            text_width(&word)
        } else {
            text_width(&current) + 1 + text_width(&word)
        };
        if needed > width {
            rows.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        rows.push(current);
    }
    rows
}

/// Splits `s` after the last character that still fits in `width` columns.
/// Always keeps at least one character in the head.
fn split_at_width(s: &str, width: usize) -> (&str, &str) {
    let mut used = 0;
    for (idx, c) in s.char_indices() {
        let mut utf8 = [0u8; 4];
        used += text_width(c.encode_utf8(&mut utf8));
        if used > width && idx > 0 {
            return s.split_at(idx);
        }
    }
    (s, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    fn receipt(paid: bool) -> Receipt {
        Receipt {
            restaurant_name: "Bistro".to_string(),
            restaurant_address: "12 Market Street".to_string(),
            order_number: "260307-0004".to_string(),
            table_name: Some("T3".to_string()),
            waiter_name: Some("Maria".to_string()),
            printed_at: Utc::now(),
            lines: vec![
                ReceiptLine {
                    quantity: 2,
                    name: "Margherita Pizza".to_string(),
                    note: None,
                    amount: Money::from_cents(2380),
                },
                ReceiptLine {
                    quantity: 1,
                    name: "Grilled Salmon with Seasonal Vegetables".to_string(),
                    note: Some("no butter".to_string()),
                    amount: Money::from_cents(1890),
                },
            ],
            subtotal: Money::from_cents(4270),
            tax: Money::from_cents(427),
            tax_rate_bps: 1000,
            total: Money::from_cents(4697),
            payment_method: paid.then_some(PaymentMethod::Card),
            currency_symbol: "$".to_string(),
            footer: "Thank you!".to_string(),
        }
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("Grilled Salmon with Seasonal Vegetables", 18), vec![
            "Grilled Salmon",
            "with Seasonal",
            "Vegetables",
        ]);
        assert_eq!(wrap("Supercalifragilistic", 8), vec!["Supercal", "ifragili", "stic"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn test_rows_fit_the_paper() {
        for width in [32, 48] {
            let (_, preview) = render(&receipt(true), width);
            for line in preview.lines() {
                assert!(text_width(line) <= width, "{:?} is wider than {}", line, width);
            }
        }
    }

    #[test]
    fn test_paid_receipt_content() {
        let (bytes, preview) = render(&receipt(true), 32);

        assert!(preview.contains("260307-0004"));
        assert!(preview.contains("2x  Margherita Pizza"));
        assert!(preview.contains("* no butter"));
        assert!(preview.contains("Tax 10.00%"));
        assert!(preview.contains("$46.97"));
        assert!(preview.contains("Paid by"));
        assert!(!preview.contains("PRO-FORMA"));

        assert!(bytes.starts_with(&[0x1B, 0x40, 0x1B, 0x74, 16]));
        assert!(bytes.ends_with(&[0x1D, 0x56, 0x42, 3]));
    }

    #[test]
    fn test_unpaid_is_pro_forma() {
        let (_, preview) = render(&receipt(false), 48);
        assert!(preview.contains("PRO-FORMA"));
        assert!(!preview.contains("Paid by"));
    }

    #[test]
    fn test_wrapped_name_puts_amount_on_last_row() {
        let (_, preview) = render(&receipt(true), 32);
        let rows: Vec<&str> = preview
            .lines()
            .skip_while(|l| !l.starts_with("1x"))
            .take(3)
            .collect();
        assert!(rows[0].starts_with("1x  Grilled Salmon"));
        assert!(!rows[0].ends_with("18.90"));
        assert!(rows[1].ends_with("18.90") || rows[2].ends_with("18.90"));
    }

    #[test]
    fn test_accented_menu_prints_in_the_code_page() {
        let mut r = receipt(true);
        r.lines[0].name = "Crème brûlée".to_string();
        r.currency_symbol = "€".to_string();
        let (bytes, preview) = render(&r, 32);

        let row = preview.lines().find(|l| l.starts_with("2x")).unwrap();
        assert_eq!(row, format!("2x  Crème brûlée{}23.80", " ".repeat(32 - 16 - 5)));
        assert!(preview.contains("€46.97"));

        let (decoded, _, had_errors) = WINDOWS_1252.decode(&bytes);
        assert!(!had_errors);
        assert!(decoded.contains("2x  Crème brûlée"));
        assert!(decoded.contains("€46.97"));
    }

    #[test]
    fn test_split_at_width() {
        assert_eq!(split_at_width("Crèmerie", 4), ("Crèm", "erie"));
        assert_eq!(split_at_width("abc", 5), ("abc", ""));
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(825), "8.25%");
        assert_eq!(format_rate(0), "0.00%");
    }
}

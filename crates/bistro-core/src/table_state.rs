//! # Table Status
//!
//! A dining table is Free, Busy or Paid. The status is stored as an integer
//! column and only ever changes through [`TableStatus::apply`], inside the
//! same unit of work as the order change that caused it.
//!
//! ```text
//!            Open                 Pay
//!   ┌──────┐ ───────► ┌──────┐ ───────► ┌──────┐
//!   │ Free │          │ Busy │          │ Paid │
//!   └──────┘ ◄─────── └──────┘          └──────┘
//!      ▲      Cancel                       │
//!      └───────────────────────────────────┘
//!                      Clear
//! ```
//!
//! One table carries at most one open order at a time.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Occupancy of a dining table. Persisted as 0 / 1 / 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum TableStatus {
    #[default]
    Free = 0,
    Busy = 1,
    Paid = 2,
}

/// Things that happen to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableEvent {
    /// An order was opened on the table.
    Open,
    /// The table's orders were paid.
    Pay,
    /// Staff cleared a paid table.
    Clear,
    /// The table's last live order was cancelled.
    Cancel,
}

impl TableStatus {
    /// Applies an event, rejecting transitions the floor plan does not allow.
    pub fn apply(self, event: TableEvent) -> CoreResult<TableStatus> {
        use TableEvent::*;
        use TableStatus::*;

        match (self, event) {
            (Free, Open) => Ok(Busy),
            (Busy, Pay) => Ok(Paid),
            (Paid, Clear) => Ok(Free),
            (Busy, Cancel) => Ok(Free),
            (from, event) => Err(CoreError::InvalidTableTransition { from, event }),
        }
    }

    /// Integer code as stored in the `restaurant_tables.status` column.
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<TableStatus> {
        match code {
            0 => Some(TableStatus::Free),
            1 => Some(TableStatus::Busy),
            2 => Some(TableStatus::Paid),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TableStatus::Free => "free",
            TableStatus::Busy => "busy",
            TableStatus::Paid => "paid",
        }
    }
}

/// What a table's status must be given how many open, non-deleted orders
/// it carries. A Paid table with no open order is waiting to be cleared and
/// keeps its status.
pub fn derive_status(current: TableStatus, open_orders: i64) -> TableStatus {
    if open_orders > 0 {
        TableStatus::Busy
    } else if current == TableStatus::Busy {
        TableStatus::Free
    } else {
        current
    }
}

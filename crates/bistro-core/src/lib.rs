//! # bistro-core: Pure Business Logic for Bistro POS
//!
//! Everything in this crate is deterministic and free of I/O: the domain
//! types, money arithmetic, order totals, table-status transitions, roles,
//! input validation and the audit selection policy.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bistro POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Terminal shell (apps/pos)                       │   │
//! │  │   login ─► tables ─► order editor ─► kitchen ─► receipt         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ bistro-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌─────────┐ ┌────────┐  │   │
//! │  │   │  types  │ │  money  │ │  audit   │ │  table  │ │ access │  │   │
//! │  │   │ Order   │ │ Money   │ │ policy   │ │  state  │ │ roles  │  │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └─────────┘ └────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        bistro-db (SQLite, unit of work, audit hook)             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entities (Order, Product, User, ...) and their enums
//! - [`money`] - Integer-cent money type
//! - [`billing`] - Order totals
//! - [`audit`] - Change tracking snapshots and the audit selection policy
//! - [`table_state`] - Free / Busy / Paid transitions
//! - [`access`] - Roles and permissions
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use bistro_core::money::Money;
//!
//! let price = Money::from_cents(1250);
//! let tax = price.calculate_tax(1000); // 10%
//! assert_eq!(tax.cents(), 125);
//! ```

pub mod access;
pub mod audit;
pub mod billing;
pub mod error;
pub mod money;
pub mod table_state;
pub mod types;
pub mod validation;

pub use access::{Permission, UserRole};
pub use audit::{Actor, AuditAction, ChangeSet, EntityKind, EntityState, TrackedChange};
pub use billing::OrderTotals;
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use table_state::{TableEvent, TableStatus};
pub use types::*;

/// Maximum number of live lines on one order.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity of a single order line.
///
/// Guards against typing 100 instead of 10 on the order editor.
pub const MAX_LINE_QUANTITY: i64 = 99;

/// How long an emailed verification or reset code stays valid.
pub const TOKEN_LIFETIME_MINUTES: i64 = 15;

/// Generates a new entity id (UUID v4).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

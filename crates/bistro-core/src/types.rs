//! # Domain Types
//!
//! The entities persisted by Bistro POS.
//!
//! ## Entity Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Category 1───* Product          RestaurantTable 1───* Order            │
//! │                    ·                                  1                 │
//! │                    · (snapshot)                       │                 │
//! │                    ·                                  *                 │
//! │                    └ · · · · · · · · · · · · · ·  OrderDetail           │
//! │                                                                         │
//! │  User 1───* UserToken            User 1───* Order (waiter)              │
//! │                                                                         │
//! │  AppSetting (key/value)          AuditLog (append only)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every entity except `AppSetting` has a UUID v4 `id` generated before the
//! insert, so audit rows always know the key of what they describe.
//! `AppSetting` is keyed by its `key`.
//!
//! ## Soft Delete
//! Rows that history refers to (products, orders, users, ...) carry an
//! `is_deleted` flag instead of being removed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::access::UserRole;
use crate::audit::{Auditable, EntityKind};
use crate::money::Money;
use crate::table_state::TableStatus;

// =============================================================================
// Menu
// =============================================================================

/// A menu section ("Starters", "Drinks", ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Position on the order editor's category bar.
    pub sort_order: i64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A dish or drink on the menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub category_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    /// Temporarily off the menu (sold out) without being deleted.
    pub is_available: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Whether the product can be put on an order right now.
    pub fn can_order(&self) -> bool {
        self.is_available && !self.is_deleted
    }
}

// =============================================================================
// Floor
// =============================================================================

/// A dining table on the floor plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RestaurantTable {
    pub id: String,
    pub name: String,
    pub seats: i64,
    pub status: TableStatus,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Orders
// =============================================================================

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Open,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// Preparation progress shown on the kitchen display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum KitchenStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Served,
}

impl KitchenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KitchenStatus::Pending => "pending",
            KitchenStatus::Preparing => "preparing",
            KitchenStatus::Ready => "ready",
            KitchenStatus::Served => "served",
        }
    }
}

impl std::str::FromStr for KitchenStatus {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(KitchenStatus::Pending),
            "preparing" | "cooking" => Ok(KitchenStatus::Preparing),
            "ready" => Ok(KitchenStatus::Ready),
            "served" | "done" => Ok(KitchenStatus::Served),
            _ => Err(crate::error::ValidationError::NotAllowed {
                field: "kitchen status".to_string(),
                allowed: vec![
                    "pending".to_string(),
                    "preparing".to_string(),
                    "ready".to_string(),
                    "served".to_string(),
                ],
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" | "credit" | "debit" => Ok(PaymentMethod::Card),
            _ => Err(crate::error::ValidationError::NotAllowed {
                field: "payment method".to_string(),
                allowed: vec!["cash".to_string(), "card".to_string()],
            }),
        }
    }
}

/// A guest check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    /// Human-readable number printed on tickets: `YYMMDD-NNNN`.
    pub order_number: String,
    pub table_id: Option<String>,
    pub waiter_id: Option<String>,
    pub status: OrderStatus,
    /// Once true, every later edit of the order and its lines is audited.
    pub sent_to_kitchen: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub kitchen_status: KitchenStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub paid_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open && !self.is_deleted
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line on an order. Name and price are frozen when the line is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderDetail {
    pub id: String,
    pub order_id: String,
    pub product_id: Option<String>,
    pub name_snapshot: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
    /// Free-text instruction for the kitchen ("no onions").
    pub note: Option<String>,
    pub kitchen_status: KitchenStatus,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderDetail {
    /// Sets the quantity and keeps the line total in step.
    pub fn set_quantity(&mut self, quantity: i64) {
        self.quantity = quantity;
        self.line_total_cents = self.unit_price_cents * quantity;
    }
}

/// Formats the printed order number from the business date and the
/// day's sequence.
pub fn format_order_number(date: NaiveDate, sequence: i64) -> String {
    format!("{}-{:04}", date.format("%y%m%d"), sequence)
}

// =============================================================================
// Users
// =============================================================================

/// A staff account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    /// Argon2 PHC string. Never leaves the process unredacted.
    pub password_hash: String,
    pub role: UserRole,
    pub email_verified: bool,
    pub is_active: bool,
    pub is_deleted: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn can_login(&self) -> bool {
        self.is_active && !self.is_deleted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

/// A one-time code sent by email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UserToken {
    pub id: String,
    pub user_id: String,
    pub purpose: TokenPurpose,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserToken {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && now < self.expires_at
    }
}

// =============================================================================
// Settings & Audit
// =============================================================================

/// A key/value application setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AppSetting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Known setting keys.
pub mod setting_keys {
    pub const RESTAURANT_NAME: &str = "restaurant_name";
    pub const RESTAURANT_ADDRESS: &str = "restaurant_address";
    pub const TAX_RATE_BPS: &str = "tax_rate_bps";
    pub const CURRENCY_SYMBOL: &str = "currency_symbol";
    pub const RECEIPT_FOOTER: &str = "receipt_footer";

    pub const ALL: &[&str] = &[
        RESTAURANT_NAME,
        RESTAURANT_ADDRESS,
        TAX_RATE_BPS,
        CURRENCY_SYMBOL,
        RECEIPT_FOOTER,
    ];
}

/// A persisted audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AuditLog {
    pub id: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
    pub action: crate::audit::AuditAction,
    pub entity_type: String,
    pub entity_key: String,
    /// JSON object; see [`crate::audit`] for its shape.
    pub changes: String,
}

// =============================================================================
// Auditable
// =============================================================================

impl Auditable for Category {
    const KIND: EntityKind = EntityKind::Category;
    fn audit_key(&self) -> String {
        self.id.clone()
    }
}

impl Auditable for Product {
    const KIND: EntityKind = EntityKind::Product;
    fn audit_key(&self) -> String {
        self.id.clone()
    }
}

impl Auditable for RestaurantTable {
    const KIND: EntityKind = EntityKind::RestaurantTable;
    fn audit_key(&self) -> String {
        self.id.clone()
    }
}

impl Auditable for Order {
    const KIND: EntityKind = EntityKind::Order;
    fn audit_key(&self) -> String {
        self.id.clone()
    }
}

impl Auditable for OrderDetail {
    const KIND: EntityKind = EntityKind::OrderDetail;
    fn audit_key(&self) -> String {
        self.id.clone()
    }
}

impl Auditable for User {
    const KIND: EntityKind = EntityKind::User;
    fn audit_key(&self) -> String {
        self.id.clone()
    }
}

impl Auditable for UserToken {
    const KIND: EntityKind = EntityKind::UserToken;
    fn audit_key(&self) -> String {
        self.id.clone()
    }
}

impl Auditable for AppSetting {
    const KIND: EntityKind = EntityKind::AppSetting;
    fn audit_key(&self) -> String {
        self.key.clone()
    }
}

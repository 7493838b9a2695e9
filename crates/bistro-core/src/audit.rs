//! # Audit Selection Policy
//!
//! Every save runs in a unit of work that records what changed as JSON
//! snapshots. When the unit of work commits, [`ChangeSet::audit_entries`]
//! decides which of those changes earn an audit row and what the row says.
//!
//! ## Decision Table
//! ```text
//! ┌──────────────────┬───────────┬──────────────────────────────┬──────────────────────┐
//! │ Entity           │ State     │ Audited when                 │ Action               │
//! ├──────────────────┼───────────┼──────────────────────────────┼──────────────────────┤
//! │ User, AppSetting │ any       │ always                       │ Insert/Update/Hard   │
//! │ Product          │ Added     │ always                       │ Insert               │
//! │ Product          │ Deleted   │ always                       │ HardDelete           │
//! │ Product          │ Modified  │ name or price changed,       │ Update, SoftDelete   │
//! │                  │           │ or delete flag set           │ when the flag is set │
//! │ Order            │ Modified  │ sent_to_kitchen (after)      │ Update / SoftDelete  │
//! │ OrderDetail      │ Modified  │ parent order sent, and not   │ Update               │
//! │                  │           │ cascading from the parent's  │                      │
//! │                  │           │ own soft delete              │                      │
//! │ anything else    │           │ never                        │                      │
//! └──────────────────┴───────────┴──────────────────────────────┴──────────────────────┘
//! ```
//!
//! ## Row Contents
//! - Insert: full snapshot of the new values
//! - HardDelete: full snapshot of the removed values
//! - Update / SoftDelete: `{ "field": { "old": .., "new": .. } }` for each
//!   changed field, `updated_at` excluded
//!
//! `password_hash` is written as `"***"` wherever it appears.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name recorded when no signed-in user is known.
pub const SYSTEM_ACTOR: &str = "System";

/// Key recorded when an entity has no key yet.
pub const UNASSIGNED_KEY: &str = "(unassigned)";

/// Replacement for secret values in snapshots and diffs.
pub const REDACTED: &str = "***";

const SECRET_FIELDS: &[&str] = &["password_hash"];
const IGNORED_FIELDS: &[&str] = &["updated_at"];
const DELETE_FLAG: &str = "is_deleted";
const SENT_FLAG: &str = "sent_to_kitchen";

// =============================================================================
// Vocabulary
// =============================================================================

/// The tracked entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Order,
    OrderDetail,
    Product,
    Category,
    RestaurantTable,
    User,
    UserToken,
    AppSetting,
    AuditLog,
}

impl EntityKind {
    /// Name written to `audit_logs.entity_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Order => "Order",
            EntityKind::OrderDetail => "OrderDetail",
            EntityKind::Product => "Product",
            EntityKind::Category => "Category",
            EntityKind::RestaurantTable => "RestaurantTable",
            EntityKind::User => "User",
            EntityKind::UserToken => "UserToken",
            EntityKind::AppSetting => "AppSetting",
            EntityKind::AuditLog => "AuditLog",
        }
    }
}

/// How an entity changed within the unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    Added,
    Modified,
    Deleted,
}

/// What an audit row says happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Insert,
    Update,
    SoftDelete,
    HardDelete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Insert => "insert",
            AuditAction::Update => "update",
            AuditAction::SoftDelete => "soft_delete",
            AuditAction::HardDelete => "hard_delete",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "insert" => Ok(AuditAction::Insert),
            "update" => Ok(AuditAction::Update),
            "soft_delete" => Ok(AuditAction::SoftDelete),
            "hard_delete" => Ok(AuditAction::HardDelete),
            _ => Err(crate::error::ValidationError::NotAllowed {
                field: "action".to_string(),
                allowed: vec![
                    "insert".to_string(),
                    "update".to_string(),
                    "soft_delete".to_string(),
                    "hard_delete".to_string(),
                ],
            }),
        }
    }
}

/// Who is making the change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
}

impl Actor {
    pub fn system() -> Self {
        Actor::default()
    }

    pub fn user(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Actor {
            user_id: Some(user_id.into()),
            display_name: Some(display_name.into()),
        }
    }

    /// Display name for audit rows, falling back to [`SYSTEM_ACTOR`].
    pub fn name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => SYSTEM_ACTOR,
        }
    }
}

/// Entities that can be tracked by a unit of work.
pub trait Auditable: Serialize {
    const KIND: EntityKind;

    fn audit_key(&self) -> String;
}

// =============================================================================
// Tracked changes
// =============================================================================

/// One pending entity change with its before/after snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedChange {
    pub kind: EntityKind,
    pub state: EntityState,
    pub key: Option<String>,
    /// Values as loaded. `None` for Added.
    pub original: Option<Value>,
    /// Values as they will be saved. `None` for Deleted.
    pub current: Option<Value>,
    /// For order lines: the parent order's `sent_to_kitchen` as stored.
    pub parent_sent_to_kitchen: Option<bool>,
}

fn snapshot<T: Serialize>(entity: &T) -> Value {
    serde_json::to_value(entity).unwrap_or(Value::Null)
}

impl TrackedChange {
    pub fn new(
        kind: EntityKind,
        state: EntityState,
        key: Option<String>,
        original: Option<Value>,
        current: Option<Value>,
    ) -> Self {
        TrackedChange {
            kind,
            state,
            key,
            original,
            current,
            parent_sent_to_kitchen: None,
        }
    }

    pub fn added<T: Auditable>(entity: &T) -> Self {
        Self::new(
            T::KIND,
            EntityState::Added,
            Some(entity.audit_key()),
            None,
            Some(snapshot(entity)),
        )
    }

    pub fn modified<T: Auditable>(before: &T, after: &T) -> Self {
        Self::new(
            T::KIND,
            EntityState::Modified,
            Some(after.audit_key()),
            Some(snapshot(before)),
            Some(snapshot(after)),
        )
    }

    pub fn deleted<T: Auditable>(entity: &T) -> Self {
        Self::new(
            T::KIND,
            EntityState::Deleted,
            Some(entity.audit_key()),
            Some(snapshot(entity)),
            None,
        )
    }

    /// Records the parent order's stored `sent_to_kitchen` flag.
    pub fn with_parent_sent(mut self, sent_to_kitchen: bool) -> Self {
        self.parent_sent_to_kitchen = Some(sent_to_kitchen);
        self
    }

    fn original_field(&self, field: &str) -> Option<&Value> {
        self.original.as_ref().and_then(|v| v.get(field))
    }

    fn current_field(&self, field: &str) -> Option<&Value> {
        self.current.as_ref().and_then(|v| v.get(field))
    }

    fn current_flag(&self, field: &str) -> bool {
        self.current_field(field)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether `field` differs between the snapshots.
    pub fn changed(&self, field: &str) -> bool {
        self.original_field(field) != self.current_field(field)
    }

    /// True when the boolean delete flag goes false → true.
    pub fn is_soft_delete(&self) -> bool {
        let before = self
            .original_field(DELETE_FLAG)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        !before && self.current_flag(DELETE_FLAG)
    }

    /// Parent order id of an order line.
    pub fn parent_order_id(&self) -> Option<&str> {
        self.current_field("order_id")
            .or_else(|| self.original_field("order_id"))
            .and_then(Value::as_str)
    }

    fn is_noop(&self) -> bool {
        self.state == EntityState::Modified && diff_fields(self).is_empty()
    }
}

// =============================================================================
// Change set
// =============================================================================

/// One audit row ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_key: String,
    pub changes: Value,
}

/// The pending changes of one unit of work, one entry per entity.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<TrackedChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a change, folding it into an earlier change of the same entity.
    ///
    /// ```text
    /// Added    + Modified → Added    (latest values)
    /// Modified + Modified → Modified (first original, latest values)
    /// Added    + Deleted  → nothing
    /// Modified + Deleted  → Deleted  (first original)
    /// ```
    pub fn track(&mut self, change: TrackedChange) {
        let existing = change.key.as_ref().and_then(|key| {
            self.changes
                .iter()
                .position(|c| c.kind == change.kind && c.key.as_ref() == Some(key))
        });

        let Some(index) = existing else {
            if !change.is_noop() {
                self.changes.push(change);
            }
            return;
        };

        let prior = &mut self.changes[index];
        match (prior.state, change.state) {
            (EntityState::Added, EntityState::Deleted) => {
                self.changes.remove(index);
                return;
            }
            (EntityState::Added, _) => {
                prior.current = change.current;
            }
            (EntityState::Modified, EntityState::Deleted) => {
                prior.state = EntityState::Deleted;
                prior.current = None;
            }
            (EntityState::Modified, _) => {
                prior.current = change.current;
            }
            (EntityState::Deleted, _) => {
                *prior = change;
            }
        }

        if self.changes[index].is_noop() {
            self.changes.remove(index);
        }
    }

    pub fn changes(&self) -> &[TrackedChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// The pending change of the given entity, if any.
    pub fn find(&self, kind: EntityKind, key: &str) -> Option<&TrackedChange> {
        self.changes
            .iter()
            .find(|c| c.kind == kind && c.key.as_deref() == Some(key))
    }

    /// Runs the policy over every pending change.
    pub fn audit_entries(&self, actor: &Actor, now: DateTime<Utc>) -> Vec<AuditEntry> {
        self.changes
            .iter()
            .filter_map(|change| {
                let action = policy::classify(change, self)?;
                Some(AuditEntry {
                    user_name: actor.name().to_string(),
                    timestamp: now,
                    action,
                    entity_type: change.kind.as_str().to_string(),
                    entity_key: change
                        .key
                        .clone()
                        .unwrap_or_else(|| UNASSIGNED_KEY.to_string()),
                    changes: payload(change, action),
                })
            })
            .collect()
    }
}

// =============================================================================
// Policy
// =============================================================================

pub mod policy {
    use super::*;

    /// Decides whether `change` is audited and as what. `set` is the whole
    /// unit of work, needed for order lines whose parent is also pending.
    pub fn classify(change: &TrackedChange, set: &ChangeSet) -> Option<AuditAction> {
        match (change.kind, change.state) {
            (EntityKind::User | EntityKind::AppSetting, state) => Some(by_state(state)),

            (EntityKind::Product, EntityState::Added) => Some(AuditAction::Insert),
            (EntityKind::Product, EntityState::Deleted) => Some(AuditAction::HardDelete),
            (EntityKind::Product, EntityState::Modified) => {
                if change.is_soft_delete() {
                    Some(AuditAction::SoftDelete)
                } else if change.changed("name") || change.changed("price_cents") {
                    Some(AuditAction::Update)
                } else {
                    None
                }
            }

            (EntityKind::Order, EntityState::Modified) => {
                if !change.current_flag(SENT_FLAG) {
                    None
                } else if change.is_soft_delete() {
                    Some(AuditAction::SoftDelete)
                } else {
                    Some(AuditAction::Update)
                }
            }

            (EntityKind::OrderDetail, EntityState::Modified) => {
                let parent = change
                    .parent_order_id()
                    .and_then(|id| set.find(EntityKind::Order, id));

                let parent_sent = match parent {
                    Some(order) if order.current.is_some() => order.current_flag(SENT_FLAG),
                    _ => change.parent_sent_to_kitchen.unwrap_or(false),
                };
                if !parent_sent {
                    return None;
                }

                let cascading = change.is_soft_delete()
                    && parent.map(TrackedChange::is_soft_delete).unwrap_or(false);
                if cascading {
                    None
                } else {
                    Some(AuditAction::Update)
                }
            }

            _ => None,
        }
    }

    fn by_state(state: EntityState) -> AuditAction {
        match state {
            EntityState::Added => AuditAction::Insert,
            EntityState::Modified => AuditAction::Update,
            EntityState::Deleted => AuditAction::HardDelete,
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if SECRET_FIELDS.contains(&k.as_str()) {
                        (k.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (k.clone(), v.clone())
                    }
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Changed fields of a modification as `{ field: { old, new } }`.
pub fn diff_fields(change: &TrackedChange) -> Map<String, Value> {
    let empty = Map::new();
    let original = change
        .original
        .as_ref()
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let current = change
        .current
        .as_ref()
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let mut fields: Vec<&String> = original.keys().chain(current.keys()).collect();
    fields.sort();
    fields.dedup();

    let mut diff = Map::new();
    for field in fields {
        if IGNORED_FIELDS.contains(&field.as_str()) {
            continue;
        }
        let old = original.get(field).cloned().unwrap_or(Value::Null);
        let new = current.get(field).cloned().unwrap_or(Value::Null);
        if old == new {
            continue;
        }

        let (old, new) = if SECRET_FIELDS.contains(&field.as_str()) {
            (Value::from(REDACTED), Value::from(REDACTED))
        } else {
            (old, new)
        };

        let mut pair = Map::new();
        pair.insert("old".to_string(), old);
        pair.insert("new".to_string(), new);
        diff.insert(field.clone(), Value::Object(pair));
    }
    diff
}

fn payload(change: &TrackedChange, action: AuditAction) -> Value {
    match action {
        AuditAction::Insert => change.current.as_ref().map(redact).unwrap_or(Value::Null),
        AuditAction::HardDelete => change.original.as_ref().map(redact).unwrap_or(Value::Null),
        AuditAction::Update | AuditAction::SoftDelete => Value::Object(diff_fields(change)),
    }
}

//! # Audit Log Viewer
//!
//! Read-only. Rows are written by the unit of work, never by a command.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use bistro_core::{AuditAction, AuditLog, Permission};
use bistro_db::repository::audit::DEFAULT_AUDIT_LIMIT;
use bistro_db::AuditFilter;

use crate::commands::reports::day_start;
use crate::error::{ApiError, ApiResult};
use crate::state::{DbState, SessionState};

const MAX_AUDIT_LIMIT: u32 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntryDto {
    pub id: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_key: String,
    pub changes: Value,
}

impl From<AuditLog> for AuditEntryDto {
    fn from(row: AuditLog) -> Self {
        // Rows are written from serde_json, so this only falls back on a
        // hand-edited database.
        let changes = serde_json::from_str(&row.changes).unwrap_or(Value::String(row.changes));
        AuditEntryDto {
            id: row.id,
            user_name: row.user_name,
            timestamp: row.timestamp,
            action: row.action,
            entity_type: row.entity_type,
            entity_key: row.entity_key,
            changes,
        }
    }
}

/// Viewer filter. Dates are local business days, both inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub entity_type: Option<String>,
    pub entity_key: Option<String>,
    pub action: Option<AuditAction>,
    pub user_name: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    /// Matching rows in total, ignoring the page window.
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
    pub entries: Vec<AuditEntryDto>,
}

impl AuditQuery {
    fn to_filter(&self) -> ApiResult<AuditFilter> {
        let to = match self.to {
            Some(date) => {
                let next = date
                    .succ_opt()
                    .ok_or_else(|| ApiError::validation("Date range ends too late"))?;
                Some(day_start(next)?)
            }
            None => None,
        };
        Ok(AuditFilter {
            entity_type: self.entity_type.clone(),
            entity_key: self.entity_key.clone(),
            action: self.action,
            user_name: self.user_name.clone(),
            from: self.from.map(day_start).transpose()?,
            to,
            limit: Some(self.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, MAX_AUDIT_LIMIT)),
            offset: self.offset,
        })
    }
}

/// One page of audit rows, newest first.
pub async fn list_audit(db: &DbState, session: &SessionState, query: AuditQuery) -> ApiResult<AuditPage> {
    session.require(Permission::ViewAudit).await?;
    let filter = query.to_filter()?;

    let db = db.read().await;
    let total = db.audit_logs().count(&filter).await?;
    let entries = db.audit_logs().query(&filter).await?;

    Ok(AuditPage {
        total,
        limit: filter.limit.unwrap_or(DEFAULT_AUDIT_LIMIT),
        offset: filter.offset,
        entries: entries.into_iter().map(AuditEntryDto::from).collect(),
    })
}

//! # Setting Repository
//!
//! Key/value application settings. Every change is audited.

use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::{debug, warn};

use bistro_core::{setting_keys, AppSetting, TrackedChange};

use crate::error::DbResult;
use crate::unit_of_work::UnitOfWork;

/// Tax rate used when the setting is missing or unreadable: 10%.
pub const DEFAULT_TAX_RATE_BPS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct SettingRepository {
    pool: SqlitePool,
}

async fn fetch<'e, E>(executor: E, key: &str) -> DbResult<Option<AppSetting>>
where
    E: SqliteExecutor<'e>,
{
    let setting = sqlx::query_as::<_, AppSetting>("SELECT * FROM app_settings WHERE key = ?1")
        .bind(key)
        .fetch_optional(executor)
        .await?;
    Ok(setting)
}

fn parse_tax_rate(value: Option<String>) -> u32 {
    match value {
        None => DEFAULT_TAX_RATE_BPS,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(value = %raw, "Unreadable tax_rate_bps setting, using default");
            DEFAULT_TAX_RATE_BPS
        }),
    }
}

impl SettingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<AppSetting>> {
        let settings = sqlx::query_as::<_, AppSetting>("SELECT * FROM app_settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(settings)
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        Ok(fetch(&self.pool, key).await?.map(|s| s.value))
    }

    /// Value of `key`, or `default` when unset.
    pub async fn get_or(&self, key: &str, default: &str) -> DbResult<String> {
        Ok(self.get(key).await?.unwrap_or_else(|| default.to_string()))
    }

    pub async fn tax_rate_bps(&self) -> DbResult<u32> {
        Ok(parse_tax_rate(self.get(setting_keys::TAX_RATE_BPS).await?))
    }

    /// Tax rate as seen from inside a unit of work.
    pub async fn tax_rate_bps_in(&self, uow: &mut UnitOfWork) -> DbResult<u32> {
        let setting = fetch(uow.conn(), setting_keys::TAX_RATE_BPS).await?;
        Ok(parse_tax_rate(setting.map(|s| s.value)))
    }

    /// Inserts or replaces a setting.
    pub async fn upsert(&self, uow: &mut UnitOfWork, key: &str, value: &str) -> DbResult<AppSetting> {
        let before = fetch(uow.conn(), key).await?;
        let after = AppSetting {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: Utc::now(),
        };

        debug!(key = %key, "Saving setting");

        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&after.key)
        .bind(&after.value)
        .bind(after.updated_at)
        .execute(uow.conn())
        .await?;

        match before {
            Some(before) => uow.track(TrackedChange::modified(&before, &after)),
            None => uow.track(TrackedChange::added(&after)),
        }
        Ok(after)
    }

    /// Removes a setting. Returns false when it did not exist.
    pub async fn delete(&self, uow: &mut UnitOfWork, key: &str) -> DbResult<bool> {
        let Some(before) = fetch(uow.conn(), key).await? else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM app_settings WHERE key = ?1")
            .bind(key)
            .execute(uow.conn())
            .await?;

        uow.track(TrackedChange::deleted(&before));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::audit::AuditFilter;
    use crate::repository::test_support::db;
    use bistro_core::{Actor, AuditAction};

    #[tokio::test]
    async fn test_defaults_seeded_by_migration() {
        let db = db().await;
        assert_eq!(db.settings().tax_rate_bps().await.unwrap(), 1000);
        assert_eq!(db.settings().list().await.unwrap().len(), setting_keys::ALL.len());
        assert_eq!(db.settings().get_or("missing", "x").await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_setting_changes_are_audited() {
        let db = db().await;

        let mut uow = db.begin(Actor::user("u1", "Boss")).await.unwrap();
        db.settings().upsert(&mut uow, "tax_rate_bps", "825").await.unwrap();
        db.settings().upsert(&mut uow, "printer_name", "kitchen").await.unwrap();
        assert_eq!(db.settings().tax_rate_bps_in(&mut uow).await.unwrap(), 825);
        uow.commit().await.unwrap();

        let mut uow = db.begin(Actor::user("u1", "Boss")).await.unwrap();
        assert!(db.settings().delete(&mut uow, "printer_name").await.unwrap());
        assert!(!db.settings().delete(&mut uow, "printer_name").await.unwrap());
        uow.commit().await.unwrap();

        let rows = db.audit_logs().query(&AuditFilter::default()).await.unwrap();
        let actions: Vec<_> = rows.iter().map(|r| (r.entity_key.as_str(), r.action)).collect();
        assert_eq!(actions[0], ("printer_name", AuditAction::HardDelete));
        assert!(actions.contains(&("tax_rate_bps", AuditAction::Update)));
        assert!(actions.contains(&("printer_name", AuditAction::Insert)));
        assert_eq!(db.settings().tax_rate_bps().await.unwrap(), 825);
    }

    #[test]
    fn test_unreadable_tax_rate_falls_back() {
        assert_eq!(parse_tax_rate(Some("abc".to_string())), DEFAULT_TAX_RATE_BPS);
        assert_eq!(parse_tax_rate(Some(" 500 ".to_string())), 500);
        assert_eq!(parse_tax_rate(None), DEFAULT_TAX_RATE_BPS);
    }
}

//! # Settings Commands
//!
//! Restaurant-wide key/value settings. Every change is audited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use bistro_core::validation::validate_setting;
use bistro_core::{AppSetting, Permission};

use crate::error::{ApiError, ApiResult};
use crate::state::{DbState, SessionState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingDto {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

impl From<AppSetting> for SettingDto {
    fn from(s: AppSetting) -> Self {
        SettingDto {
            key: s.key,
            value: s.value,
            updated_at: s.updated_at,
        }
    }
}

pub async fn list_settings(db: &DbState, session: &SessionState) -> ApiResult<Vec<SettingDto>> {
    session.current().await?;
    let db = db.read().await;
    let settings = db.settings().list().await?;
    Ok(settings.into_iter().map(SettingDto::from).collect())
}

pub async fn get_setting(db: &DbState, session: &SessionState, key: &str) -> ApiResult<String> {
    session.current().await?;
    let db = db.read().await;
    db.settings()
        .get(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Setting", key))
}

/// Validates and saves a known setting.
pub async fn set_setting(
    db: &DbState,
    session: &SessionState,
    key: &str,
    value: &str,
) -> ApiResult<SettingDto> {
    let me = session.require(Permission::ManageSettings).await?;
    let value = validate_setting(key, value)?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let setting = db.settings().upsert(&mut uow, key, &value).await?;
    uow.commit().await?;

    info!(key = %key, by = %me.username, "Setting changed");
    Ok(setting.into())
}

/// Removes a setting; readers fall back to their defaults.
pub async fn delete_setting(db: &DbState, session: &SessionState, key: &str) -> ApiResult<()> {
    let me = session.require(Permission::ManageSettings).await?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    if !db.settings().delete(&mut uow, key).await? {
        return Err(ApiError::not_found("Setting", key));
    }
    uow.commit().await?;

    info!(key = %key, by = %me.username, "Setting removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{app, audit_actions, login_as};
    use crate::error::ErrorCode;
    use bistro_core::{setting_keys, UserRole};

    #[tokio::test]
    async fn test_defaults_are_seeded() {
        let app = app().await;
        login_as(&app, "walt", UserRole::Waiter).await;

        let keys: Vec<String> = list_settings(&app.db, &app.session)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.key)
            .collect();
        for key in setting_keys::ALL {
            assert!(keys.iter().any(|k| k == key), "missing {}", key);
        }
        assert_eq!(
            get_setting(&app.db, &app.session, setting_keys::TAX_RATE_BPS).await.unwrap(),
            "1000"
        );
    }

    #[tokio::test]
    async fn test_set_validates_and_audits() {
        let app = app().await;
        login_as(&app, "mgr", UserRole::Manager).await;

        let err = set_setting(&app.db, &app.session, setting_keys::TAX_RATE_BPS, "10001")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        let err = set_setting(&app.db, &app.session, "theme", "dark").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        set_setting(&app.db, &app.session, setting_keys::TAX_RATE_BPS, " 825 ")
            .await
            .unwrap();
        assert_eq!(
            get_setting(&app.db, &app.session, setting_keys::TAX_RATE_BPS).await.unwrap(),
            "825"
        );
        assert_eq!(audit_actions(&app, setting_keys::TAX_RATE_BPS).await, vec!["update"]);

        delete_setting(&app.db, &app.session, setting_keys::RECEIPT_FOOTER)
            .await
            .unwrap();
        assert_eq!(
            audit_actions(&app, setting_keys::RECEIPT_FOOTER).await,
            vec!["hard_delete"]
        );
        let err = delete_setting(&app.db, &app.session, setting_keys::RECEIPT_FOOTER)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        set_setting(&app.db, &app.session, setting_keys::RECEIPT_FOOTER, "Ciao!")
            .await
            .unwrap();
        assert_eq!(
            audit_actions(&app, setting_keys::RECEIPT_FOOTER).await,
            vec!["hard_delete", "insert"]
        );
    }

    #[tokio::test]
    async fn test_waiter_cannot_change_settings() {
        let app = app().await;
        login_as(&app, "walt", UserRole::Waiter).await;

        let err = set_setting(&app.db, &app.session, setting_keys::CURRENCY_SYMBOL, "€")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }
}

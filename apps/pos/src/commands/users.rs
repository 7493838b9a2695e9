//! # User Commands
//!
//! Staff accounts, managed by administrators. Every change to a user is
//! audited; password hashes appear in audit rows only as `***`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use bistro_core::validation::{validate_email, validate_name, validate_password, validate_username};
use bistro_core::{new_id, Actor, Permission, TokenPurpose, User, UserRole};

use crate::commands::auth::issue_code;
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::mail::{verification_message, Mailer};
use crate::security::hash_password;
use crate::state::{DbState, SessionState};

/// A staff account without its password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub email_verified: bool,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserDto {
    fn from(u: User) -> Self {
        UserDto {
            id: u.id,
            username: u.username,
            email: u.email,
            display_name: u.display_name,
            role: u.role,
            email_verified: u.email_verified,
            is_active: u.is_active,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub role: UserRole,
}

/// Fields left `None` are not changed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

/// Validates and hashes a new account. `email_verified` starts false.
fn build_user(input: &NewUser) -> ApiResult<User> {
    let username = validate_username(&input.username)?;
    let email = validate_email(&input.email)?;
    let display_name = validate_name("display name", &input.display_name)?;
    validate_password(&input.password)?;

    let now = Utc::now();
    Ok(User {
        id: new_id(),
        username,
        email,
        display_name,
        password_hash: hash_password(&input.password)?,
        role: input.role,
        email_verified: false,
        is_active: true,
        is_deleted: false,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    })
}

pub async fn list_users(db: &DbState, session: &SessionState) -> ApiResult<Vec<UserDto>> {
    session.require(Permission::ManageUsers).await?;
    let db = db.read().await;
    let users = db.users().list().await?;
    Ok(users.into_iter().map(UserDto::from).collect())
}

/// Creates an account and mails its email verification code.
///
/// The account is kept when the mail cannot be handed over; the code can be
/// sent again with [`send_verification`].
pub async fn register_user(
    db: &DbState,
    session: &SessionState,
    mailer: &dyn Mailer,
    input: NewUser,
) -> ApiResult<UserDto> {
    let me = session.require(Permission::ManageUsers).await?;
    let user = build_user(&input)?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let user = db.users().insert(&mut uow, &user).await?;
    let code = issue_code(&db, &mut uow, &user, TokenPurpose::EmailVerification).await?;
    uow.commit().await?;

    info!(user = %user.username, role = %user.role, by = %me.username, "User registered");

    if let Err(e) = mailer.send(&verification_message(&user, &code)).await {
        warn!(user = %user.username, error = %e, "Verification mail not sent");
    }
    Ok(user.into())
}

pub async fn send_verification(
    db: &DbState,
    session: &SessionState,
    mailer: &dyn Mailer,
    user_id: &str,
) -> ApiResult<()> {
    let me = session.require(Permission::ManageUsers).await?;
    let db = db.read().await;

    let mut uow = db.begin(me.actor()).await?;
    let user = db
        .users()
        .load(&mut uow, user_id)
        .await?
        .filter(|u| !u.is_deleted)
        .ok_or_else(|| ApiError::not_found("User", user_id))?;
    if user.email_verified {
        return Err(ApiError::business(format!(
            "{} has already verified their email",
            user.username
        )));
    }
    let code = issue_code(&db, &mut uow, &user, TokenPurpose::EmailVerification).await?;
    uow.commit().await?;

    mailer.send(&verification_message(&user, &code)).await?;
    Ok(())
}

pub async fn update_user(
    db: &DbState,
    session: &SessionState,
    user_id: &str,
    update: UserUpdate,
) -> ApiResult<UserDto> {
    let me = session.require(Permission::ManageUsers).await?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let mut user = db
        .users()
        .load(&mut uow, user_id)
        .await?
        .filter(|u| !u.is_deleted)
        .ok_or_else(|| ApiError::not_found("User", user_id))?;

    if let Some(name) = &update.display_name {
        user.display_name = validate_name("display name", name)?;
    }
    if let Some(email) = &update.email {
        let email = validate_email(email)?;
        if email != user.email {
            user.email = email;
            user.email_verified = false;
        }
    }
    if let Some(role) = update.role {
        user.role = role;
    }
    if let Some(active) = update.is_active {
        user.is_active = active;
    }

    if user.id == me.user_id && (!user.is_active || !user.role.can(Permission::ManageUsers)) {
        return Err(ApiError::business("You cannot lock yourself out"));
    }

    let user = db.users().update(&mut uow, &user).await?;
    uow.commit().await?;

    session.refresh_from(&user).await;
    Ok(user.into())
}

/// Soft delete. The account disappears from lists and cannot log in, but
/// orders keep pointing at it.
pub async fn delete_user(db: &DbState, session: &SessionState, user_id: &str) -> ApiResult<()> {
    let me = session.require(Permission::ManageUsers).await?;
    if user_id == me.user_id {
        return Err(ApiError::business("You cannot delete your own account"));
    }

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let mut user = db
        .users()
        .load(&mut uow, user_id)
        .await?
        .filter(|u| !u.is_deleted)
        .ok_or_else(|| ApiError::not_found("User", user_id))?;
    user.is_deleted = true;
    user.is_active = false;
    db.users().update(&mut uow, &user).await?;
    uow.commit().await?;

    info!(user = %user.username, by = %me.username, "User deleted");
    Ok(())
}

/// Hard delete, only for accounts that never served an order.
pub async fn purge_user(db: &DbState, session: &SessionState, user_id: &str) -> ApiResult<()> {
    let me = session.require(Permission::ManageUsers).await?;
    if user_id == me.user_id {
        return Err(ApiError::business("You cannot delete your own account"));
    }

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let orders = db.orders().count_for_waiter(&mut uow, user_id).await?;
    if orders > 0 {
        return Err(ApiError::business(format!(
            "User has {} orders; delete it instead of purging",
            orders
        )));
    }
    let user = db.users().purge(&mut uow, user_id).await?;
    uow.commit().await?;

    warn!(user = %user.username, by = %me.username, "User purged");
    Ok(())
}

/// First administrator of a fresh installation. Refused once any account
/// exists.
pub async fn create_admin(db: &DbState, input: NewUser) -> ApiResult<UserDto> {
    let db = db.read().await;
    if db.users().count().await? > 0 {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "Users already exist; log in as an administrator to add more",
        ));
    }

    let mut user = build_user(&NewUser {
        role: UserRole::Admin,
        ..input
    })?;
    user.email_verified = true;

    let mut uow = db.begin(Actor::system()).await?;
    let user = db.users().insert(&mut uow, &user).await?;
    uow.commit().await?;

    info!(user = %user.username, "Administrator created");
    Ok(user.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::auth;
    use crate::commands::test_support::{add_user, app, audit_actions, login_as};

    fn new_user(username: &str, role: UserRole) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{}@bistro.test", username),
            display_name: username.to_uppercase(),
            password: "w4iterpass".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_register_and_verify() {
        let app = app().await;
        login_as(&app, "admin", UserRole::Admin).await;

        let user = register_user(&app.db, &app.session, app.mailer.as_ref(), new_user("Walt", UserRole::Waiter))
            .await
            .unwrap();
        assert_eq!(user.username, "walt");
        assert!(!user.email_verified);

        let sent = app.mailer.messages();
        assert_eq!(sent.len(), 1);
        let code: String = sent[0]
            .body
            .split_whitespace()
            .map(|w| w.trim_end_matches('.'))
            .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
            .unwrap()
            .to_string();

        auth::verify_email(&app.db, "walt", &code).await.unwrap();
        let db = app.db.read().await;
        assert!(db.users().find(&user.id).await.unwrap().unwrap().email_verified);
    }

    #[tokio::test]
    async fn test_register_requires_admin() {
        let app = app().await;
        login_as(&app, "mgr", UserRole::Manager).await;
        let err = register_user(&app.db, &app.session, app.mailer.as_ref(), new_user("walt", UserRole::Waiter))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let app = app().await;
        login_as(&app, "admin", UserRole::Admin).await;
        add_user(&app, "walt", UserRole::Waiter).await;

        let mut input = new_user("walt", UserRole::Waiter);
        input.email = "other@bistro.test".to_string();
        let err = register_user(&app.db, &app.session, app.mailer.as_ref(), input)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_update_user_changes_role_and_resets_verification() {
        let app = app().await;
        login_as(&app, "admin", UserRole::Admin).await;
        let walt = add_user(&app, "walt", UserRole::Waiter).await;

        let updated = update_user(
            &app.db,
            &app.session,
            &walt.id,
            UserUpdate {
                role: Some(UserRole::Manager),
                email: Some("walt@elsewhere.test".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.role, UserRole::Manager);
        assert!(!updated.email_verified);
    }

    #[tokio::test]
    async fn test_cannot_lock_yourself_out() {
        let app = app().await;
        let admin = login_as(&app, "admin", UserRole::Admin).await;

        let err = update_user(
            &app.db,
            &app.session,
            &admin.id,
            UserUpdate {
                role: Some(UserRole::Waiter),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::BusinessLogic);
        assert!(delete_user(&app.db, &app.session, &admin.id).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_and_purge_are_audited() {
        let app = app().await;
        login_as(&app, "admin", UserRole::Admin).await;
        let walt = add_user(&app, "walt", UserRole::Waiter).await;
        let temp = add_user(&app, "temp", UserRole::Chef).await;

        delete_user(&app.db, &app.session, &walt.id).await.unwrap();
        purge_user(&app.db, &app.session, &temp.id).await.unwrap();

        assert_eq!(audit_actions(&app, &walt.id).await, vec!["insert", "update"]);
        assert_eq!(audit_actions(&app, &temp.id).await, vec!["insert", "hard_delete"]);

        let listed = list_users(&app.db, &app.session).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_create_admin_only_on_empty_database() {
        let app = app().await;
        let admin = create_admin(&app.db, new_user("boss", UserRole::Waiter)).await.unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert!(admin.email_verified);

        let err = create_admin(&app.db, new_user("second", UserRole::Admin)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }
}

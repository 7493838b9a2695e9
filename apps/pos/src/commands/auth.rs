//! # Auth Commands
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  login ─► verify Argon2 hash ─► last_login_at saved ─► Session          │
//! │                                                                         │
//! │  register (users.rs) ──► code mailed ──► verify_email(code)             │
//! │                                                                         │
//! │  request_password_reset(email) ──► code mailed ──► reset_password       │
//! │        (unknown email: silently OK)                                     │
//! │                                                                         │
//! │  Codes: 6 digits, valid 15 minutes, single use. Issuing a new code      │
//! │  revokes the open ones for the same purpose.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use bistro_core::validation::{validate_email, validate_password};
use bistro_core::{
    new_id, Actor, CoreError, TokenPurpose, User, UserToken, TOKEN_LIFETIME_MINUTES,
};
use bistro_db::{Database, UnitOfWork};

use crate::error::{ApiError, ApiResult};
use crate::mail::{password_reset_message, Mailer};
use crate::security::{generate_code, hash_password, verify_password};
use crate::state::{DbState, Session, SessionState};

/// Revokes open codes of `purpose` and issues a fresh one.
pub(crate) async fn issue_code(
    db: &Database,
    uow: &mut UnitOfWork,
    user: &User,
    purpose: TokenPurpose,
) -> ApiResult<String> {
    let now = Utc::now();
    let revoked = db.tokens().revoke_open(uow, &user.id, purpose, now).await?;
    if revoked > 0 {
        debug!(user = %user.username, revoked, "Revoked open codes");
    }

    let token = UserToken {
        id: new_id(),
        user_id: user.id.clone(),
        purpose,
        code: generate_code(),
        expires_at: now + Duration::minutes(TOKEN_LIFETIME_MINUTES),
        used_at: None,
        created_at: now,
    };
    db.tokens().insert(uow, &token).await?;
    Ok(token.code)
}

fn actor_for(user: &User) -> Actor {
    Actor::user(&user.id, &user.display_name)
}

pub async fn login(
    db: &DbState,
    session: &SessionState,
    login: &str,
    password: &str,
) -> ApiResult<Session> {
    let db = db.read().await;
    let login = login.trim();

    let user = db
        .users()
        .find_by_login(login)
        .await?
        .filter(User::can_login);
    let Some(user) = user else {
        warn!(login = %login, "Login refused: unknown or inactive user");
        return Err(CoreError::InvalidCredentials.into());
    };
    if !verify_password(password, &user.password_hash) {
        warn!(login = %login, "Login refused: wrong password");
        return Err(CoreError::InvalidCredentials.into());
    }

    let now = Utc::now();
    let mut uow = db.begin(actor_for(&user)).await?;
    let mut seen = user.clone();
    seen.last_login_at = Some(now);
    let user = db.users().update(&mut uow, &seen).await?;
    uow.commit().await?;

    let started = Session::from_user(&user, now);
    session.set(started.clone()).await;
    Ok(started)
}

pub async fn logout(session: &SessionState) -> ApiResult<()> {
    session.clear().await;
    Ok(())
}

pub async fn whoami(session: &SessionState) -> ApiResult<Session> {
    session.current().await
}

/// Confirms the email address of `login` with the mailed code.
pub async fn verify_email(db: &DbState, login: &str, code: &str) -> ApiResult<()> {
    let db = db.read().await;
    let user = db
        .users()
        .find_by_login(login.trim())
        .await?
        .ok_or(CoreError::InvalidCode)?;
    if user.email_verified {
        debug!(user = %user.username, "Email already verified");
        return Ok(());
    }

    let now = Utc::now();
    let mut uow = db.begin(actor_for(&user)).await?;
    let token = db
        .tokens()
        .find_usable(&mut uow, &user.id, TokenPurpose::EmailVerification, code, now)
        .await?
        .ok_or(CoreError::InvalidCode)?;
    db.tokens().mark_used(&mut uow, &token, now).await?;

    let mut verified = user.clone();
    verified.email_verified = true;
    db.users().update(&mut uow, &verified).await?;
    uow.commit().await?;

    info!(user = %user.username, "Email verified");
    Ok(())
}

/// Mails a reset code. Unknown or disabled accounts succeed without mail
/// so the command cannot be used to probe addresses.
pub async fn request_password_reset(
    db: &DbState,
    mailer: &dyn Mailer,
    email: &str,
) -> ApiResult<()> {
    let email = validate_email(email)?;
    let db = db.read().await;

    let Some(user) = db.users().find_by_email(&email).await?.filter(User::can_login) else {
        debug!("Password reset requested for an unknown address");
        return Ok(());
    };

    let mut uow = db.begin(Actor::system()).await?;
    let code = issue_code(&db, &mut uow, &user, TokenPurpose::PasswordReset).await?;
    uow.commit().await?;

    mailer.send(&password_reset_message(&user, &code)).await?;
    info!(user = %user.username, "Password reset code sent");
    Ok(())
}

pub async fn reset_password(
    db: &DbState,
    email: &str,
    code: &str,
    new_password: &str,
) -> ApiResult<()> {
    let email = validate_email(email)?;
    validate_password(new_password)?;

    let db = db.read().await;
    let user = db
        .users()
        .find_by_email(&email)
        .await?
        .filter(User::can_login)
        .ok_or(CoreError::InvalidCode)?;

    let now = Utc::now();
    let mut uow = db.begin(actor_for(&user)).await?;
    let token = db
        .tokens()
        .find_usable(&mut uow, &user.id, TokenPurpose::PasswordReset, code, now)
        .await?
        .ok_or(CoreError::InvalidCode)?;
    db.tokens().mark_used(&mut uow, &token, now).await?;

    let mut changed = user.clone();
    changed.password_hash = hash_password(new_password)?;
    db.users().update(&mut uow, &changed).await?;
    uow.commit().await?;

    info!(user = %user.username, "Password reset");
    Ok(())
}

pub async fn change_password(
    db: &DbState,
    session: &SessionState,
    old_password: &str,
    new_password: &str,
) -> ApiResult<()> {
    let me = session.current().await?;
    validate_password(new_password)?;
    if old_password == new_password {
        return Err(ApiError::validation("New password must differ from the old one"));
    }

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let user = db
        .users()
        .load(&mut uow, &me.user_id)
        .await?
        .filter(User::can_login)
        .ok_or_else(|| ApiError::not_found("User", &me.user_id))?;
    if !verify_password(old_password, &user.password_hash) {
        return Err(CoreError::InvalidCredentials.into());
    }

    let mut changed = user;
    changed.password_hash = hash_password(new_password)?;
    db.users().update(&mut uow, &changed).await?;
    uow.commit().await?;

    info!(user = %me.username, "Password changed");
    Ok(())
}

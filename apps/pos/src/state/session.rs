//! # Session State
//!
//! The staff member logged in at this terminal. Every command asks the
//! session for the caller before touching the database: `current()` when
//! any logged-in user may run it, `require(permission)` otherwise.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use bistro_core::{Actor, Permission, User, UserRole};

use crate::error::{ApiError, ApiResult};

/// Who is logged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub role: UserRole,
    pub logged_in_at: DateTime<Utc>,
}

impl Session {
    pub fn from_user(user: &User, now: DateTime<Utc>) -> Self {
        Session {
            user_id: user.id.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            logged_in_at: now,
        }
    }

    /// The name written into audit rows for this user's changes.
    pub fn actor(&self) -> Actor {
        Actor::user(&self.user_id, &self.display_name)
    }
}

#[derive(Debug, Default)]
pub struct SessionState {
    session: RwLock<Option<Session>>,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState::default()
    }

    pub async fn set(&self, session: Session) {
        info!(user = %session.username, role = %session.role, "Session started");
        *self.session.write().await = Some(session);
    }

    /// Ends the session; returns who was logged in.
    pub async fn clear(&self) -> Option<Session> {
        let previous = self.session.write().await.take();
        if let Some(session) = &previous {
            info!(user = %session.username, "Session ended");
        }
        previous
    }

    pub async fn get(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// The logged-in user, or `Unauthorized`.
    pub async fn current(&self) -> ApiResult<Session> {
        self.get()
            .await
            .ok_or_else(|| ApiError::unauthorized("Please log in first"))
    }

    /// The logged-in user if their role grants `permission`.
    pub async fn require(&self, permission: Permission) -> ApiResult<Session> {
        let session = self.current().await?;
        session.role.require(permission)?;
        Ok(session)
    }

    /// Keeps the session in step after the user edited their own account.
    pub async fn refresh_from(&self, user: &User) {
        let mut guard = self.session.write().await;
        if let Some(session) = guard.as_mut().filter(|s| s.user_id == user.id) {
            session.display_name = user.display_name.clone();
            session.role = user.role;
        }
    }
}

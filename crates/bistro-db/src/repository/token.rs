//! # Token Repository
//!
//! One-time codes for email verification and password reset. A newer code
//! for the same purpose supersedes older unused ones.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use bistro_core::{TokenPurpose, TrackedChange, UserToken};

use crate::error::DbResult;
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone)]
pub struct TokenRepository {
    pool: SqlitePool,
}

impl TokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TokenRepository { pool }
    }

    /// Unused tokens of a user, newest first.
    pub async fn list_open(&self, user_id: &str) -> DbResult<Vec<UserToken>> {
        let tokens = sqlx::query_as::<_, UserToken>(
            r#"
            SELECT * FROM user_tokens
            WHERE user_id = ?1 AND used_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }

    /// Marks every unused token of `purpose` as used.
    pub async fn revoke_open(
        &self,
        uow: &mut UnitOfWork,
        user_id: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> DbResult<usize> {
        let open = sqlx::query_as::<_, UserToken>(
            "SELECT * FROM user_tokens WHERE user_id = ?1 AND purpose = ?2 AND used_at IS NULL",
        )
        .bind(user_id)
        .bind(purpose)
        .fetch_all(uow.conn())
        .await?;

        for token in &open {
            self.mark_used(uow, token, now).await?;
        }
        Ok(open.len())
    }

    pub async fn insert(&self, uow: &mut UnitOfWork, token: &UserToken) -> DbResult<UserToken> {
        debug!(user_id = %token.user_id, purpose = ?token.purpose, "Issuing token");

        sqlx::query(
            r#"
            INSERT INTO user_tokens (id, user_id, purpose, code, expires_at, used_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&token.id)
        .bind(&token.user_id)
        .bind(token.purpose)
        .bind(&token.code)
        .bind(token.expires_at)
        .bind(token.used_at)
        .bind(token.created_at)
        .execute(uow.conn())
        .await?;

        uow.track(TrackedChange::added(token));
        Ok(token.clone())
    }

    /// The unused, unexpired token matching `code`, if any.
    pub async fn find_usable(
        &self,
        uow: &mut UnitOfWork,
        user_id: &str,
        purpose: TokenPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<UserToken>> {
        let token = sqlx::query_as::<_, UserToken>(
            r#"
            SELECT * FROM user_tokens
            WHERE user_id = ?1 AND purpose = ?2 AND code = ?3 AND used_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(purpose)
        .bind(code.trim())
        .fetch_optional(uow.conn())
        .await?;

        Ok(token.filter(|t| t.is_usable(now)))
    }

    pub async fn mark_used(
        &self,
        uow: &mut UnitOfWork,
        token: &UserToken,
        now: DateTime<Utc>,
    ) -> DbResult<UserToken> {
        let mut used = token.clone();
        used.used_at = Some(now);

        sqlx::query("UPDATE user_tokens SET used_at = ?2 WHERE id = ?1")
            .bind(&used.id)
            .bind(used.used_at)
            .execute(uow.conn())
            .await?;

        uow.track(TrackedChange::modified(token, &used));
        Ok(used)
    }
}

//! # User Repository
//!
//! Staff accounts. Every change to a user is audited, so writes always go
//! through [`UserRepository::update`] with the full before/after rows.

use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use bistro_core::{TrackedChange, User};

use crate::error::{DbError, DbResult};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

async fn fetch<'e, E>(executor: E, id: &str) -> DbResult<Option<User>>
where
    E: SqliteExecutor<'e>,
{
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(user)
}

async fn fetch_by_email<'e, E>(executor: E, email: &str) -> DbResult<Option<User>>
where
    E: SqliteExecutor<'e>,
{
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE email = ?1 COLLATE NOCASE AND is_deleted = 0",
    )
    .bind(email)
    .fetch_optional(executor)
    .await?;
    Ok(user)
}

fn unique_field(err: sqlx::Error, user: &User) -> DbError {
    match DbError::from(err) {
        DbError::UniqueViolation { field, .. } if field == "email" => {
            DbError::duplicate("email", &user.email)
        }
        DbError::UniqueViolation { .. } => DbError::duplicate("username", &user.username),
        other => other,
    }
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Live accounts (active or not) by username.
    pub async fn list(&self) -> DbResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE is_deleted = 0 ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    pub async fn find(&self, id: &str) -> DbResult<Option<User>> {
        Ok(fetch(&self.pool, id).await?.filter(|u| !u.is_deleted))
    }

    pub async fn find_including_deleted(&self, id: &str) -> DbResult<Option<User>> {
        fetch(&self.pool, id).await
    }

    /// Looks a live user up by username or email, case-insensitively.
    pub async fn find_by_login(&self, login: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE (username = ?1 COLLATE NOCASE OR email = ?1 COLLATE NOCASE)
              AND is_deleted = 0
            LIMIT 1
            "#,
        )
        .bind(login.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        fetch_by_email(&self.pool, email).await
    }

    pub async fn load(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<Option<User>> {
        fetch(uow.conn(), id).await
    }

    pub async fn load_by_email(&self, uow: &mut UnitOfWork, email: &str) -> DbResult<Option<User>> {
        fetch_by_email(uow.conn(), email).await
    }

    /// Number of accounts ever created, deleted ones included.
    pub async fn count(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn insert(&self, uow: &mut UnitOfWork, user: &User) -> DbResult<User> {
        debug!(id = %user.id, username = %user.username, role = %user.role, "Inserting user");

        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, email, display_name, password_hash, role,
                email_verified, is_active, is_deleted, last_login_at,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.email_verified)
        .bind(user.is_active)
        .bind(user.is_deleted)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(uow.conn())
        .await
        .map_err(|e| unique_field(e, user))?;

        uow.track(TrackedChange::added(user));
        Ok(user.clone())
    }

    pub async fn update(&self, uow: &mut UnitOfWork, user: &User) -> DbResult<User> {
        let before = self
            .load(uow, &user.id)
            .await?
            .ok_or_else(|| DbError::not_found("User", &user.id))?;

        let mut after = user.clone();
        after.updated_at = Utc::now();

        debug!(id = %after.id, username = %after.username, "Updating user");

        sqlx::query(
            r#"
            UPDATE users SET
                username = ?2,
                email = ?3,
                display_name = ?4,
                password_hash = ?5,
                role = ?6,
                email_verified = ?7,
                is_active = ?8,
                is_deleted = ?9,
                last_login_at = ?10,
                updated_at = ?11
            WHERE id = ?1
            "#,
        )
        .bind(&after.id)
        .bind(&after.username)
        .bind(&after.email)
        .bind(&after.display_name)
        .bind(&after.password_hash)
        .bind(after.role)
        .bind(after.email_verified)
        .bind(after.is_active)
        .bind(after.is_deleted)
        .bind(after.last_login_at)
        .bind(after.updated_at)
        .execute(uow.conn())
        .await
        .map_err(|e| unique_field(e, &after))?;

        uow.track(TrackedChange::modified(&before, &after));
        Ok(after)
    }

    /// Removes the account row and its tokens.
    pub async fn purge(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<User> {
        let user = self
            .load(uow, id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))?;

        debug!(id = %id, username = %user.username, "Purging user");

        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(uow.conn())
            .await
            .map_err(|e| {
                DbError::from(e).with_reference(format!("user {} still has orders", user.username))
            })?;

        uow.track(TrackedChange::deleted(&user));
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::audit::AuditFilter;
    use crate::repository::test_support::{db, insert_user, user};
    use bistro_core::{Actor, AuditAction, UserRole};

    #[tokio::test]
    async fn test_login_lookup_is_case_insensitive() {
        let db = db().await;
        let maria = insert_user(&db, "maria", UserRole::Waiter).await;

        let by_name = db.users().find_by_login("MARIA").await.unwrap().unwrap();
        assert_eq!(by_name.id, maria.id);
        let by_mail = db.users().find_by_login("Maria@Bistro.test").await.unwrap().unwrap();
        assert_eq!(by_mail.id, maria.id);
        assert!(db.users().find_by_login("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_names_the_field() {
        let db = db().await;
        insert_user(&db, "maria", UserRole::Waiter).await;

        let mut twin = user("maria2", UserRole::Chef);
        twin.email = "maria@bistro.test".to_string();

        let mut uow = db.begin(Actor::system()).await.unwrap();
        let err = db.users().insert(&mut uow, &twin).await.unwrap_err();
        match err {
            DbError::UniqueViolation { field, .. } => assert_eq!(field, "email"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_every_user_change_is_audited_with_hash_redacted() {
        let db = db().await;
        let maria = insert_user(&db, "maria", UserRole::Waiter).await;

        let mut uow = db.begin(Actor::user("admin", "Boss")).await.unwrap();
        let mut changed = maria.clone();
        changed.password_hash = "$argon2id$new".to_string();
        changed.last_login_at = Some(Utc::now());
        db.users().update(&mut uow, &changed).await.unwrap();
        db.users().purge(&mut uow, &maria.id).await.unwrap();
        uow.commit().await.unwrap();

        let rows = db.audit_logs().query(&AuditFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        // update + purge in one unit of work fold into one hard delete
        assert_eq!(rows[0].action, AuditAction::HardDelete);
        assert_eq!(rows[0].user_name, "Boss");
        assert!(rows[0].changes.contains("\"password_hash\":\"***\""));
        assert!(!rows[0].changes.contains("argon2"));
        assert_eq!(rows[1].action, AuditAction::Insert);
        assert!(db.users().find_including_deleted(&maria.id).await.unwrap().is_none());
    }
}

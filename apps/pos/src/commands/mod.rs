//! # Commands Module
//!
//! Every screen of the terminal as a function.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs       ◄─── You are here (exports)
//! ├── auth.rs      ◄─── Login, email verification, password reset
//! ├── users.rs     ◄─── Staff accounts
//! ├── menu.rs      ◄─── Categories and products
//! ├── tables.rs    ◄─── Floor plan
//! ├── orders.rs    ◄─── Order editor, payment, cancellation
//! ├── kitchen.rs   ◄─── Kitchen display
//! ├── settings.rs  ◄─── Restaurant settings
//! ├── reports.rs   ◄─── Sales reports
//! ├── audit.rs     ◄─── Audit log viewer
//! ├── receipt.rs   ◄─── Receipt printing
//! └── backup.rs    ◄─── Backup and restore
//! ```
//!
//! ## How Commands Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  pub async fn add_item(                                                 │
//! │      db: &DbState,            ◄── shared database handle                │
//! │      session: &SessionState,  ◄── who is calling                        │
//! │      input: AddItem,          ◄── parsed from the shell line            │
//! │  ) -> ApiResult<OrderDto>                                               │
//! │         │                                                               │
//! │         ├── session.require(Permission::TakeOrders)                     │
//! │         ├── validate input (bistro_core::validation)                    │
//! │         ├── db.begin(session.actor())  ── unit of work                  │
//! │         ├── repository writes, tracked in the unit of work              │
//! │         └── uow.commit()  ── audit rows written in the same transaction │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each command declares only the state it needs. Responses are DTOs
//! serialized in camelCase.

pub mod audit;
pub mod auth;
pub mod backup;
pub mod kitchen;
pub mod menu;
pub mod orders;
pub mod receipt;
pub mod reports;
pub mod settings;
pub mod tables;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use chrono::Utc;

    use bistro_core::{new_id, Actor, Product, RestaurantTable, User, UserRole};
    use bistro_db::{Database, DbConfig};

    use crate::mail::testing::RecordingMailer;
    use crate::security::hash_password;
    use crate::state::{ConfigState, DbState, Session, SessionState};

    pub const PASSWORD: &str = "s3cretpass";

    pub struct TestApp {
        pub db: DbState,
        pub session: SessionState,
        pub config: ConfigState,
        pub mailer: Arc<RecordingMailer>,
    }

    pub async fn app() -> TestApp {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        TestApp {
            db: DbState::new(db),
            session: SessionState::new(),
            config: ConfigState::default(),
            mailer: Arc::new(RecordingMailer::default()),
        }
    }

    /// Inserts a user with [`PASSWORD`] as its password.
    pub async fn add_user(app: &TestApp, username: &str, role: UserRole) -> User {
        let now = Utc::now();
        let user = User {
            id: new_id(),
            username: username.to_string(),
            email: format!("{}@bistro.test", username),
            display_name: format!("{}{}", username[..1].to_uppercase(), &username[1..]),
            password_hash: hash_password(PASSWORD).unwrap(),
            role,
            email_verified: true,
            is_active: true,
            is_deleted: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        let db = app.db.read().await;
        let mut uow = db.begin(Actor::system()).await.unwrap();
        let user = db.users().insert(&mut uow, &user).await.unwrap();
        uow.commit().await.unwrap();
        user
    }

    /// Creates a user and makes it the session user.
    pub async fn login_as(app: &TestApp, username: &str, role: UserRole) -> User {
        let user = add_user(app, username, role).await;
        app.session.set(Session::from_user(&user, Utc::now())).await;
        user
    }

    pub async fn add_table(app: &TestApp, name: &str) -> RestaurantTable {
        let db = app.db.read().await;
        let mut uow = db.begin(Actor::system()).await.unwrap();
        let table = db.tables().create(&mut uow, name, 4).await.unwrap();
        uow.commit().await.unwrap();
        table
    }

    pub async fn add_product(app: &TestApp, name: &str, price_cents: i64) -> Product {
        let now = Utc::now();
        let product = Product {
            id: new_id(),
            category_id: None,
            name: name.to_string(),
            description: None,
            price_cents,
            is_available: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        let db = app.db.read().await;
        let mut uow = db.begin(Actor::system()).await.unwrap();
        let product = db.products().insert(&mut uow, &product).await.unwrap();
        uow.commit().await.unwrap();
        product
    }

    /// Audit rows for one entity, oldest first.
    pub async fn audit_actions(app: &TestApp, entity_key: &str) -> Vec<String> {
        let db = app.db.read().await;
        let filter = bistro_db::AuditFilter {
            entity_key: Some(entity_key.to_string()),
            ..Default::default()
        };
        let mut rows = db.audit_logs().query(&filter).await.unwrap();
        rows.reverse();
        rows.into_iter().map(|r| r.action.as_str().to_string()).collect()
    }
}

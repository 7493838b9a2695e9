//! # Repository Module
//!
//! Database repository implementations for Bistro POS.
//!
//! ## Reads and Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Reads                          Writes                                  │
//! │  ─────                          ──────                                  │
//! │  repo.find(id)        pool      repo.insert(&mut uow, &entity)          │
//! │  repo.list()          pool      repo.update(&mut uow, &entity)          │
//! │  repo.search(q, n)    pool        │                                     │
//! │                                   ├── SQL on uow.conn()                 │
//! │  repo.load(&mut uow, id)          └── uow.track(TrackedChange::..)      │
//! │  (inside a transaction,                                                 │
//! │   soft-deleted rows included)                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Live reads (`find`, `list`, ...) skip soft-deleted rows. The
//! `*_including_deleted` variants and `load` do not.
//!
//! While a unit of work is open, read through it rather than the pool: an
//! in-memory database has a single connection and the unit of work holds it.

pub mod audit;
pub mod category;
pub mod order;
pub mod product;
pub mod report;
pub mod setting;
pub mod table;
pub mod token;
pub mod user;

pub use audit::{AuditFilter, AuditLogRepository};
pub use category::CategoryRepository;
pub use order::OrderRepository;
pub use product::ProductRepository;
pub use report::{ReportRepository, SalesSummary, TopProduct, WaiterSales};
pub use setting::SettingRepository;
pub use table::{TableRepository, TableOccupancy};
pub use token::TokenRepository;
pub use user::UserRepository;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use bistro_core::{new_id, Actor, Category, Product, RestaurantTable, User, UserRole};

    use crate::{Database, DbConfig};

    pub async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub fn product(name: &str, price_cents: i64) -> Product {
        let now = Utc::now();
        Product {
            id: new_id(),
            category_id: None,
            name: name.to_string(),
            description: None,
            price_cents,
            is_available: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn user(username: &str, role: UserRole) -> User {
        let now = Utc::now();
        User {
            id: new_id(),
            username: username.to_string(),
            email: format!("{username}@bistro.test"),
            display_name: username.to_uppercase(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
            role,
            email_verified: true,
            is_active: true,
            is_deleted: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn insert_product(db: &Database, name: &str, price_cents: i64) -> Product {
        let mut uow = db.begin(Actor::system()).await.unwrap();
        let product = db.products().insert(&mut uow, &product(name, price_cents)).await.unwrap();
        uow.commit().await.unwrap();
        product
    }

    pub async fn insert_category(db: &Database, name: &str) -> Category {
        let mut uow = db.begin(Actor::system()).await.unwrap();
        let category = db.categories().create(&mut uow, name, None, 0).await.unwrap();
        uow.commit().await.unwrap();
        category
    }

    pub async fn insert_table(db: &Database, name: &str) -> RestaurantTable {
        let mut uow = db.begin(Actor::system()).await.unwrap();
        let table = db.tables().create(&mut uow, name, 4).await.unwrap();
        uow.commit().await.unwrap();
        table
    }

    pub async fn insert_user(db: &Database, username: &str, role: UserRole) -> User {
        let mut uow = db.begin(Actor::system()).await.unwrap();
        let user = db.users().insert(&mut uow, &user(username, role)).await.unwrap();
        uow.commit().await.unwrap();
        user
    }
}

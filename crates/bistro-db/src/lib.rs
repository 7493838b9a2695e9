//! # bistro-db: Database Layer for Bistro POS
//!
//! SQLite storage through sqlx, with every write running in a
//! [`UnitOfWork`] that writes audit rows before it commits.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bistro POS Data Flow                             │
//! │                                                                         │
//! │  Command (e.g. orders::add_item)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     bistro-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │ orders, menu, │    │  (embedded)  │   │   │
//! │  │   │               │    │ users, audit  │    │              │   │   │
//! │  │   │ SqlitePool    │◄───│ reports, ...  │    │ 001_initial  │   │   │
//! │  │   │ begin(actor)  │    │               │    │ 002_search   │   │   │
//! │  │   └───────┬───────┘    └───────────────┘    │ 003_tokens   │   │   │
//! │  │           ▼                                  └──────────────┘   │   │
//! │  │   ┌───────────────┐                                            │   │
//! │  │   │  UnitOfWork   │  tx + ChangeSet ──commit──► audit_logs     │   │
//! │  │   └───────────────┘                                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`unit_of_work`] - Transactions with change tracking and the audit hook
//! - [`migrations`] - Embedded database migrations
//! - [`repository`] - Repository implementations
//! - [`backup`] - `VACUUM INTO` backups and validated restores
//! - [`maintenance`] - Startup table-status reconciliation
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bistro_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/bistro.db")).await?;
//!
//! let mut uow = db.begin(Actor::user(&user.id, &user.display_name)).await?;
//! db.products().update(&mut uow, &product).await?;
//! uow.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backup;
pub mod error;
pub mod maintenance;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod unit_of_work;

// =============================================================================
// Re-exports
// =============================================================================

pub use backup::{validate_backup, BackupInfo};
pub use error::{DbError, DbResult};
pub use maintenance::{reconcile_table_status, TableRepair};
pub use pool::{Database, DbConfig};
pub use unit_of_work::UnitOfWork;

// Repository re-exports for convenience
pub use repository::{
    AuditFilter, AuditLogRepository, CategoryRepository, OrderRepository, ProductRepository,
    ReportRepository, SalesSummary, SettingRepository, TableRepository, TokenRepository,
    TopProduct, UserRepository, WaiterSales,
};

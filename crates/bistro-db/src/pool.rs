//! # Database Handle
//!
//! [`Database`] owns the SQLite pool and hands out one repository per
//! table. Reads go straight to the pool; every write goes through a
//! [`UnitOfWork`] so its audit rows commit with it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  DbConfig::new(path) ← Configure pool settings                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations             │
//! │       │                                                                 │
//! │       ├──► db.products().search(..)     reads straight from the pool    │
//! │       │                                                                 │
//! │       └──► db.begin(actor)              writes go through a unit of     │
//! │                 │                       work (one transaction)          │
//! │                 ▼                                                       │
//! │            repo.update(&mut uow, ..)                                    │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │            uow.commit()  ← audit rows written, then COMMIT              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use bistro_core::Actor;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::{
    AuditLogRepository, CategoryRepository, OrderRepository, ProductRepository, ReportRepository,
    SettingRepository, TableRepository, TokenRepository, UserRepository,
};
use crate::unit_of_work::UnitOfWork;

/// Path that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Where the database lives and how many terminals may hold a connection.
///
/// A till, the kitchen display and the maintenance commands share one file,
/// so the pool is small and writers wait on SQLite's busy handler instead
/// of failing straight away.
///
/// ```rust,ignore
/// let config = DbConfig::new(data_dir.join("bistro.db")).max_connections(3);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,

    /// Upper bound on open connections. Default 5.
    pub max_connections: u32,

    /// Connections opened up front. The in-memory database keeps exactly one.
    pub min_connections: u32,

    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,

    /// How long a statement waits on another connection's write lock.
    pub busy_timeout: Duration,

    /// Idle connections are closed after this long.
    pub idle_timeout: Duration,

    /// Apply pending migrations when the pool opens and after a restore.
    pub run_migrations: bool,
}

impl DbConfig {
    /// File-backed configuration; the file is created on first connect.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// A private database that lives as long as the pool.
    ///
    /// Single connection: every new connection would see an empty database,
    /// and a unit of work holds the connection until it commits.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    /// Clamped to at least one connection.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(IN_MEMORY)
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone: clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    config: DbConfig,
}

impl Database {
    /// Opens the pool and brings the schema up to date.
    ///
    /// Connections run in WAL mode with foreign keys enforced, so the
    /// kitchen display can read while a till writes.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let pool = connect(&config).await?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database { pool, config };

        if db.config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies pending migrations; already applied ones are skipped.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Raw pool, for reads no repository covers.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Starts a unit of work on behalf of `actor`.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let mut uow = db.begin(Actor::user(&user.id, &user.display_name)).await?;
    /// db.products().update(&mut uow, &product).await?;
    /// uow.commit().await?;
    /// ```
    pub async fn begin(&self, actor: Actor) -> DbResult<UnitOfWork> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        debug!(actor = %actor.name(), "Unit of work started");
        Ok(UnitOfWork::new(tx, actor))
    }

    pub fn categories(&self) -> CategoryRepository {
        CategoryRepository::new(self.pool.clone())
    }

    /// Returns the product repository.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let soups = db.products().search("soup", 20).await?;
    /// ```
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn tables(&self) -> TableRepository {
        TableRepository::new(self.pool.clone())
    }

    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone())
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    pub fn tokens(&self) -> TokenRepository {
        TokenRepository::new(self.pool.clone())
    }

    pub fn settings(&self) -> SettingRepository {
        SettingRepository::new(self.pool.clone())
    }

    pub fn audit_logs(&self) -> AuditLogRepository {
        AuditLogRepository::new(self.pool.clone())
    }

    pub fn reports(&self) -> ReportRepository {
        ReportRepository::new(self.pool.clone())
    }

    /// Closes every connection. Repositories handed out earlier fail from
    /// now on; only [`Database::restore`] reopens the handle.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// True while the pool can still run a statement.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Swaps in a freshly connected pool for the same configuration.
    pub(crate) async fn reconnect(&mut self) -> DbResult<()> {
        self.pool = connect(&self.config).await?;
        if self.config.run_migrations {
            self.run_migrations().await?;
        }
        Ok(())
    }
}

async fn connect(config: &DbConfig) -> DbResult<SqlitePool> {
    let url = format!("sqlite://{}?mode=rwc", config.database_path.display());
    let options = SqliteConnectOptions::from_str(&url)
        .map_err(|e| DbError::ConnectionFailed(format!("{}: {e}", config.database_path.display())))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout)
        .create_if_missing(true);

    debug!(
        max_connections = config.max_connections,
        busy_timeout_ms = config.busy_timeout.as_millis() as u64,
        "Opening SQLite pool"
    );

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .connect_with(options)
        .await
        .map_err(|e| DbError::ConnectionFailed(format!("{}: {e}", config.database_path.display())))
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # State Module
//!
//! Separate state types, one concern each, so every command declares
//! exactly what it touches:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌────────────┐   │
//! │  │   DbState    │  │ SessionState │  │ ConfigState  │  │  Mailer    │   │
//! │  │              │  │              │  │              │  │            │   │
//! │  │  RwLock<     │  │  RwLock<     │  │  printer     │  │  spool or  │   │
//! │  │   Database>  │  │   Option<    │  │  mail        │  │  log only  │   │
//! │  │              │  │   Session>>  │  │  refresh     │  │            │   │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └────────────┘   │
//! │                                                                         │
//! │  AppContext owns one of each for the lifetime of the process.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod session;

use std::sync::Arc;

use tracing::info;

use bistro_db::{reconcile_table_status, Database, DbConfig};

use crate::error::ApiResult;
use crate::mail::{mailer_for, Mailer};

pub use config::{
    default_config_path, ConfigState, MailConfig, PrinterConfig, DEFAULT_KITCHEN_REFRESH_SECS,
    PAPER_WIDTHS,
};
pub use db::DbState;
pub use session::{Session, SessionState};

/// Everything a running terminal holds.
pub struct AppContext {
    pub db: DbState,
    pub session: SessionState,
    pub config: ConfigState,
    pub mailer: Arc<dyn Mailer>,
}

impl AppContext {
    /// Opens the database, migrates it and repairs table states left
    /// inconsistent by a crash.
    pub async fn open(config: ConfigState) -> ApiResult<Self> {
        let db_path = config.resolve_database_path()?;
        info!(db_path = %db_path.display(), "Database path determined");

        let db = Database::new(
            DbConfig::new(&db_path).max_connections(config.max_connections),
        )
        .await?;
        info!("Database connected and migrations applied");

        let repairs = reconcile_table_status(&db).await?;
        if !repairs.is_empty() {
            info!(repaired = repairs.len(), "Table states repaired at startup");
        }

        Ok(Self::with_database(db, config))
    }

    pub fn with_database(db: Database, config: ConfigState) -> Self {
        let mailer = mailer_for(&config.mail);
        AppContext {
            db: DbState::new(db),
            session: SessionState::new(),
            config,
            mailer,
        }
    }
}

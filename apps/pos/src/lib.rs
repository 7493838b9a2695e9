//! # Bistro POS Library
//!
//! Everything the `bistro-pos` binary does, as a library so the commands can
//! be tested without a terminal.
//!
//! ## Module Organization
//! ```text
//! bistro_pos/
//! ├── lib.rs          ◄─── You are here (startup & dispatch)
//! ├── cli.rs          ◄─── clap trees for the process and the shell
//! ├── shell.rs        ◄─── Interactive prompt
//! ├── state/
//! │   ├── mod.rs      ◄─── AppContext
//! │   ├── db.rs       ◄─── Database handle (swappable on restore)
//! │   ├── session.rs  ◄─── Logged-in user
//! │   └── config.rs   ◄─── Configuration file + BISTRO_* overrides
//! ├── commands/       ◄─── One function per operation
//! ├── security.rs     ◄─── Password hashing, one-time codes
//! ├── mail.rs         ◄─── Outgoing mail spool
//! ├── printing/       ◄─── ESC/POS receipts
//! └── error.rs        ◄─── API error type for commands
//! ```

pub mod cli;
pub mod commands;
pub mod error;
pub mod mail;
pub mod printing;
pub mod security;
pub mod shell;
pub mod state;

use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, MaintenanceArgs};
use commands::users::NewUser;
use commands::{auth, backup, users};
use error::{ApiError, ApiResult};
use state::{AppContext, ConfigState};

pub const PASSWORD_ENV: &str = "BISTRO_PASSWORD";

/// Runs the parsed command line to completion.
///
/// ## Startup Sequence
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  1. Load configuration (file → BISTRO_* env → validate)                 │
/// │  2. Resolve the database path, connect, run migrations                  │
/// │  3. Repair table states left behind by a crash                          │
/// │  4. Dispatch: shell (default) · backup · restore · create-admin         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub async fn run(cli: Cli) -> ApiResult<()> {
    let config = ConfigState::load(cli.config.as_deref()).await?;
    let ctx = AppContext::open(config).await?;

    match cli.command.unwrap_or(Command::Shell) {
        Command::Shell => {
            info!("Starting interactive shell");
            shell::run(&ctx).await
        }
        Command::Backup(args) => {
            sign_in(&ctx, &args).await?;
            let written = backup::backup_database(&ctx.db, &ctx.session, &args.path).await?;
            println!("Backup written to {} ({} bytes)", written.path.display(), written.size_bytes);
            Ok(())
        }
        Command::Restore(args) => {
            sign_in(&ctx, &args).await?;
            let summary = backup::restore_database(&ctx.db, &ctx.session, &args.path).await?;
            println!("Restored from {}", summary.source.display());
            for table in summary.repaired_tables {
                println!("Table status repaired: {}", table);
            }
            Ok(())
        }
        Command::CreateAdmin {
            username,
            email,
            display_name,
            password,
        } => {
            let input = NewUser {
                username,
                email,
                display_name,
                password: password_or_env(password)?,
                role: bistro_core::UserRole::Admin,
            };
            let admin = users::create_admin(&ctx.db, input).await?;
            println!("Administrator {} created", admin.username);
            Ok(())
        }
    }
}

async fn sign_in(ctx: &AppContext, args: &MaintenanceArgs) -> ApiResult<()> {
    let password = password_or_env(args.password.clone())?;
    auth::login(&ctx.db, &ctx.session, &args.user, &password).await?;
    Ok(())
}

fn password_or_env(password: Option<String>) -> ApiResult<String> {
    password
        .or_else(|| std::env::var(PASSWORD_ENV).ok())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::validation(format!("Password required: pass --password or set {}", PASSWORD_ENV)))
}

/// Initializes the tracing subscriber for structured logging.
///
/// Logs go to stderr so they never mix with shell output.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=bistro_db=trace` - Trace one crate only
/// - Default: `info,bistro=debug,sqlx=warn`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bistro=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

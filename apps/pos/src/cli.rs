//! # Command Line
//!
//! Two clap trees live here:
//!
//! - [`Cli`] is what the process is started with (`bistro-pos backup ...`).
//! - [`ShellLine`] parses one line typed at the `bistro>` prompt.
//!
//! Both only describe arguments. Dispatch happens in `lib.rs` and
//! `shell.rs`.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use bistro_core::validation::parse_price;
use bistro_core::{AuditAction, KitchenStatus, PaymentMethod, UserRole};

#[derive(Parser, Debug)]
#[command(
    name = "bistro-pos",
    about = "Bistro point of sale terminal",
    version
)]
pub struct Cli {
    /// Configuration file (defaults to the platform config folder)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Starts the interactive shell when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive terminal
    Shell,

    /// Write a snapshot of the database to a new file
    Backup(MaintenanceArgs),

    /// Replace the database with a snapshot
    Restore(MaintenanceArgs),

    /// Create the first administrator account
    CreateAdmin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        display_name: String,
        /// Falls back to BISTRO_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct MaintenanceArgs {
    pub path: PathBuf,

    /// Administrator login (username or email)
    #[arg(long, short)]
    pub user: String,

    /// Falls back to BISTRO_PASSWORD
    #[arg(long)]
    pub password: Option<String>,
}

// ============================================================================
// Shell
// ============================================================================

/// One line typed at the prompt.
#[derive(Parser, Debug)]
#[command(name = "bistro", no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

#[derive(Subcommand, Debug)]
pub enum ShellCommand {
    /// Sign in with username or email
    Login { login: String, password: String },

    /// Sign out
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Change your own password
    Passwd { old: String, new: String },

    /// Confirm an email address with the mailed code
    Verify { login: String, code: String },

    /// Mail a password reset code
    ResetRequest { email: String },

    /// Set a new password with a reset code
    Reset {
        email: String,
        code: String,
        new_password: String,
    },

    /// Staff accounts
    #[command(subcommand)]
    Users(UsersCommand),

    /// Menu categories
    #[command(subcommand)]
    Categories(CategoriesCommand),

    /// Menu products
    #[command(subcommand)]
    Products(ProductsCommand),

    /// Floor plan
    #[command(subcommand)]
    Tables(TablesCommand),

    /// Order editor
    #[command(subcommand)]
    Order(OrderCommand),

    /// Kitchen display
    #[command(subcommand)]
    Kitchen(KitchenCommand),

    /// Restaurant settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Sales report over local business days
    Report {
        /// First day, YYYY-MM-DD (default today)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day, YYYY-MM-DD (default `from`)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Number of best sellers to list
        #[arg(long)]
        top: Option<u32>,
    },

    /// Browse the audit log, newest first
    Audit(AuditArgs),

    /// Print the bill of an order
    Receipt {
        order: String,
        /// Render only, do not send to the printer
        #[arg(long)]
        preview: bool,
    },

    /// Write a snapshot of the database
    Backup { path: PathBuf },

    /// Replace the database with a snapshot
    Restore { path: PathBuf },

    /// Leave the shell
    #[command(alias = "exit")]
    Quit,
}

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
    List,
    Add {
        username: String,
        email: String,
        password: String,
        #[arg(long, default_value = "waiter")]
        role: UserRole,
        /// Defaults to the username
        #[arg(long)]
        name: Option<String>,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        role: Option<UserRole>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Deactivate and hide an account
    Delete { id: String },
    /// Remove an account for good
    Purge { id: String },
    /// Mail a fresh verification code
    Resend { id: String },
}

#[derive(Subcommand, Debug)]
pub enum CategoriesCommand {
    List,
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 0)]
        position: i64,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        position: Option<i64>,
    },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ProductsCommand {
    List {
        #[arg(long)]
        category: Option<String>,
    },
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Show { id: String },
    Add {
        name: String,
        #[arg(value_parser = price_arg)]
        price: i64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_parser = price_arg)]
        price: Option<i64>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        available: Option<bool>,
    },
    /// Hide from the menu, keep history
    Delete { id: String },
    /// Remove for good
    Purge { id: String },
}

#[derive(Subcommand, Debug)]
pub enum TablesCommand {
    List,
    Add {
        name: String,
        #[arg(long, default_value_t = 4)]
        seats: i64,
    },
    Update {
        table: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        seats: Option<i64>,
    },
    Delete { table: String },
    /// Mark a paid or cancelled table free again
    Clear { table: String },
}

#[derive(Subcommand, Debug)]
pub enum OrderCommand {
    /// Open an order on a table
    Open {
        table: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Add a product to an order
    Add {
        order: String,
        product: String,
        #[arg(long, short, default_value_t = 1)]
        qty: i64,
        #[arg(long)]
        note: Option<String>,
    },
    /// Change the quantity of a line (0 removes it)
    Set {
        line: String,
        qty: i64,
        #[arg(long)]
        note: Option<String>,
    },
    Remove { line: String },
    Send { order: String },
    Pay { order: String, method: PaymentMethod },
    Cancel { order: String },
    Show { order: String },
    /// Open orders
    List,
}

#[derive(Subcommand, Debug)]
pub enum KitchenCommand {
    Queue,
    /// Redraw the queue until Ctrl-C
    Watch {
        /// Stop after this many refreshes
        #[arg(long)]
        cycles: Option<u32>,
    },
    OrderStatus { order: String, status: KitchenStatus },
    LineStatus { line: String, status: KitchenStatus },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    List,
    Get { key: String },
    Set { key: String, value: String },
    Delete { key: String },
}

#[derive(Args, Debug, Default)]
pub struct AuditArgs {
    #[arg(long)]
    pub entity: Option<String>,
    #[arg(long)]
    pub key: Option<String>,
    #[arg(long)]
    pub action: Option<AuditAction>,
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long)]
    pub from: Option<NaiveDate>,
    #[arg(long)]
    pub to: Option<NaiveDate>,
    #[arg(long)]
    pub limit: Option<u32>,
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
}

fn price_arg(input: &str) -> Result<i64, String> {
    parse_price(input).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(line: &[&str]) -> ShellCommand {
        ShellLine::try_parse_from(line).unwrap().command
    }

    #[test]
    fn test_trees_are_consistent() {
        Cli::command().debug_assert();
        ShellLine::command().debug_assert();
    }

    #[test]
    fn test_prices_are_parsed_to_cents() {
        match parse(&["products", "add", "Soup", "6.5"]) {
            ShellCommand::Products(ProductsCommand::Add { name, price, .. }) => {
                assert_eq!(name, "Soup");
                assert_eq!(price, 650);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(ShellLine::try_parse_from(["products", "add", "Soup", "6.555"]).is_err());
    }

    #[test]
    fn test_enum_arguments() {
        match parse(&["order", "pay", "260307-0001", "card"]) {
            ShellCommand::Order(OrderCommand::Pay { method, .. }) => {
                assert_eq!(method, PaymentMethod::Card)
            }
            other => panic!("unexpected {:?}", other),
        }
        match parse(&["audit", "--action", "soft_delete", "--from", "2026-03-01"]) {
            ShellCommand::Audit(args) => {
                assert_eq!(args.action, Some(AuditAction::SoftDelete));
                assert_eq!(args.from, NaiveDate::from_ymd_opt(2026, 3, 1));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(ShellLine::try_parse_from(["order", "pay", "1", "bitcoin"]).is_err());
    }

    #[test]
    fn test_exit_alias() {
        assert!(matches!(parse(&["exit"]), ShellCommand::Quit));
    }

    #[test]
    fn test_process_arguments() {
        let cli = Cli::try_parse_from(["bistro-pos", "backup", "/tmp/b.db", "-u", "boss"]).unwrap();
        match cli.command {
            Some(Command::Backup(args)) => {
                assert_eq!(args.user, "boss");
                assert!(args.password.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
        let cli = Cli::try_parse_from(["bistro-pos"]).unwrap();
        assert!(cli.command.is_none());
    }
}

//! # Configuration State
//!
//! Terminal-level configuration loaded at startup. Restaurant-wide values
//! (name, tax rate, receipt footer) live in the settings table instead, so
//! every terminal prints the same receipt.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`BISTRO_*`)
//! 2. Config file (`config.json`, or `--config PATH`)
//! 3. Defaults (this file)
//!
//! ## Thread Safety
//! Read-only after initialization, so no lock.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};

pub const CONFIG_FILE: &str = "config.json";
pub const DATABASE_FILE: &str = "bistro.db";

pub const PAPER_WIDTHS: &[usize] = &[32, 48];
pub const DEFAULT_KITCHEN_REFRESH_SECS: u64 = 5;
const MAX_KITCHEN_REFRESH_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigState {
    /// SQLite file. `None` uses the platform data directory.
    pub database_path: Option<PathBuf>,

    pub max_connections: u32,

    pub printer: PrinterConfig,

    pub mail: MailConfig,

    /// How often the kitchen display re-queries.
    pub kitchen_refresh_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrinterConfig {
    /// Device node or file receiving ESC/POS bytes (`/dev/usb/lp0`).
    /// `None` prints a text preview only.
    pub device: Option<PathBuf>,

    /// Characters per line: 32 for 58mm paper, 48 for 80mm.
    pub paper_width: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MailConfig {
    /// Directory the host's mail relay picks messages up from.
    /// `None` only logs messages.
    pub spool_dir: Option<PathBuf>,

    pub from_address: String,
}

impl Default for ConfigState {
    fn default() -> Self {
        ConfigState {
            database_path: None,
            max_connections: 5,
            printer: PrinterConfig::default(),
            mail: MailConfig::default(),
            kitchen_refresh_secs: DEFAULT_KITCHEN_REFRESH_SECS,
        }
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        PrinterConfig {
            device: None,
            paper_width: 48,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        MailConfig {
            spool_dir: None,
            from_address: "Bistro POS <noreply@bistro.local>".to_string(),
        }
    }
}

impl ConfigState {
    /// Loads `path` (or the default location), applies environment
    /// overrides and validates. A missing file yields the defaults.
    pub async fn load(path: Option<&Path>) -> ApiResult<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        let mut config = match &path {
            Some(p) if tokio::fs::try_exists(p).await.unwrap_or(false) => {
                let text = tokio::fs::read_to_string(p)
                    .await
                    .map_err(|e| ApiError::config(format!("{}: {}", p.display(), e)))?;
                let config: ConfigState = serde_json::from_str(&text)
                    .map_err(|e| ApiError::config(format!("{}: {}", p.display(), e)))?;
                info!(path = %p.display(), "Configuration loaded");
                config
            }
            _ => {
                debug!("No configuration file, using defaults");
                ConfigState::default()
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies `BISTRO_*` overrides read through `lookup`.
    ///
    /// A number that does not parse keeps the file value; the variable is
    /// logged and returned.
    pub fn apply_env<F>(&mut self, lookup: F) -> Vec<&'static str>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut rejected = Vec::new();

        if let Some(path) = lookup("BISTRO_DB_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(max) = parsed(&lookup, "BISTRO_MAX_CONNECTIONS", &mut rejected) {
            self.max_connections = max;
        }
        if let Some(device) = lookup("BISTRO_PRINTER_DEVICE") {
            self.printer.device = Some(PathBuf::from(device));
        }
        if let Some(width) = parsed(&lookup, "BISTRO_PAPER_WIDTH", &mut rejected) {
            self.printer.paper_width = width;
        }
        if let Some(dir) = lookup("BISTRO_MAIL_SPOOL") {
            self.mail.spool_dir = Some(PathBuf::from(dir));
        }
        if let Some(from) = lookup("BISTRO_MAIL_FROM") {
            self.mail.from_address = from;
        }
        if let Some(secs) = parsed(&lookup, "BISTRO_KITCHEN_REFRESH_SECS", &mut rejected) {
            self.kitchen_refresh_secs = secs;
        }
        rejected
    }

    pub fn validate(&self) -> ApiResult<()> {
        if self.max_connections == 0 {
            return Err(ApiError::config("maxConnections must be at least 1"));
        }
        if !PAPER_WIDTHS.contains(&self.printer.paper_width) {
            return Err(ApiError::config(format!(
                "printer.paperWidth must be one of {:?}",
                PAPER_WIDTHS
            )));
        }
        if !(1..=MAX_KITCHEN_REFRESH_SECS).contains(&self.kitchen_refresh_secs) {
            return Err(ApiError::config(format!(
                "kitchenRefreshSecs must be between 1 and {}",
                MAX_KITCHEN_REFRESH_SECS
            )));
        }
        if !self.mail.from_address.contains('@') {
            return Err(ApiError::config("mail.fromAddress must be an email address"));
        }
        Ok(())
    }

    pub async fn save(&self, path: &Path) -> ApiResult<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| ApiError::internal(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::config(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(path, text)
            .await
            .map_err(|e| ApiError::config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// The configured database file, or `bistro.db` in the platform data
    /// directory.
    ///
    /// - **Linux**: `~/.local/share/bistro-pos/bistro.db`
    /// - **macOS**: `~/Library/Application Support/com.bistro.pos/bistro.db`
    /// - **Windows**: `%APPDATA%\bistro\pos\data\bistro.db`
    pub fn resolve_database_path(&self) -> ApiResult<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let dirs = project_dirs()
            .ok_or_else(|| ApiError::config("Could not determine app data directory"))?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| ApiError::config(format!("{}: {}", data_dir.display(), e)))?;
        Ok(data_dir.join(DATABASE_FILE))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "bistro", "pos")
}

/// `config.json` in the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

fn parsed<T, F>(lookup: &F, variable: &'static str, rejected: &mut Vec<&'static str>) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(variable)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable, value = %raw, "Ignoring unparseable override");
            rejected.push(variable);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BISTRO_DB_PATH", "/srv/bistro/bistro.db"),
            ("BISTRO_PAPER_WIDTH", "32"),
            ("BISTRO_KITCHEN_REFRESH_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = ConfigState::default();
        let rejected = config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database_path, Some(PathBuf::from("/srv/bistro/bistro.db")));
        assert_eq!(config.printer.paper_width, 32);
        assert_eq!(config.kitchen_refresh_secs, DEFAULT_KITCHEN_REFRESH_SECS);
        assert_eq!(rejected, vec!["BISTRO_KITCHEN_REFRESH_SECS"]);
    }

    #[test]
    fn test_unparseable_overrides_are_reported() {
        let env: HashMap<&str, &str> = [
            ("BISTRO_MAX_CONNECTIONS", "ten"),
            ("BISTRO_PAPER_WIDTH", "-48"),
            ("BISTRO_KITCHEN_REFRESH_SECS", " 15 "),
        ]
        .into_iter()
        .collect();

        let mut config = ConfigState::default();
        let defaults = config.clone();
        let rejected = config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(rejected, vec!["BISTRO_MAX_CONNECTIONS", "BISTRO_PAPER_WIDTH"]);
        assert_eq!(config.max_connections, defaults.max_connections);
        assert_eq!(config.printer.paper_width, defaults.printer.paper_width);
        assert_eq!(config.kitchen_refresh_secs, 15);
    }

    #[test]
    fn test_validate() {
        assert!(ConfigState::default().validate().is_ok());

        let mut config = ConfigState::default();
        config.printer.paper_width = 40;
        assert!(config.validate().is_err());

        let mut config = ConfigState::default();
        config.kitchen_refresh_secs = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = ConfigState::default();
        config.printer.paper_width = 32;
        config.mail.spool_dir = Some(dir.path().join("spool"));
        config.save(&path).await.unwrap();

        let loaded = ConfigState::load(Some(&path)).await.unwrap();
        assert_eq!(loaded.printer.paper_width, 32);
        assert_eq!(loaded.mail.spool_dir, Some(dir.path().join("spool")));
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(&path, r#"{ "kitchenRefreshSecs": 10 }"#)
            .await
            .unwrap();

        let loaded = ConfigState::load(Some(&path)).await.unwrap();
        assert_eq!(loaded.kitchen_refresh_secs, 10);
        assert_eq!(loaded.max_connections, 5);
    }

    #[tokio::test]
    async fn test_broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert!(ConfigState::load(Some(&path)).await.is_err());
    }
}

use crate::core::firewall::{QueryPolicy, Strictness};
use crate::utils::get_config_dir;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// How rule files are checked when loaded
    #[serde(default)]
    pub strictness: Strictness,
    /// What decisions do with out-of-domain queries
    #[serde(default)]
    pub query_policy: QueryPolicy,
    /// Rule file used when a command is not given `--rules`
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
    /// Record loads and decisions in the audit log (opt-in for privacy/disk space)
    #[serde(default)]
    pub audit_log: bool,
}

impl AppConfig {
    /// Rule file to use: an explicit path wins over the configured default.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if neither is set.
    pub fn resolve_rules_path(&self, explicit: Option<&Path>) -> crate::Result<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.rules_path.clone())
            .ok_or_else(|| {
                crate::Error::Config(
                    "No rules file given: pass --rules or set rules_path in config.json".into(),
                )
            })
    }
}

/// Path of the configuration file, if the platform has a config directory
pub fn config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Saves the config to `path` using an atomic write pattern.
/// 1. Writes to a temporary file in the same directory.
/// 2. Sets restrictive permissions (0o600).
/// 3. Atomically renames to the target path.
///
/// # Async
/// The write, fsync and rename run on a blocking thread via `tokio::task::spawn_blocking`.
pub async fn save_config_to(path: &Path, config: &AppConfig) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // Set permissions BEFORE any data is written
            temp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?; // Ensure data is flushed to physical media

        // Atomic rename
        temp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Saves the config to the default location.
pub async fn save_config(config: &AppConfig) -> std::io::Result<()> {
    match config_path() {
        Some(path) => save_config_to(&path, config).await,
        None => Ok(()),
    }
}

/// Loads the config from `path`, or returns default if missing or invalid.
///
/// # Async
/// Uses `tokio::fs` for non-blocking I/O.
pub async fn load_config_from(path: &Path) -> AppConfig {
    let Ok(json) = tokio::fs::read_to_string(path).await else {
        return AppConfig::default();
    };

    match serde_json::from_str::<AppConfig>(&json) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                "Ignoring invalid config {}: {}; using defaults",
                path.display(),
                e
            );
            AppConfig::default()
        }
    }
}

/// Loads the config from the default location, or returns default if not found.
pub async fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path).await,
        None => AppConfig::default(),
    }
}

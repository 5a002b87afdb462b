//! Utility functions for directory management
//!
//! This module provides helper functions following the XDG Base Directory specification
//! for portable configuration and state storage across Linux distributions.
//!
//! # Directory Structure
//!
//! - Config: `~/.config/hbfw/` - `config.json`
//! - State: `~/.local/state/hbfw/` - Audit log
//!
//! # Example
//!
//! ```no_run
//! use hbfw::utils::{get_config_dir, ensure_dirs};
//!
//! // Ensure directories exist before use
//! ensure_dirs().expect("Failed to create directories");
//!
//! if let Some(config_path) = get_config_dir() {
//!     // Load configuration from config_path
//! }
//! ```

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "hbfw", "hbfw")
}

pub fn get_config_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.config_dir().to_path_buf())
}

/// Falls back to the data directory on platforms without a state directory
pub fn get_state_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| {
        pd.state_dir()
            .unwrap_or_else(|| pd.data_local_dir())
            .to_path_buf()
    })
}

pub fn ensure_dirs() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        let mut builder = DirBuilder::new();
        builder.mode(0o700); // User read/write/execute only
        builder.recursive(true);

        if let Some(dir) = get_config_dir() {
            builder.create(dir)?;
        }
        if let Some(dir) = get_state_dir() {
            builder.create(dir)?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(dir) = get_config_dir() {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(dir) = get_state_dir() {
            std::fs::create_dir_all(dir)?;
        }
    }

    Ok(())
}

//! Environment constants and path utilities for the orchestrator.
//!
//! Centralizes the file and directory names used by configuration discovery.

use std::path::{Path, PathBuf};

/// Hidden directory holding orchestrator configuration
pub const ORCHESTRATOR_DIR_NAME: &str = ".orchestrator";

/// Configuration file name inside [`ORCHESTRATOR_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up directly in the working directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "orchestrator.toml";

/// Environment variable used to locate the user's home directory
pub const HOME_ENV_VAR: &str = "HOME";

/// Default log filter when neither the config nor `RUST_LOG` sets one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Build the `./orchestrator.toml` path for a directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}

/// Build the `./.orchestrator/config.toml` path for a directory
pub fn project_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(ORCHESTRATOR_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(ORCHESTRATOR_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

//! Unified path management for repaso configuration and data files.
//!
//! This ensures consistency across all platforms (Linux, macOS, Windows).

use std::path::PathBuf;

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Unified path management for repaso.
///
/// # Directory Structure
///
/// ```text
/// ~/.config/repaso/            # Config directory
/// └── config.toml              # Application configuration
///
/// ~/.local/share/repaso/       # Data directory (primary store)
/// ├── app-state.json           # Whole-state aggregate
/// ├── settings.json            # Settings record
/// └── audio/                   # Audio payload files + sidecar index
/// ```
pub struct RepasoPaths;

impl RepasoPaths {
    /// Returns the repaso configuration directory.
    ///
    /// # Returns
    ///
    /// - `Ok(PathBuf)`: Path to config directory (e.g., `~/.config/repaso/`)
    /// - `Err(PathError::HomeDirNotFound)`: Could not determine directory
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join("repaso"))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the repaso data directory, home of the primary local store.
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join("repaso"))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the path to the main configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}

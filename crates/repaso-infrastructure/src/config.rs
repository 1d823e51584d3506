//! Application configuration loaded from `config.toml`.

use crate::paths::RepasoPaths;
use repaso_core::error::{RepasoError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application-level configuration.
///
/// Read once at startup from `config.toml` in the platform config
/// directory. A missing file yields the defaults: no remote store, no
/// mirror directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the remote store, e.g. `https://repaso.example.com/api`.
    /// `None` disables the remote backend entirely.
    pub remote_base_url: Option<String>,
    /// User-granted directory for the mirrored file-tree store. `None`
    /// disables mirroring.
    pub mirror_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Loads the configuration from the default platform location.
    pub fn load() -> Result<Self> {
        let path = RepasoPaths::config_file()
            .map_err(|e| RepasoError::config(format!("Failed to resolve config path: {}", e)))?;
        Self::load_from(&path)
    }

    /// Loads the configuration from an explicit path. Missing file yields
    /// defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Persists the configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::load_from(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let config = AppConfig {
            remote_base_url: Some("https://repaso.example.com/api".to_string()),
            mirror_dir: Some(temp_dir.path().join("mirror")),
        };
        config.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "remote_base_url = \"http://localhost:8787\"\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(
            config.remote_base_url.as_deref(),
            Some("http://localhost:8787")
        );
        assert!(config.mirror_dir.is_none());
    }
}

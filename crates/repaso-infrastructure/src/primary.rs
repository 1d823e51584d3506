//! Primary local store.
//!
//! The canonical source of truth during normal operation. One JSON document
//! per logical key (`app-state.json`, `settings.json`) written through the
//! atomic file primitive, audio payloads as individual files next to a JSON
//! sidecar index, and the per-entity records of the legacy generations kept
//! readable for migration.
//!
//! Directory structure:
//! ```text
//! base_dir/
//! ├── app-state.json
//! ├── settings.json
//! ├── themes.json          (legacy, read-only)
//! ├── subtopics.json       (legacy, read-only)
//! ├── audio-index.json     (legacy, read-only)
//! └── audio/
//!     ├── index.json
//!     └── {eraId}-{subtopicId}-{propIndex}-{audioIndex}.bin
//! ```

use crate::paths::RepasoPaths;
use crate::storage::AtomicJsonFile;
use async_trait::async_trait;
use repaso_core::error::{RepasoError, Result};
use repaso_core::settings::Settings;
use repaso_core::state::AppState;
use repaso_core::store::{AudioAsset, StateStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// One row of the audio sidecar index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioIndexEntry {
    era_id: String,
    subtopic_id: String,
    proposition_index: usize,
    audio_index: usize,
    mime_type: String,
    recorded_at: String,
    file_name: String,
}

pub struct PrimaryStore {
    base_dir: PathBuf,
    audio_dir: PathBuf,
    state_file: Arc<AtomicJsonFile<AppState>>,
    settings_file: Arc<AtomicJsonFile<Settings>>,
    audio_index: Arc<AtomicJsonFile<Vec<AudioIndexEntry>>>,
}

impl PrimaryStore {
    /// Creates a PrimaryStore at the default platform data directory.
    pub async fn default_location() -> Result<Self> {
        let base_dir = RepasoPaths::data_dir()
            .map_err(|e| RepasoError::config(format!("Failed to get data directory: {}", e)))?;
        Self::new(base_dir).await
    }

    /// Creates a new PrimaryStore rooted at `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory structure cannot be created.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let audio_dir = base_dir.join("audio");
        fs::create_dir_all(&audio_dir).await?;

        Ok(Self {
            state_file: Arc::new(AtomicJsonFile::new(base_dir.join("app-state.json"))),
            settings_file: Arc::new(AtomicJsonFile::new(base_dir.join("settings.json"))),
            audio_index: Arc::new(AtomicJsonFile::new(audio_dir.join("index.json"))),
            base_dir,
            audio_dir,
        })
    }

    /// Runs a blocking atomic-file operation off the async executor.
    async fn run_blocking<T, F>(f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| RepasoError::internal(format!("Failed to join task: {}", e)))?
    }

    fn payload_path(&self, entry: &AudioIndexEntry) -> PathBuf {
        self.audio_dir.join(&entry.file_name)
    }
}

#[async_trait]
impl StateStore for PrimaryStore {
    fn name(&self) -> &'static str {
        "primary"
    }

    async fn load_state(&self) -> Result<Option<AppState>> {
        let file = self.state_file.clone();
        Self::run_blocking(move || file.load()).await
    }

    async fn save_state(&self, state: &AppState) -> Result<()> {
        let file = self.state_file.clone();
        let state = state.clone();
        Self::run_blocking(move || file.save(&state)).await
    }

    async fn load_settings(&self) -> Result<Option<Settings>> {
        let file = self.settings_file.clone();
        Self::run_blocking(move || file.load()).await
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let file = self.settings_file.clone();
        let settings = settings.clone();
        Self::run_blocking(move || file.save(&settings)).await
    }

    async fn load_audio(&self, subtopic_id: Option<&str>) -> Result<Vec<AudioAsset>> {
        let index = {
            let file = self.audio_index.clone();
            Self::run_blocking(move || file.load()).await?.unwrap_or_default()
        };

        let mut assets = Vec::new();
        for entry in index {
            if let Some(wanted) = subtopic_id {
                if entry.subtopic_id != wanted {
                    continue;
                }
            }
            match fs::read(self.payload_path(&entry)).await {
                Ok(data) => assets.push(AudioAsset {
                    era_id: entry.era_id,
                    subtopic_id: entry.subtopic_id,
                    proposition_index: entry.proposition_index,
                    audio_index: entry.audio_index,
                    mime_type: entry.mime_type,
                    recorded_at: entry.recorded_at,
                    data,
                }),
                Err(e) => {
                    // An indexed payload that went missing is logged and
                    // skipped; the remaining takes still load.
                    tracing::warn!(file = %entry.file_name, "audio payload unreadable: {}", e);
                }
            }
        }
        assets.sort_by(|a, b| {
            (&a.subtopic_id, a.proposition_index, a.audio_index)
                .cmp(&(&b.subtopic_id, b.proposition_index, b.audio_index))
        });
        Ok(assets)
    }

    async fn save_audio(&self, asset: &AudioAsset) -> Result<()> {
        let file_name = format!("{}.bin", asset.composite_key());
        fs::write(self.audio_dir.join(&file_name), &asset.data).await?;

        let entry = AudioIndexEntry {
            era_id: asset.era_id.clone(),
            subtopic_id: asset.subtopic_id.clone(),
            proposition_index: asset.proposition_index,
            audio_index: asset.audio_index,
            mime_type: asset.mime_type.clone(),
            recorded_at: asset.recorded_at.clone(),
            file_name,
        };
        let index = self.audio_index.clone();
        Self::run_blocking(move || {
            index.update(Vec::new(), |entries| {
                // Re-saving the same composite key replaces the row.
                entries.retain(|e| e.file_name != entry.file_name);
                entries.push(entry);
                Ok(())
            })
        })
        .await
    }

    async fn clear_all(&self) -> Result<()> {
        let state_file = self.state_file.clone();
        let settings_file = self.settings_file.clone();
        Self::run_blocking(move || {
            state_file.remove()?;
            settings_file.remove()
        })
        .await?;

        if fs::try_exists(&self.audio_dir).await? {
            fs::remove_dir_all(&self.audio_dir).await?;
        }
        fs::create_dir_all(&self.audio_dir).await?;

        // Legacy records go too: clearing means clearing every generation.
        for key in ["themes", "subtopics", "audio-index"] {
            let path = self.base_dir.join(format!("{}.json", key));
            if fs::try_exists(&path).await? {
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    async fn load_raw(&self, key: &str) -> Result<Option<Value>> {
        let path = self.base_dir.join(format!("{}.json", key));
        match fs::read_to_string(&path).await {
            Ok(content) => {
                if content.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(serde_json::from_str(&content)?))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn asset(subtopic: &str, prop: usize, idx: usize) -> AudioAsset {
        AudioAsset {
            era_id: "era-1".to_string(),
            subtopic_id: subtopic.to_string(),
            proposition_index: prop,
            audio_index: idx,
            mime_type: "audio/webm".to_string(),
            recorded_at: "2024-01-01T00:00:00Z".to_string(),
            data: vec![1, 2, 3, prop as u8, idx as u8],
        }
    }

    #[tokio::test]
    async fn test_state_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = PrimaryStore::new(temp_dir.path()).await.unwrap();

        assert!(store.load_state().await.unwrap().is_none());

        let state = AppState::bootstrap();
        store.save_state(&state).await.unwrap();
        assert_eq!(store.load_state().await.unwrap().unwrap(), state);
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = PrimaryStore::new(temp_dir.path()).await.unwrap();

        let settings = Settings {
            model_id: Some("gemini-2.5-flash".to_string()),
            prompt_template: None,
            mirror_enabled: true,
        };
        store.save_settings(&settings).await.unwrap();
        assert_eq!(store.load_settings().await.unwrap().unwrap(), settings);
    }

    #[tokio::test]
    async fn test_audio_roundtrip_and_filter() {
        let temp_dir = TempDir::new().unwrap();
        let store = PrimaryStore::new(temp_dir.path()).await.unwrap();

        store.save_audio(&asset("sub-1", 0, 0)).await.unwrap();
        store.save_audio(&asset("sub-1", 0, 1)).await.unwrap();
        store.save_audio(&asset("sub-2", 1, 0)).await.unwrap();

        let all = store.load_audio(None).await.unwrap();
        assert_eq!(all.len(), 3);

        let filtered = store.load_audio(Some("sub-1")).await.unwrap();
        assert_eq!(filtered.len(), 2);
        // Ordered: "latest" is last per proposition
        assert_eq!(filtered[0].audio_index, 0);
        assert_eq!(filtered[1].audio_index, 1);
        assert_eq!(filtered[1].data, vec![1, 2, 3, 0, 1]);
    }

    #[tokio::test]
    async fn test_save_audio_is_idempotent_per_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = PrimaryStore::new(temp_dir.path()).await.unwrap();

        store.save_audio(&asset("sub-1", 0, 0)).await.unwrap();
        let mut replacement = asset("sub-1", 0, 0);
        replacement.data = vec![9, 9];
        store.save_audio(&replacement).await.unwrap();

        let assets = store.load_audio(Some("sub-1")).await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].data, vec![9, 9]);
    }

    #[tokio::test]
    async fn test_load_raw_reads_legacy_records() {
        let temp_dir = TempDir::new().unwrap();
        let store = PrimaryStore::new(temp_dir.path()).await.unwrap();

        assert!(store.load_raw("themes").await.unwrap().is_none());

        let legacy = json!([{"name": "Geometría", "subtopics": []}]);
        std::fs::write(
            temp_dir.path().join("themes.json"),
            serde_json::to_string(&legacy).unwrap(),
        )
        .unwrap();
        assert_eq!(store.load_raw("themes").await.unwrap().unwrap(), legacy);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let temp_dir = TempDir::new().unwrap();
        let store = PrimaryStore::new(temp_dir.path()).await.unwrap();

        store.save_state(&AppState::bootstrap()).await.unwrap();
        store.save_audio(&asset("sub-1", 0, 0)).await.unwrap();
        std::fs::write(temp_dir.path().join("themes.json"), "[]").unwrap();

        store.clear_all().await.unwrap();

        assert!(store.load_state().await.unwrap().is_none());
        assert!(store.load_audio(None).await.unwrap().is_empty());
        assert!(store.load_raw("themes").await.unwrap().is_none());
    }
}

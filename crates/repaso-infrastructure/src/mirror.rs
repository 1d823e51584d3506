//! Mirrored file-tree store.
//!
//! An optional, user-granted directory kept in sync with the primary store
//! on a best-effort basis. Layout:
//!
//! ```text
//! mirror_root/
//! ├── app-state.json       (current schema)
//! ├── themes.json          (flattened legacy-compatible projection)
//! └── audio-{eraId}-{subtopicId}-{propIndex}-{audioIndex}.<ext>
//! ```
//!
//! Reads fall back to the legacy audio filename lacking `{eraId}` for
//! assets written before era scoping existed, and further to the
//! `themes.json`/`subtopics.json` legacy snapshots when no whole-state
//! snapshot exists. Every write is independent: a failure on one file never
//! aborts writes of the others.

use crate::migration::{LegacyProposition, LegacySubtopic, LegacyTheme};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use repaso_core::error::{RepasoError, Result};
use repaso_core::settings::Settings;
use repaso_core::state::AppState;
use repaso_core::store::{AudioAsset, StateStore};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    /// Creates a new MirrorStore rooted at the user-granted directory.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Flattens the live era into the legacy-compatible theme list that
    /// pre-era tools still read.
    fn flatten(state: &AppState) -> Vec<LegacyTheme> {
        state
            .current_era
            .themes
            .iter()
            .map(|theme| LegacyTheme {
                id: Value::String(theme.id.clone()),
                name: theme.name.clone(),
                subtopics: theme
                    .subtopics
                    .iter()
                    .map(|subtopic| LegacySubtopic {
                        id: Value::String(subtopic.id.clone()),
                        text: subtopic.text.clone(),
                        propositions: subtopic.propositions.as_ref().map(|propositions| {
                            propositions
                                .iter()
                                .map(|proposition| LegacyProposition {
                                    id: Value::String(proposition.id.clone()),
                                    kind: serde_json::to_value(proposition.kind)
                                        .ok()
                                        .and_then(|v| v.as_str().map(str::to_string)),
                                    label: Some(proposition.label.clone()),
                                    text: proposition.text.clone(),
                                })
                                .collect()
                        }),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Preferred file extension for a mime type.
    fn extension_for(mime_type: &str) -> &str {
        mime_guess::get_mime_extensions_str(mime_type)
            .and_then(|extensions| extensions.first())
            .copied()
            .unwrap_or("bin")
    }

    /// Parses an audio file stem against a known subtopic id.
    ///
    /// Returns `(era_id, proposition_index, audio_index)`; `era_id` is empty
    /// for files written under the legacy scheme without era scoping.
    fn parse_stem(stem: &str, subtopic_id: &str) -> Option<(String, usize, usize)> {
        let rest = stem.strip_prefix("audio-")?;
        let legacy_prefix = format!("{}-", subtopic_id);
        let scoped_marker = format!("-{}-", subtopic_id);

        let (era_id, tail) = if let Some(position) = rest.find(&scoped_marker) {
            (
                rest[..position].to_string(),
                &rest[position + scoped_marker.len()..],
            )
        } else if let Some(tail) = rest.strip_prefix(&legacy_prefix) {
            (String::new(), tail)
        } else {
            return None;
        };

        let mut parts = tail.split('-');
        let proposition_index = parts.next()?.parse().ok()?;
        let audio_index = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some((era_id, proposition_index, audio_index))
    }

    /// All subtopic ids known to this mirror's own state snapshot, longest
    /// first so a short id never matches inside a longer one.
    async fn known_subtopic_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        if let Ok(Some(state)) = self.load_state().await {
            for era in std::iter::once(&state.current_era).chain(state.era_history.iter()) {
                for theme in &era.themes {
                    for subtopic in &theme.subtopics {
                        ids.push(subtopic.id.clone());
                    }
                }
            }
        }
        ids.sort_by_key(|id| std::cmp::Reverse(id.len()));
        ids.dedup();
        ids
    }

    async fn read_asset(&self, path: &Path, stem_match: (String, String, usize, usize)) -> Result<AudioAsset> {
        let (era_id, subtopic_id, proposition_index, audio_index) = stem_match;
        let data = fs::read(path).await?;
        let metadata = fs::metadata(path).await?;
        let recorded_at = metadata
            .modified()
            .map(|modified| DateTime::<Utc>::from(modified).to_rfc3339())
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(AudioAsset {
            era_id,
            subtopic_id,
            proposition_index,
            audio_index,
            mime_type,
            recorded_at,
            data,
        })
    }

    /// Lists `(stem, path)` pairs of every audio file in the mirror.
    async fn audio_files(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with("audio-") {
                files.push((stem.to_string(), path));
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl StateStore for MirrorStore {
    fn name(&self) -> &'static str {
        "mirror"
    }

    async fn load_state(&self) -> Result<Option<AppState>> {
        let path = self.file("app-state.json");
        match fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_state(&self, state: &AppState) -> Result<()> {
        // The whole-state snapshot and the flattened projection are
        // independent writes; the projection failing never aborts the
        // snapshot result.
        let snapshot = serde_json::to_string_pretty(state)?;
        let snapshot_result = fs::write(self.file("app-state.json"), snapshot)
            .await
            .map_err(RepasoError::from);

        match serde_json::to_string_pretty(&Self::flatten(state)) {
            Ok(projection) => {
                if let Err(e) = fs::write(self.file("themes.json"), projection).await {
                    tracing::warn!("mirror projection write failed: {}", e);
                }
            }
            Err(e) => tracing::warn!("mirror projection serialization failed: {}", e),
        }

        snapshot_result
    }

    async fn load_settings(&self) -> Result<Option<Settings>> {
        // Settings are not part of the mirror layout.
        Ok(None)
    }

    async fn save_settings(&self, _settings: &Settings) -> Result<()> {
        tracing::debug!("mirror does not persist settings");
        Ok(())
    }

    async fn load_audio(&self, subtopic_id: Option<&str>) -> Result<Vec<AudioAsset>> {
        let files = self.audio_files().await?;

        let subtopic_ids = match subtopic_id {
            Some(id) => vec![id.to_string()],
            None => self.known_subtopic_ids().await,
        };

        let mut matches: Vec<(String, String, usize, usize, PathBuf)> = Vec::new();
        for (stem, path) in files {
            let parsed = subtopic_ids.iter().find_map(|id| {
                Self::parse_stem(&stem, id)
                    .map(|(era, prop, idx)| (era, id.clone(), prop, idx, path.clone()))
            });
            match parsed {
                Some(entry) => matches.push(entry),
                None => tracing::debug!(stem = %stem, "audio file does not match any known subtopic"),
            }
        }

        // Era-scoped files shadow their legacy-named counterparts for the
        // same composite position.
        matches.sort_by(|a, b| {
            (&a.1, a.2, a.3, a.0.is_empty())
                .cmp(&(&b.1, b.2, b.3, b.0.is_empty()))
        });
        matches.dedup_by_key(|entry| (entry.1.clone(), entry.2, entry.3));

        let mut assets = Vec::new();
        for (era_id, subtopic, proposition_index, audio_index, path) in matches {
            match self
                .read_asset(&path, (era_id, subtopic, proposition_index, audio_index))
                .await
            {
                Ok(asset) => assets.push(asset),
                Err(e) => tracing::warn!(path = %path.display(), "mirror audio unreadable: {}", e),
            }
        }
        Ok(assets)
    }

    async fn save_audio(&self, asset: &AudioAsset) -> Result<()> {
        let file_name = format!(
            "audio-{}.{}",
            asset.composite_key(),
            Self::extension_for(&asset.mime_type)
        );
        fs::write(self.file(&file_name), &asset.data).await?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        for name in ["app-state.json", "themes.json", "subtopics.json"] {
            let path = self.file(name);
            if fs::try_exists(&path).await? {
                fs::remove_file(&path).await?;
            }
        }
        for (_, path) in self.audio_files().await? {
            if let Err(e) = fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), "failed to remove mirror audio: {}", e);
            }
        }
        Ok(())
    }

    async fn load_raw(&self, key: &str) -> Result<Option<Value>> {
        let path = self.file(&format!("{}.json", key));
        match fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

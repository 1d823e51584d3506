//! Backend store contract.
//!
//! Defines the uniform read/write interface that every persistence backend
//! (primary local store, mirrored file tree, remote store) implements. The
//! synchronization service only ever talks to this trait, and stores only
//! ever receive serialized snapshots, never live references into the tree.

use crate::era::AudioClip;
use crate::settings::Settings;
use crate::state::AppState;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::Result;
use async_trait::async_trait;

/// A recorded audio take with its binary payload, as exchanged with the
/// backend stores.
///
/// The composite key is `(era_id, subtopic_id, proposition_index,
/// audio_index)`. Takes are append-only per proposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioAsset {
    pub era_id: String,
    pub subtopic_id: String,
    pub proposition_index: usize,
    pub audio_index: usize,
    pub mime_type: String,
    /// Timestamp when the take was recorded (ISO 8601 format)
    pub recorded_at: String,
    /// Binary payload; serialized as base64 in JSON documents.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl AudioAsset {
    /// The era-scoped composite key used for file names and remote row ids.
    pub fn composite_key(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.era_id, self.subtopic_id, self.proposition_index, self.audio_index
        )
    }

    /// The pre-era-scoping composite key, still used to locate assets
    /// written before eras existed.
    pub fn legacy_key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.subtopic_id, self.proposition_index, self.audio_index
        )
    }

    /// The descriptive part of the take, as kept in the entity tree.
    pub fn clip(&self) -> AudioClip {
        AudioClip {
            mime_type: self.mime_type.clone(),
            recorded_at: self.recorded_at.clone(),
        }
    }
}

/// Base64 (de)serialization for binary payloads inside JSON documents.
mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// An abstract persistence backend for the whole-state aggregate, settings,
/// and audio payloads.
///
/// This trait defines the contract shared by the primary local store, the
/// mirrored file-tree store, and the remote store, decoupling the
/// synchronization logic from any specific storage mechanism.
///
/// # Implementation Notes
///
/// Implementations should handle:
/// - Missing data as `Ok(None)` / empty lists, never as errors
/// - Every operation independently failable; no cross-call transactions
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Short backend name, used in load/save logs.
    fn name(&self) -> &'static str;

    /// Loads the whole-state aggregate.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(AppState))`: backend holds current-schema data
    /// - `Ok(None)`: backend has no current-schema data
    /// - `Err(_)`: backend failed; the caller treats this as "no data"
    async fn load_state(&self) -> Result<Option<AppState>>;

    /// Persists the whole-state aggregate atomically.
    async fn save_state(&self, state: &AppState) -> Result<()>;

    /// Loads the persisted settings record.
    async fn load_settings(&self) -> Result<Option<Settings>>;

    /// Persists the settings record.
    async fn save_settings(&self, settings: &Settings) -> Result<()>;

    /// Loads audio assets, optionally restricted to one subtopic.
    async fn load_audio(&self, subtopic_id: Option<&str>) -> Result<Vec<AudioAsset>>;

    /// Persists one audio asset under its composite key.
    async fn save_audio(&self, asset: &AudioAsset) -> Result<()>;

    /// Removes everything this backend holds.
    async fn clear_all(&self) -> Result<()>;

    /// Raw read of a legacy per-entity record (`themes`, `subtopics`,
    /// `audio-index`), kept only for migration. Backends that never held
    /// legacy generations return `Ok(None)`.
    async fn load_raw(&self, key: &str) -> Result<Option<Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset() -> AudioAsset {
        AudioAsset {
            era_id: "era-1".to_string(),
            subtopic_id: "sub-1".to_string(),
            proposition_index: 2,
            audio_index: 0,
            mime_type: "audio/webm".to_string(),
            recorded_at: "2024-01-01T00:00:00Z".to_string(),
            data: vec![0x1f, 0x8b, 0x00, 0xff],
        }
    }

    #[test]
    fn test_composite_keys() {
        let asset = asset();
        assert_eq!(asset.composite_key(), "era-1-sub-1-2-0");
        assert_eq!(asset.legacy_key(), "sub-1-2-0");
    }

    #[test]
    fn test_payload_serializes_as_base64() {
        let asset = asset();
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json.get("data").unwrap().as_str().unwrap(), "H4sA/w==");
        let back: AudioAsset = serde_json::from_value(json).unwrap();
        assert_eq!(back, asset);
    }
}

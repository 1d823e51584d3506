//! Legacy migration engine.
//!
//! Detects snapshots written by the two pre-hierarchy schema generations
//! and upgrades them into the current `AppState` schema:
//!
//! - Flat subtopic lists (pre-theme) are wrapped in one synthetic theme
//! - Theme lists (pre-era) are wrapped in one synthetic migrated era
//! - Propositions without an explicit type receive their positional kind
//! - Missing ids receive deterministic positional fallbacks
//! - Audio records keyed under the old per-subtopic scheme are regrouped
//!   by `(proposition_index, audio_index)` and attached to the migrated
//!   propositions
//!
//! The migrator never re-runs: the synchronization service writes the
//! upgraded state back to the primary store, after which every load finds
//! current-schema data. A malformed legacy collection is an error here and
//! a bootstrap-default fallback at the caller, never a crash of the load
//! path.

mod legacy;

pub use legacy::{
    LegacyAudioRecord, LegacyProposition, LegacySnapshot, LegacySubtopic, LegacyTheme,
};

use repaso_core::era::{AudioClip, Era, Proposition, PropositionKind, Subtopic, Theme};
use repaso_core::error::Result;
use repaso_core::id;
use repaso_core::state::AppState;
use serde_json::Value;
use std::collections::BTreeMap;

/// Id of the synthetic theme that wraps flat legacy subtopic lists.
pub const LEGACY_THEME_ID: &str = "legacy";
/// Display name of the synthetic legacy theme.
pub const LEGACY_THEME_NAME: &str = "Subtemas migrados";
/// Display name of the synthetic era wrapping migrated themes.
pub const MIGRATED_ERA_NAME: &str = "Ciclo migrado";

/// Synthetic parent id used for fallback id generation during migration.
///
/// Deliberately not the migrated era's uuid: fallback ids must be stable
/// across repeated runs over the same source data.
const MIGRATED_PARENT_ID: &str = "migrated";

/// Upgrades legacy snapshots into the current schema.
pub struct LegacyMigrator;

impl LegacyMigrator {
    /// Upgrades a detected legacy snapshot, attaching regrouped audio
    /// records, and returns a current-schema state with empty history.
    ///
    /// # Errors
    ///
    /// Returns a serialization error when a legacy record cannot be
    /// interpreted at all; callers fall back to the bootstrap default.
    pub fn upgrade(snapshot: LegacySnapshot, audio: &[LegacyAudioRecord]) -> Result<AppState> {
        let themes = match snapshot {
            LegacySnapshot::Themes(raw) => {
                let records: Vec<LegacyTheme> = serde_json::from_value(Value::Array(raw))?;
                tracing::debug!(themes = records.len(), "migrating legacy theme list");
                records
                    .into_iter()
                    .enumerate()
                    .map(|(index, record)| Self::theme_from(record, index))
                    .collect()
            }
            LegacySnapshot::Subtopics(raw) => {
                let records: Vec<LegacySubtopic> = serde_json::from_value(Value::Array(raw))?;
                tracing::debug!(subtopics = records.len(), "migrating flat legacy subtopic list");
                let mut theme = Theme::new(LEGACY_THEME_ID, LEGACY_THEME_NAME);
                theme.subtopics = records
                    .into_iter()
                    .enumerate()
                    .map(|(index, record)| Self::subtopic_from(LEGACY_THEME_ID, record, index))
                    .collect();
                vec![theme]
            }
        };

        let mut era = Era::new(MIGRATED_ERA_NAME);
        era.themes = themes;
        Self::attach_audio(&mut era, audio);

        Ok(AppState {
            current_era: era,
            era_history: Vec::new(),
        })
    }

    /// Parses the legacy audio index document. Unreadable indexes are
    /// treated as empty rather than failing the whole migration.
    pub fn audio_records(value: &Value) -> Vec<LegacyAudioRecord> {
        serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            tracing::warn!("legacy audio index unreadable, dropping it: {}", e);
            Vec::new()
        })
    }

    fn theme_from(record: LegacyTheme, index: usize) -> Theme {
        let theme_id = id::ensure_id(
            &record.id,
            id::fallback_id(MIGRATED_PARENT_ID, "theme", index),
        );
        let mut theme = Theme::new(theme_id.clone(), record.name);
        theme.subtopics = record
            .subtopics
            .into_iter()
            .enumerate()
            .map(|(position, subtopic)| Self::subtopic_from(&theme_id, subtopic, position))
            .collect();
        theme
    }

    fn subtopic_from(parent_id: &str, record: LegacySubtopic, index: usize) -> Subtopic {
        let subtopic_id = id::ensure_id(&record.id, id::fallback_id(parent_id, "subtopic", index));
        let mut subtopic = Subtopic::new(subtopic_id.clone(), record.text);
        subtopic.propositions = record.propositions.map(|propositions| {
            propositions
                .into_iter()
                .enumerate()
                .map(|(position, proposition)| {
                    Self::proposition_from(&subtopic_id, proposition, position)
                })
                .collect()
        });
        subtopic
    }

    fn proposition_from(parent_id: &str, record: LegacyProposition, index: usize) -> Proposition {
        let kind = record
            .kind
            .as_deref()
            .map(PropositionKind::from_tag)
            .unwrap_or_else(|| PropositionKind::positional(index));
        let label = record
            .label
            .unwrap_or_else(|| kind.default_label().to_string());
        Proposition::new(
            id::ensure_id(&record.id, id::fallback_id(parent_id, "proposition", index)),
            kind,
            label,
            record.text,
        )
    }

    /// Regroups audio records from the old per-subtopic index scheme by
    /// `(proposition_index, audio_index)` and attaches them to the migrated
    /// propositions. Records pointing at subtopics or propositions that no
    /// longer resolve are dropped with a warning.
    fn attach_audio(era: &mut Era, records: &[LegacyAudioRecord]) {
        let mut buckets: BTreeMap<(String, usize), Vec<&LegacyAudioRecord>> = BTreeMap::new();
        for record in records {
            buckets
                .entry((record.subtopic_id.clone(), record.proposition_index))
                .or_default()
                .push(record);
        }

        for ((subtopic_id, proposition_index), mut takes) in buckets {
            // Stored positions first, unindexed takes after in arrival order.
            takes.sort_by_key(|record| record.audio_index.unwrap_or(usize::MAX));

            let proposition = era
                .find_subtopic_mut(&subtopic_id)
                .and_then(|subtopic| subtopic.propositions.as_mut())
                .and_then(|propositions| propositions.get_mut(proposition_index));
            match proposition {
                Some(proposition) => {
                    for record in takes {
                        proposition.audios.push(AudioClip {
                            mime_type: record.mime_type.clone(),
                            recorded_at: record.recorded_at.clone(),
                        });
                    }
                }
                None => {
                    tracing::warn!(
                        subtopic = %subtopic_id,
                        proposition = proposition_index,
                        takes = takes.len(),
                        "legacy audio points at a missing proposition, dropping"
                    );
                }
            }
        }
    }
}

//! Entity tree domain models.
//!
//! This module contains the Era/Theme/Subtopic/Proposition hierarchy that
//! the rest of the system synchronizes and migrates. These are the "pure"
//! domain models that business logic operates on, independent of any
//! specific storage format or schema generation.
//!
//! All types own their data: `Clone` produces a structurally independent
//! deep copy, which is what era archival relies on for snapshot isolation.

use crate::error::{RepasoError, Result};
use crate::id;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved theme id that collects subtopics ingested from external
/// navigation events. Well-known merge target.
pub const EXTERNAL_THEME_ID: &str = "external-subtopics";
/// Display name for the external-subtopics theme.
pub const EXTERNAL_THEME_NAME: &str = "Subtemas externos";

/// Reserved theme id for subtopics that arrive from the remote store.
pub const SHARED_THEME_ID: &str = "shared-subtopics";
/// Display name for the shared-subtopics theme.
pub const SHARED_THEME_NAME: &str = "Subtemas compartidos";

/// Returns the current time as an ISO 8601 string.
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

/// The logical variant a proposition represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropositionKind {
    Condition,
    Reciprocal,
    Inverse,
    Contrapositive,
    Custom,
}

impl PropositionKind {
    /// Positional kind assignment used by legacy migration and import:
    /// index 0 is the condition, then the three standard variants, and
    /// everything past that is a free-form custom entry.
    pub fn positional(index: usize) -> Self {
        match index {
            0 => Self::Condition,
            1 => Self::Reciprocal,
            2 => Self::Inverse,
            3 => Self::Contrapositive,
            _ => Self::Custom,
        }
    }

    /// Parses a loosely-specified kind tag (Spanish or English, any case).
    ///
    /// Unknown tags map to `Custom` so pasted data never fails on an
    /// unexpected label.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "condicion" | "condición" | "condition" => Self::Condition,
            "reciproco" | "recíproco" | "reciprocal" => Self::Reciprocal,
            "inverso" | "inversa" | "inverse" => Self::Inverse,
            "contrapositivo" | "contrarreciproco" | "contrarrecíproco" | "contrapositive" => {
                Self::Contrapositive
            }
            _ => Self::Custom,
        }
    }

    /// Default display label for the kind.
    pub fn default_label(&self) -> &'static str {
        match self {
            Self::Condition => "Condición",
            Self::Reciprocal => "Recíproco",
            Self::Inverse => "Inverso",
            Self::Contrapositive => "Contrarrecíproco",
            Self::Custom => "Personalizada",
        }
    }
}

/// One recorded audio take attached to a proposition.
///
/// The tree keeps only the descriptive part of a take; binary payloads live
/// in the backend stores under the composite key and are fetched on demand.
/// Takes are append-only per proposition; "latest" is the last in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    pub mime_type: String,
    /// Timestamp when the take was recorded (ISO 8601 format)
    pub recorded_at: String,
}

/// One logical variant of a subtopic, with zero or more recorded takes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposition {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PropositionKind,
    pub label: String,
    pub text: String,
    #[serde(default)]
    pub audios: Vec<AudioClip>,
}

impl Proposition {
    pub fn new(
        id: impl Into<String>,
        kind: PropositionKind,
        label: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            text: text.into(),
            audios: Vec::new(),
        }
    }

    /// The most recent take, if any.
    pub fn latest_audio(&self) -> Option<&AudioClip> {
        self.audios.last()
    }
}

/// A single condition/theorem statement, optionally expanded into its
/// logical variants.
///
/// `propositions == None` means the subtopic has not been expanded yet;
/// expansion is a separate, explicit operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtopic {
    pub id: String,
    /// The condition statement ("Si P entonces Q").
    pub text: String,
    pub propositions: Option<Vec<Proposition>>,
}

impl Subtopic {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            propositions: None,
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.propositions.is_some()
    }

    /// The condition-typed proposition, if the subtopic is expanded.
    pub fn condition_mut(&mut self) -> Option<&mut Proposition> {
        self.propositions
            .as_mut()?
            .iter_mut()
            .find(|p| p.kind == PropositionKind::Condition)
    }

    /// Updates the condition statement, mirroring the new text into the
    /// condition-typed proposition when one exists.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.text = text.clone();
        if let Some(condition) = self.condition_mut() {
            condition.text = text;
        }
    }

    /// Expands the subtopic into its four standard variants.
    ///
    /// The condition proposition mirrors the subtopic text; the three
    /// variant texts are supplied by the caller (typically the text
    /// generation collaborator). Ids are deterministic positional fallbacks.
    pub fn expand_standard(
        &mut self,
        reciprocal: impl Into<String>,
        inverse: impl Into<String>,
        contrapositive: impl Into<String>,
    ) {
        let texts = [
            self.text.clone(),
            reciprocal.into(),
            inverse.into(),
            contrapositive.into(),
        ];
        let propositions = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let kind = PropositionKind::positional(i);
                Proposition::new(
                    id::fallback_id(&self.id, "proposition", i),
                    kind,
                    kind.default_label(),
                    text,
                )
            })
            .collect();
        self.propositions = Some(propositions);
    }
}

/// A named grouping of subtopics within an era.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subtopics: Vec<Subtopic>,
}

impl Theme {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            subtopics: Vec::new(),
        }
    }

    pub fn subtopic(&self, id: &str) -> Option<&Subtopic> {
        self.subtopics.iter().find(|s| s.id == id)
    }

    pub fn subtopic_mut(&mut self, id: &str) -> Option<&mut Subtopic> {
        self.subtopics.iter_mut().find(|s| s.id == id)
    }
}

/// Aggregate counters for era summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EraSummary {
    pub themes: usize,
    pub subtopics: usize,
    pub propositions: usize,
    pub audios: usize,
}

/// A bounded, nameable work cycle.
///
/// `closed_at == None` means this is the live/open era. Exactly one open era
/// exists system-wide; archived eras are immutable in content and only
/// renamable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Era {
    pub id: String,
    pub name: String,
    /// Timestamp when the era was created (ISO 8601 format)
    pub created_at: String,
    /// Timestamp when the era or any descendant was last updated
    pub updated_at: String,
    /// Set when the era is archived; `None` for the open era
    pub closed_at: Option<String>,
    #[serde(default)]
    pub themes: Vec<Theme>,
}

impl Era {
    /// Creates a fresh blank open era.
    pub fn new(name: impl Into<String>) -> Self {
        let now = now_iso();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: now.clone(),
            updated_at: now,
            closed_at: None,
            themes: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// Refreshes `updated_at`. Every descendant mutation goes through a
    /// helper that calls this.
    pub fn touch(&mut self) {
        self.updated_at = now_iso();
    }

    pub fn theme(&self, id: &str) -> Option<&Theme> {
        self.themes.iter().find(|t| t.id == id)
    }

    pub fn theme_mut(&mut self, id: &str) -> Option<&mut Theme> {
        self.themes.iter_mut().find(|t| t.id == id)
    }

    /// Returns the theme with the given id, creating it (with the given
    /// display name) if absent.
    pub fn ensure_theme(&mut self, id: &str, name: &str) -> &mut Theme {
        if let Some(pos) = self.themes.iter().position(|t| t.id == id) {
            return &mut self.themes[pos];
        }
        self.themes.push(Theme::new(id, name));
        self.themes.last_mut().expect("theme was just pushed")
    }

    /// Finds a subtopic anywhere in the era.
    pub fn find_subtopic(&self, subtopic_id: &str) -> Option<&Subtopic> {
        self.themes.iter().find_map(|t| t.subtopic(subtopic_id))
    }

    /// Finds a subtopic anywhere in the era, mutably.
    pub fn find_subtopic_mut(&mut self, subtopic_id: &str) -> Option<&mut Subtopic> {
        self.themes
            .iter_mut()
            .find_map(|t| t.subtopic_mut(subtopic_id))
    }

    /// Updates a subtopic's condition statement, mirroring it into the
    /// condition-typed proposition and refreshing `updated_at`.
    pub fn set_subtopic_text(&mut self, subtopic_id: &str, text: &str) -> Result<()> {
        let subtopic = self
            .find_subtopic_mut(subtopic_id)
            .ok_or_else(|| RepasoError::not_found("subtopic", subtopic_id))?;
        subtopic.set_text(text);
        self.touch();
        Ok(())
    }

    /// Replaces a subtopic's proposition list (the explicit expansion
    /// operation) and refreshes `updated_at`.
    pub fn expand_subtopic(
        &mut self,
        subtopic_id: &str,
        propositions: Vec<Proposition>,
    ) -> Result<()> {
        let subtopic = self
            .find_subtopic_mut(subtopic_id)
            .ok_or_else(|| RepasoError::not_found("subtopic", subtopic_id))?;
        subtopic.propositions = Some(propositions);
        self.touch();
        Ok(())
    }

    /// Appends a recorded take to a proposition and refreshes `updated_at`.
    pub fn record_audio(
        &mut self,
        subtopic_id: &str,
        proposition_index: usize,
        clip: AudioClip,
    ) -> Result<()> {
        let subtopic = self
            .find_subtopic_mut(subtopic_id)
            .ok_or_else(|| RepasoError::not_found("subtopic", subtopic_id))?;
        let propositions = subtopic
            .propositions
            .as_mut()
            .ok_or_else(|| RepasoError::not_found("proposition", subtopic_id))?;
        let proposition = propositions
            .get_mut(proposition_index)
            .ok_or_else(|| RepasoError::not_found("proposition", proposition_index.to_string()))?;
        proposition.audios.push(clip);
        self.touch();
        Ok(())
    }

    /// Aggregate counters over the whole era.
    pub fn summary(&self) -> EraSummary {
        let mut summary = EraSummary {
            themes: self.themes.len(),
            ..EraSummary::default()
        };
        for theme in &self.themes {
            summary.subtopics += theme.subtopics.len();
            for subtopic in &theme.subtopics {
                if let Some(propositions) = &subtopic.propositions {
                    summary.propositions += propositions.len();
                    for proposition in propositions {
                        summary.audios += proposition.audios.len();
                    }
                }
            }
        }
        summary
    }
}

//! Idempotent merge of externally supplied subtopics.
//!
//! External navigation events (a link followed from another tool, a payload
//! pushed from the remote store) carry `{id, name}` pairs that must land in
//! a reserved theme of the live era without ever duplicating on retries.
//! The merge takes the state by reference and returns a new one, so a
//! repeated or half-failed event can simply be replayed.

use crate::era::{
    Subtopic, EXTERNAL_THEME_ID, EXTERNAL_THEME_NAME, SHARED_THEME_ID, SHARED_THEME_NAME,
};
use crate::id;
use crate::state::AppState;
use serde_json::Value;

/// Where an externally supplied subtopic came from. Each origin has its own
/// reserved merge-target theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOrigin {
    /// In-app external navigation events.
    External,
    /// Payloads that arrived through the remote store.
    Shared,
}

impl MergeOrigin {
    fn theme_id(&self) -> &'static str {
        match self {
            Self::External => EXTERNAL_THEME_ID,
            Self::Shared => SHARED_THEME_ID,
        }
    }

    fn theme_name(&self) -> &'static str {
        match self {
            Self::External => EXTERNAL_THEME_NAME,
            Self::Shared => SHARED_THEME_NAME,
        }
    }
}

/// An externally supplied subtopic payload.
#[derive(Debug, Clone)]
pub struct ExternalSubtopic {
    /// Raw id as it arrived; may be absent, blank, or numeric.
    pub id: Value,
    /// The condition statement text.
    pub name: String,
    pub origin: MergeOrigin,
}

/// Upserts an externally supplied subtopic into the live era.
///
/// - Absent → appended with `propositions = None` (not yet expanded)
/// - Present with different text → text updated, mirrored into the
///   condition-typed proposition, era `updated_at` stamped
/// - Present with equal text → no-op
///
/// Returns a new state; the original is untouched. Applying the same
/// payload twice produces a state equal (by content) to applying it once.
pub fn upsert_external_subtopic(state: &AppState, payload: &ExternalSubtopic) -> AppState {
    let mut next = state.clone();
    let era = &mut next.current_era;
    let theme = era.ensure_theme(payload.origin.theme_id(), payload.origin.theme_name());

    let subtopic_id = match id::normalize_id(&payload.id) {
        Some(id) => id,
        None => {
            // A payload without a usable id is keyed by its text, so a
            // re-delivered event resolves to the entry it created.
            let position = theme
                .subtopics
                .iter()
                .position(|s| s.text == payload.name)
                .unwrap_or(theme.subtopics.len());
            id::fallback_id(payload.origin.theme_id(), "subtopic", position)
        }
    };

    match theme.subtopics.iter().position(|s| s.id == subtopic_id) {
        None => {
            theme
                .subtopics
                .push(Subtopic::new(subtopic_id, payload.name.clone()));
            era.touch();
        }
        Some(index) => {
            let subtopic = &mut theme.subtopics[index];
            if subtopic.text != payload.name {
                subtopic.set_text(payload.name.clone());
                era.touch();
            } else {
                // Identical payload already applied; nothing to stamp.
                tracing::debug!(id = %subtopic_id, "external subtopic already up to date");
            }
        }
    }

    next
}

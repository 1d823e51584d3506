//! Application state root aggregate.
//!
//! `AppState` is the whole-state value that backends persist atomically and
//! the synchronization service hands around. It owns the live era and the
//! archived history; nothing outside this aggregate holds a reference into
//! the tree.

use crate::era::{Era, Subtopic, Theme};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Name given to the era created on first bootstrap.
pub const BOOTSTRAP_ERA_NAME: &str = "Primer ciclo";

/// The built-in sample theme used when no backend has any data.
static SAMPLE_THEME: Lazy<Theme> = Lazy::new(|| {
    let mut theme = Theme::new("sample-theme", "Lógica proposicional");
    theme.subtopics.push(Subtopic::new(
        "sample-theme-subtopic-0",
        "Si dos ángulos son opuestos por el vértice, entonces son congruentes",
    ));
    theme
});

/// Root aggregate: the open era plus the archived history.
///
/// `era_history` is ordered newest first. Exactly one open era exists at any
/// time and it is always `current_era`; every era in the history carries a
/// `closed_at` stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub current_era: Era,
    #[serde(default)]
    pub era_history: Vec<Era>,
}

impl AppState {
    /// The default state used when every backend is empty and no legacy
    /// data exists: one blank open era containing the built-in sample theme.
    pub fn bootstrap() -> Self {
        let mut era = Era::new(BOOTSTRAP_ERA_NAME);
        era.themes.push(SAMPLE_THEME.clone());
        Self {
            current_era: era,
            era_history: Vec::new(),
        }
    }

    /// Finds an archived era by id.
    pub fn archived_era(&self, era_id: &str) -> Option<&Era> {
        self.era_history.iter().find(|e| e.id == era_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_has_sample_theme() {
        let state = AppState::bootstrap();
        assert!(state.current_era.is_open());
        assert!(state.era_history.is_empty());
        assert_eq!(state.current_era.themes.len(), 1);
        assert_eq!(state.current_era.themes[0].id, "sample-theme");
        assert_eq!(state.current_era.themes[0].subtopics.len(), 1);
    }

    #[test]
    fn test_bootstrap_eras_are_independent() {
        let a = AppState::bootstrap();
        let b = AppState::bootstrap();
        // Fresh uuid per bootstrap era; the sample theme content is shared
        // by value, not by reference.
        assert_ne!(a.current_era.id, b.current_era.id);
        assert_eq!(a.current_era.themes, b.current_era.themes);
    }

    #[test]
    fn test_roundtrip_serialization() {
        let state = AppState::bootstrap();
        let json = serde_json::to_string(&state).unwrap();
        let back: AppState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
        // Persisted field names are camelCase
        assert!(json.contains("\"currentEra\""));
        assert!(json.contains("\"eraHistory\""));
        assert!(json.contains("\"closedAt\""));
    }
}

//! Persisted user settings.

use serde::{Deserialize, Serialize};

/// Settings that persist alongside the application state, one record per
/// backend under the `settings` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Model id forwarded to the text generation collaborator.
    pub model_id: Option<String>,
    /// Prompt template forwarded to the text generation collaborator.
    pub prompt_template: Option<String>,
    /// Whether the mirrored file-tree store is enabled.
    pub mirror_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.model_id.is_none());
        assert!(!settings.mirror_enabled);
    }

    #[test]
    fn test_partial_document_deserializes() {
        // Records written before mirror support lack the flag entirely.
        let settings: Settings = serde_json::from_str(r#"{"modelId":"gemini-2.5-flash"}"#).unwrap();
        assert_eq!(settings.model_id.as_deref(), Some("gemini-2.5-flash"));
        assert!(!settings.mirror_enabled);
    }
}

//! Legacy schema boundary types.
//!
//! Snapshots written by the two pre-hierarchy schema generations carry no
//! version field; the generation is detected from the shape of the data.
//! These DTOs are the only place loosely-typed legacy JSON is allowed to
//! exist — the migrator validates them once and everything past that point
//! is the current-schema domain model.
//!
//! The same DTOs serialize the flattened legacy-compatible projection the
//! mirrored store writes next to the current-schema snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw legacy collection, tagged by detected schema generation.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacySnapshot {
    /// Pre-era generation: a list of themes.
    Themes(Vec<Value>),
    /// Pre-theme generation: a flat list of subtopics.
    Subtopics(Vec<Value>),
}

impl LegacySnapshot {
    /// Shape detection: if the first element of the collection lacks a
    /// `name` field it is a flat legacy subtopic list, otherwise a legacy
    /// theme list. Non-list or empty data is not a legacy snapshot.
    pub fn detect(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        let first = items.first()?;
        if !first.is_object() {
            return None;
        }
        if first.get("name").is_some() {
            Some(Self::Themes(items.clone()))
        } else {
            Some(Self::Subtopics(items.clone()))
        }
    }
}

/// Lenient view of a legacy theme record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LegacyTheme {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subtopics: Vec<LegacySubtopic>,
}

/// Lenient view of a legacy subtopic record. Spanish field variants appear
/// in data that round-tripped through the import path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LegacySubtopic {
    #[serde(default)]
    pub id: Value,
    #[serde(default, alias = "texto")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propositions: Option<Vec<LegacyProposition>>,
}

/// Lenient view of a legacy proposition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LegacyProposition {
    #[serde(default)]
    pub id: Value,
    #[serde(default, rename = "type", alias = "tipo", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, alias = "etiqueta", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, alias = "texto")]
    pub text: String,
}

/// One entry of the legacy audio index: the old per-subtopic scheme that
/// predates era scoping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyAudioRecord {
    pub subtopic_id: String,
    pub proposition_index: usize,
    /// Position within the proposition, when the old index recorded one.
    pub audio_index: Option<usize>,
    pub mime_type: String,
    pub recorded_at: String,
}

//! Structured import parser for pasted text.
//!
//! Users paste loosely-formatted JSON-ish blobs copied out of chat tools and
//! documents: doubled braces, bare objects, stray backslashes, records
//! embedded in prose. The parser tries a sequence of increasingly invasive
//! rewrites, reports every fix it applied in human-readable form, and never
//! panics: an uninterpretable paste is an ordinary `Parse` error.
//!
//! The whole pipeline is deterministic: the same input always yields the
//! same parse (or the same failure), independent of any external state.
//!
//! Expected shape: the first record is a subtopic descriptor with a `texto`
//! field; subsequent records are proposition descriptors with optional
//! `tipo`/`etiqueta`/`texto`.

use crate::era::{Proposition, PropositionKind, Subtopic};
use crate::error::{RepasoError, Result};
use crate::id;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// A backslash not followed by a valid JSON escape character (common paste
/// corruption: Windows paths, LaTeX fragments).
static STRAY_BACKSLASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\\([^"\\/bfnrtu]|$)"#).expect("stray-backslash regex is valid"));

/// The outcome of a successful parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    /// The parsed records, in order. The first is the subtopic descriptor.
    pub records: Vec<Value>,
    /// The rewritten text that actually parsed.
    pub normalized_text: String,
    /// Human-readable descriptions of the fixes applied, in order.
    pub fixes: Vec<String>,
}

/// Parses pasted text into an ordered list of entry records.
pub fn parse_pasted(input: &str) -> Result<ImportReport> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(RepasoError::parse("el texto pegado está vacío"));
    }

    if let Some(report) = try_parse_text(trimmed, &[]) {
        return Ok(report);
    }

    // The text as a whole is hopeless; hunt for balanced JSON spans inside it.
    for segment in extract_segments(trimmed) {
        let base = vec!["se extrajo un fragmento JSON incrustado en el texto".to_string()];
        if let Some(report) = try_parse_text(&segment, &base) {
            return Ok(report);
        }
    }

    Err(RepasoError::parse(format!(
        "no se reconoció ningún registro JSON en el texto pegado ({} caracteres)",
        trimmed.chars().count()
    )))
}

/// Runs the candidate rewrites (and the backslash-normalized retry) over one
/// piece of text. Returns the first successful parse.
fn try_parse_text(text: &str, base_fixes: &[String]) -> Option<ImportReport> {
    if let Some(report) = try_candidates(text, base_fixes) {
        return Some(report);
    }

    let repaired = STRAY_BACKSLASH.replace_all(text, "\\\\$1");
    if repaired != text {
        let mut fixes = base_fixes.to_vec();
        fixes.push("se duplicaron barras invertidas sueltas".to_string());
        if let Some(report) = try_candidates(&repaired, &fixes) {
            return Some(report);
        }
    }

    None
}

/// Builds and attempts the candidate rewrites of one text, in order:
/// as-is, doubled-brace rewrite, bare-object wrap. First success wins.
fn try_candidates(text: &str, base_fixes: &[String]) -> Option<ImportReport> {
    let mut candidates: Vec<(String, Vec<String>)> = vec![(text.to_string(), Vec::new())];

    if text.contains("{{") {
        let collapsed = text.replace("{{", "{").replace("}}", "}");
        let rewritten = if collapsed.starts_with('[') {
            collapsed
        } else {
            format!("[{}]", collapsed)
        };
        candidates.push((
            rewritten,
            vec!["se reescribieron llaves dobles como una lista JSON".to_string()],
        ));
    }

    if text.starts_with('{') {
        candidates.push((
            format!("[{}]", text),
            vec!["se envolvió un objeto suelto en una lista".to_string()],
        ));
    }

    for (candidate, candidate_fixes) in candidates {
        match serde_json::from_str::<Value>(&candidate) {
            Ok(Value::Array(records)) => {
                let mut fixes = base_fixes.to_vec();
                fixes.extend(candidate_fixes);
                return Some(ImportReport {
                    records,
                    normalized_text: candidate,
                    fixes,
                });
            }
            Ok(value @ Value::Object(_)) => {
                // A single object is promoted to a one-element list.
                let mut fixes = base_fixes.to_vec();
                fixes.extend(candidate_fixes);
                fixes.push("se envolvió un objeto suelto en una lista".to_string());
                return Some(ImportReport {
                    records: vec![value],
                    normalized_text: candidate,
                    fixes,
                });
            }
            // Scalars are valid JSON but not record sets.
            Ok(_) | Err(_) => continue,
        }
    }

    None
}

/// Extracts every balanced top-level `{...}`/`[...]` span from raw text,
/// ignoring brackets inside quoted strings and respecting escape sequences.
fn extract_segments(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            // Quotes outside any bracket are prose, not JSON strings.
            '"' if depth > 0 => in_string = true,
            '{' | '[' => {
                if depth == 0 {
                    start = Some(index);
                }
                depth += 1;
            }
            '}' | ']' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(begin) = start.take() {
                            segments.push(text[begin..index + ch.len_utf8()].to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    segments
}

/// Converts parsed records into a subtopic.
///
/// The first record supplies the condition statement; subsequent records
/// become propositions, with a condition-typed proposition synthesized at
/// index 0 mirroring the subtopic text. Records lacking `tipo` receive their
/// positional kind; missing ids receive deterministic positional fallbacks.
pub fn records_to_subtopic(records: &[Value], theme_id: &str, position: usize) -> Result<Subtopic> {
    let first = records
        .first()
        .ok_or_else(|| RepasoError::parse("la lista de registros está vacía"))?;
    let text = string_field(first, &["texto", "text"])
        .ok_or_else(|| RepasoError::parse("el primer registro no tiene campo 'texto'"))?;

    let subtopic_id = id::ensure_id(
        first.get("id").unwrap_or(&Value::Null),
        id::fallback_id(theme_id, "subtopic", position),
    );
    let mut subtopic = Subtopic::new(subtopic_id.clone(), text.clone());

    if records.len() > 1 {
        let mut propositions = vec![Proposition::new(
            id::fallback_id(&subtopic_id, "proposition", 0),
            PropositionKind::Condition,
            PropositionKind::Condition.default_label(),
            text,
        )];
        for (offset, record) in records[1..].iter().enumerate() {
            let index = offset + 1;
            let kind = string_field(record, &["tipo", "type"])
                .map(|tag| PropositionKind::from_tag(&tag))
                .unwrap_or_else(|| PropositionKind::positional(index));
            let label = string_field(record, &["etiqueta", "label"])
                .unwrap_or_else(|| kind.default_label().to_string());
            let prop_text = string_field(record, &["texto", "text"]).unwrap_or_default();
            let prop_id = id::ensure_id(
                record.get("id").unwrap_or(&Value::Null),
                id::fallback_id(&subtopic_id, "proposition", index),
            );
            propositions.push(Proposition::new(prop_id, kind, label, prop_text));
        }
        subtopic.propositions = Some(propositions);
    }

    Ok(subtopic)
}

fn string_field(record: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| record.get(*name))
        .and_then(Value::as_str)
        .map(str::to_string)
}

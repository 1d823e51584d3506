//! Era domain module.
//!
//! Contains the Era/Theme/Subtopic/Proposition entity tree, its aggregate
//! counters, and the era lifecycle transitions (close/reopen/rename).
//!
//! # Module Structure
//!
//! - `model`: the entity tree types and their mutation helpers
//! - `lifecycle`: close/reopen/rename transitions on `AppState`

mod lifecycle;
mod model;

// Re-export public API
pub use model::{
    AudioClip, Era, EraSummary, Proposition, PropositionKind, Subtopic, Theme, EXTERNAL_THEME_ID,
    EXTERNAL_THEME_NAME, SHARED_THEME_ID, SHARED_THEME_NAME,
};

//! Era lifecycle transitions.
//!
//! Close, reopen, and rename operate on the whole `AppState` by value and
//! return a new state: the caller's state is never mutated in place, and
//! current/history slots never alias each other. This is what keeps archived
//! snapshots isolated from later mutations of the live tree.

use super::model::{now_iso, Era};
use crate::error::{RepasoError, Result};
use crate::state::AppState;

impl AppState {
    /// Archives the current era and replaces it with a fresh blank one.
    ///
    /// The archived copy is a deep clone stamped with `closed_at` and pushed
    /// to the front of the history (newest first).
    pub fn close_cycle(&self, new_era_name: impl Into<String>) -> AppState {
        let now = now_iso();
        let mut archived = self.current_era.clone();
        archived.closed_at = Some(now.clone());
        archived.updated_at = now;

        let mut era_history = Vec::with_capacity(self.era_history.len() + 1);
        era_history.push(archived);
        era_history.extend(self.era_history.iter().cloned());

        AppState {
            current_era: Era::new(new_era_name),
            era_history,
        }
    }

    /// Reopens an archived era as the current one.
    ///
    /// An atomic value swap: the target is deep-cloned back into
    /// `current_era` with `closed_at` cleared, and the previous current era
    /// is deep-cloned into the history slot the target occupied. At no point
    /// do two open eras exist.
    pub fn reopen_era(&self, era_id: &str) -> Result<AppState> {
        let position = self
            .era_history
            .iter()
            .position(|e| e.id == era_id)
            .ok_or_else(|| RepasoError::not_found("era", era_id))?;

        let now = now_iso();
        let mut reopened = self.era_history[position].clone();
        reopened.closed_at = None;
        reopened.updated_at = now.clone();

        let mut archived = self.current_era.clone();
        archived.closed_at = Some(now.clone());
        archived.updated_at = now;

        let mut era_history = self.era_history.clone();
        era_history[position] = archived;

        Ok(AppState {
            current_era: reopened,
            era_history,
        })
    }

    /// Renames an era, current or archived.
    ///
    /// This is the only mutation permitted on an archived era; only `name`
    /// and `updated_at` change.
    pub fn rename_era(&self, era_id: &str, name: impl Into<String>) -> Result<AppState> {
        let name = name.into();
        let mut next = self.clone();
        if next.current_era.id == era_id {
            next.current_era.name = name;
            next.current_era.touch();
            return Ok(next);
        }
        let era = next
            .era_history
            .iter_mut()
            .find(|e| e.id == era_id)
            .ok_or_else(|| RepasoError::not_found("era", era_id))?;
        era.name = name;
        era.updated_at = now_iso();
        Ok(next)
    }
}

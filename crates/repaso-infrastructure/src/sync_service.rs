//! State synchronization service.
//!
//! Decides at load time which backend's data is authoritative, fans out
//! saves, and never attempts a cross-backend transaction: consistency is
//! eventual and last-write-wins at whole-state granularity.
//!
//! Load precedence, first success wins:
//! 1. primary store (authoritative whenever it holds current-schema data)
//! 2. mirrored file-tree snapshot, when a mirror is configured
//! 3. legacy migration over either backend's raw per-entity records
//! 4. bootstrap default
//!
//! Save ordering: the primary write always completes (success or failure)
//! before the mirror write begins; the mirror write is best-effort and its
//! failure is a warning, never a rollback. The remote store is written only
//! through the explicit `save_remote*` operations, decoupled from the
//! autosave loop.
//!
//! A load superseded by a newer load request never applies: each load takes
//! a generation ticket and its result is discarded if a later load has been
//! issued by the time it completes.

use crate::migration::{LegacyMigrator, LegacySnapshot};
use repaso_core::error::{RepasoError, Result};
use repaso_core::settings::Settings;
use repaso_core::state::AppState;
use repaso_core::store::{AudioAsset, StateStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Caller-supplied context for a load request, replacing the hidden global
/// pending-navigation flag of older designs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadHint {
    /// An externally-initiated write to the primary store is expected;
    /// prefer the primary even when a mirror snapshot also exists, so a
    /// stale file-system copy cannot clobber the freshest data.
    ExternalWritePending,
}

/// Which backend ultimately supplied the loaded state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Primary,
    Mirror,
    Migrated,
    Bootstrap,
}

/// The result of a load: some usable state, always.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedState {
    pub state: AppState,
    pub source: LoadSource,
}

pub struct StateSyncService {
    primary: Arc<dyn StateStore>,
    mirror: Option<Arc<dyn StateStore>>,
    remote: Option<Arc<dyn StateStore>>,
    generation: AtomicU64,
}

impl StateSyncService {
    pub fn new(
        primary: Arc<dyn StateStore>,
        mirror: Option<Arc<dyn StateStore>>,
        remote: Option<Arc<dyn StateStore>>,
    ) -> Self {
        Self {
            primary,
            mirror,
            remote,
            generation: AtomicU64::new(0),
        }
    }

    /// Loads the authoritative state.
    ///
    /// Always produces *some* usable state (primary, mirrored, migrated, or
    /// bootstrap default) unless superseded by a newer load request, in
    /// which case `RepasoError::Superseded` tells the caller to drop the
    /// result.
    pub async fn load(&self, hint: Option<LoadHint>) -> Result<LoadedState> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.load_inner(hint).await;
        if self.generation.load(Ordering::SeqCst) != ticket {
            tracing::debug!(ticket, "load superseded, discarding result");
            return Err(RepasoError::Superseded);
        }
        result
    }

    async fn load_inner(&self, hint: Option<LoadHint>) -> Result<LoadedState> {
        if hint == Some(LoadHint::ExternalWritePending) {
            tracing::debug!("external write pending, primary store preferred");
        }

        // Primary store: authoritative whenever it holds current-schema
        // data. The mirror is deliberately not consulted in that case.
        match self.primary.load_state().await {
            Ok(Some(state)) => {
                return Ok(LoadedState {
                    state,
                    source: LoadSource::Primary,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(store = self.primary.name(), "load failed: {}", e),
        }

        // Mirror snapshot as recovery source.
        if let Some(mirror) = &self.mirror {
            match mirror.load_state().await {
                Ok(Some(state)) => {
                    return Ok(LoadedState {
                        state,
                        source: LoadSource::Mirror,
                    });
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(store = mirror.name(), "load failed: {}", e),
            }
        }

        // Raw legacy records from either backend.
        if let Some(state) = self.migrate_legacy().await {
            return Ok(LoadedState {
                state,
                source: LoadSource::Migrated,
            });
        }

        tracing::debug!("no backend has data, bootstrapping default state");
        Ok(LoadedState {
            state: AppState::bootstrap(),
            source: LoadSource::Bootstrap,
        })
    }

    /// Runs the legacy migration engine against whatever raw legacy data
    /// either backend exposes. The upgraded state is written back to the
    /// primary store exactly once so migration never re-runs.
    async fn migrate_legacy(&self) -> Option<AppState> {
        let mut stores: Vec<&Arc<dyn StateStore>> = vec![&self.primary];
        if let Some(mirror) = &self.mirror {
            stores.push(mirror);
        }

        for store in stores {
            for key in ["themes", "subtopics"] {
                let raw = match store.load_raw(key).await {
                    Ok(Some(raw)) => raw,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(store = store.name(), key, "legacy read failed: {}", e);
                        continue;
                    }
                };
                let Some(snapshot) = LegacySnapshot::detect(&raw) else {
                    continue;
                };

                let audio_records = match store.load_raw("audio-index").await {
                    Ok(Some(index)) => LegacyMigrator::audio_records(&index),
                    _ => Vec::new(),
                };

                match LegacyMigrator::upgrade(snapshot, &audio_records) {
                    Ok(state) => {
                        tracing::debug!(store = store.name(), key, "legacy data migrated");
                        if let Err(e) = self.primary.save_state(&state).await {
                            tracing::warn!("migrated state write-back failed: {}", e);
                        }
                        return Some(state);
                    }
                    Err(e) => {
                        // Corrupt legacy data never crashes the load path.
                        tracing::warn!(store = store.name(), key, "migration failed: {}", e);
                    }
                }
            }
        }
        None
    }

    /// Persists a mutation of the in-memory tree.
    ///
    /// The primary write is awaited first; if a mirror is configured it is
    /// written afterwards, independently, and its failure neither blocks
    /// nor rolls back the primary write. The in-memory tree stays the
    /// session's source of truth regardless of the outcome.
    pub async fn save(&self, state: &AppState) -> Result<()> {
        let primary_result = self.primary.save_state(state).await;
        if let Err(e) = &primary_result {
            tracing::warn!(store = self.primary.name(), "state save failed: {}", e);
        }

        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.save_state(state).await {
                tracing::warn!(store = mirror.name(), "best-effort save failed: {}", e);
            }
        }

        primary_result
    }

    /// Persists one audio asset, primary first, mirror best-effort.
    pub async fn save_audio(&self, asset: &AudioAsset) -> Result<()> {
        let primary_result = self.primary.save_audio(asset).await;
        if let Err(e) = &primary_result {
            tracing::warn!(store = self.primary.name(), "audio save failed: {}", e);
        }

        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.save_audio(asset).await {
                tracing::warn!(store = mirror.name(), "best-effort audio save failed: {}", e);
            }
        }

        primary_result
    }

    /// Loads audio assets from the primary store, falling back to the
    /// mirror when the primary has none for the requested scope.
    pub async fn load_audio(&self, subtopic_id: Option<&str>) -> Result<Vec<AudioAsset>> {
        match self.primary.load_audio(subtopic_id).await {
            Ok(assets) if !assets.is_empty() => return Ok(assets),
            Ok(_) => {}
            Err(e) => tracing::warn!(store = self.primary.name(), "audio load failed: {}", e),
        }
        if let Some(mirror) = &self.mirror {
            return mirror.load_audio(subtopic_id).await;
        }
        Ok(Vec::new())
    }

    pub async fn load_settings(&self) -> Result<Option<Settings>> {
        self.primary.load_settings().await
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.primary.save_settings(settings).await
    }

    /// Explicit user-facing push of the whole state to the remote store.
    ///
    /// Decoupled from the autosave loop: the remote may lag behind the
    /// in-memory tree and callers must not assume otherwise.
    pub async fn save_remote(&self, state: &AppState) -> Result<()> {
        self.remote_store()?.save_state(state).await
    }

    /// Explicit push of the settings record to the remote store.
    pub async fn save_remote_settings(&self, settings: &Settings) -> Result<()> {
        self.remote_store()?.save_settings(settings).await
    }

    /// Explicit push of one audio asset to the remote store.
    pub async fn save_remote_audio(&self, asset: &AudioAsset) -> Result<()> {
        self.remote_store()?.save_audio(asset).await
    }

    fn remote_store(&self) -> Result<&Arc<dyn StateStore>> {
        self.remote
            .as_ref()
            .ok_or_else(|| RepasoError::config("remote store not configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// In-memory store that records every call it receives.
    struct RecordingStore {
        store_name: &'static str,
        state: Mutex<Option<AppState>>,
        raw: Mutex<HashMap<String, Value>>,
        calls: Arc<Mutex<Vec<String>>>,
        fail_saves: bool,
        load_count: AtomicUsize,
        /// When set, the first `load_state` call signals `entered` and then
        /// waits for `release` before returning.
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl RecordingStore {
        fn new(store_name: &'static str, calls: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                store_name,
                state: Mutex::new(None),
                raw: Mutex::new(HashMap::new()),
                calls,
                fail_saves: false,
                load_count: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn with_state(self, state: AppState) -> Self {
            *self.state.lock().unwrap() = Some(state);
            self
        }

        fn with_raw(self, key: &str, value: Value) -> Self {
            self.raw.lock().unwrap().insert(key.to_string(), value);
            self
        }

        fn failing_saves(mut self) -> Self {
            self.fail_saves = true;
            self
        }

        fn record(&self, operation: &str) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}.{}", self.store_name, operation));
        }
    }

    #[async_trait]
    impl StateStore for RecordingStore {
        fn name(&self) -> &'static str {
            self.store_name
        }

        async fn load_state(&self) -> Result<Option<AppState>> {
            self.record("load_state");
            if let Some((entered, release)) = &self.gate {
                if self.load_count.fetch_add(1, Ordering::SeqCst) == 0 {
                    entered.notify_one();
                    release.notified().await;
                }
            }
            Ok(self.state.lock().unwrap().clone())
        }

        async fn save_state(&self, state: &AppState) -> Result<()> {
            self.record("save_state");
            if self.fail_saves {
                return Err(RepasoError::data_access("disk full"));
            }
            *self.state.lock().unwrap() = Some(state.clone());
            Ok(())
        }

        async fn load_settings(&self) -> Result<Option<Settings>> {
            self.record("load_settings");
            Ok(None)
        }

        async fn save_settings(&self, _settings: &Settings) -> Result<()> {
            self.record("save_settings");
            Ok(())
        }

        async fn load_audio(&self, _subtopic_id: Option<&str>) -> Result<Vec<AudioAsset>> {
            self.record("load_audio");
            Ok(Vec::new())
        }

        async fn save_audio(&self, _asset: &AudioAsset) -> Result<()> {
            self.record("save_audio");
            if self.fail_saves {
                return Err(RepasoError::data_access("disk full"));
            }
            Ok(())
        }

        async fn clear_all(&self) -> Result<()> {
            self.record("clear_all");
            Ok(())
        }

        async fn load_raw(&self, key: &str) -> Result<Option<Value>> {
            self.record(&format!("load_raw:{}", key));
            Ok(self.raw.lock().unwrap().get(key).cloned())
        }
    }

    fn calls_of(calls: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_primary_data_wins_without_consulting_mirror() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let primary =
            Arc::new(RecordingStore::new("primary", calls.clone()).with_state(AppState::bootstrap()));
        let mirror = Arc::new(RecordingStore::new("mirror", calls.clone()));

        let service = StateSyncService::new(primary, Some(mirror), None);
        let loaded = service.load(None).await.unwrap();

        assert_eq!(loaded.source, LoadSource::Primary);
        let recorded = calls_of(&calls);
        assert!(recorded.contains(&"primary.load_state".to_string()));
        assert!(!recorded.iter().any(|c| c.starts_with("mirror.")));
    }

    #[tokio::test]
    async fn test_mirror_is_recovery_source() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let primary = Arc::new(RecordingStore::new("primary", calls.clone()));
        let mirror =
            Arc::new(RecordingStore::new("mirror", calls.clone()).with_state(AppState::bootstrap()));

        let service = StateSyncService::new(primary, Some(mirror), None);
        let loaded = service.load(Some(LoadHint::ExternalWritePending)).await.unwrap();

        assert_eq!(loaded.source, LoadSource::Mirror);
    }

    #[tokio::test]
    async fn test_legacy_migration_runs_and_writes_back_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let legacy = json!([{"text": "A", "propositions": [{"text": "p0"}, {"text": "p1"}]}]);
        let primary =
            Arc::new(RecordingStore::new("primary", calls.clone()).with_raw("subtopics", legacy));

        let service = StateSyncService::new(primary.clone(), None, None);
        let loaded = service.load(None).await.unwrap();

        assert_eq!(loaded.source, LoadSource::Migrated);
        assert_eq!(loaded.state.current_era.themes[0].id, "legacy");

        // Written back exactly once, so the next load finds current-schema
        // data and migration never re-runs.
        let write_backs = calls_of(&calls)
            .iter()
            .filter(|c| c.as_str() == "primary.save_state")
            .count();
        assert_eq!(write_backs, 1);

        let again = service.load(None).await.unwrap();
        assert_eq!(again.source, LoadSource::Primary);
        assert_eq!(again.state, loaded.state);
    }

    #[tokio::test]
    async fn test_corrupt_legacy_falls_back_to_bootstrap() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let corrupt = json!([{"name": "ok"}, 42]);
        let primary =
            Arc::new(RecordingStore::new("primary", calls.clone()).with_raw("themes", corrupt));

        let service = StateSyncService::new(primary, None, None);
        let loaded = service.load(None).await.unwrap();

        assert_eq!(loaded.source, LoadSource::Bootstrap);
        assert_eq!(loaded.state.current_era.themes[0].id, "sample-theme");
    }

    #[tokio::test]
    async fn test_empty_backends_bootstrap() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let primary = Arc::new(RecordingStore::new("primary", calls.clone()));
        let mirror = Arc::new(RecordingStore::new("mirror", calls.clone()));

        let service = StateSyncService::new(primary, Some(mirror), None);
        let loaded = service.load(None).await.unwrap();

        assert_eq!(loaded.source, LoadSource::Bootstrap);
    }

    #[tokio::test]
    async fn test_save_writes_primary_before_mirror() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let primary = Arc::new(RecordingStore::new("primary", calls.clone()));
        let mirror = Arc::new(RecordingStore::new("mirror", calls.clone()));

        let service = StateSyncService::new(primary, Some(mirror), None);
        service.save(&AppState::bootstrap()).await.unwrap();

        let recorded = calls_of(&calls);
        let primary_position = recorded
            .iter()
            .position(|c| c == "primary.save_state")
            .unwrap();
        let mirror_position = recorded
            .iter()
            .position(|c| c == "mirror.save_state")
            .unwrap();
        assert!(primary_position < mirror_position);
    }

    #[tokio::test]
    async fn test_mirror_failure_does_not_fail_save() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let primary = Arc::new(RecordingStore::new("primary", calls.clone()));
        let mirror = Arc::new(RecordingStore::new("mirror", calls.clone()).failing_saves());

        let service = StateSyncService::new(primary, Some(mirror), None);
        assert!(service.save(&AppState::bootstrap()).await.is_ok());
    }

    #[tokio::test]
    async fn test_primary_failure_surfaces_after_mirror_attempt() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let primary = Arc::new(RecordingStore::new("primary", calls.clone()).failing_saves());
        let mirror = Arc::new(RecordingStore::new("mirror", calls.clone()));

        let service = StateSyncService::new(primary, Some(mirror), None);
        assert!(service.save(&AppState::bootstrap()).await.is_err());
        // The mirror write was still attempted.
        assert!(calls_of(&calls).contains(&"mirror.save_state".to_string()));
    }

    #[tokio::test]
    async fn test_save_remote_requires_configuration() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let primary = Arc::new(RecordingStore::new("primary", calls.clone()));

        let service = StateSyncService::new(primary, None, None);
        let err = service.save_remote(&AppState::bootstrap()).await.unwrap_err();
        assert!(matches!(err, RepasoError::Config(_)));
    }

    #[tokio::test]
    async fn test_remote_save_is_explicit_only() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let primary = Arc::new(RecordingStore::new("primary", calls.clone()));
        let remote = Arc::new(RecordingStore::new("remote", calls.clone()));

        let service = StateSyncService::new(primary, None, Some(remote));
        service.save(&AppState::bootstrap()).await.unwrap();
        assert!(!calls_of(&calls).iter().any(|c| c.starts_with("remote.")));

        service.save_remote(&AppState::bootstrap()).await.unwrap();
        assert!(calls_of(&calls).contains(&"remote.save_state".to_string()));
    }

    #[tokio::test]
    async fn test_superseded_load_is_discarded() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let mut slow_primary =
            RecordingStore::new("primary", calls.clone()).with_state(AppState::bootstrap());
        slow_primary.gate = Some((entered.clone(), release.clone()));

        let service = Arc::new(StateSyncService::new(Arc::new(slow_primary), None, None));

        let service_for_first = service.clone();
        let first = tokio::spawn(async move { service_for_first.load(None).await });

        // Wait until the first load is inside the store, then complete a
        // second load and only then let the first one finish.
        entered.notified().await;
        service.load(None).await.unwrap();
        release.notify_one();

        let result = first.await.unwrap();
        assert!(matches!(result, Err(RepasoError::Superseded)));
    }
}

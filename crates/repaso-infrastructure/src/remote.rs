//! Remote store client.
//!
//! Talks to the remote relational store over its HTTP surface: one JSON
//! document per logical key (`app_state`, `settings`), upserted by primary
//! key, plus individually keyed audio rows indexed by subtopic for partial
//! retrieval. Binary payloads travel base64-encoded.
//!
//! Responses are always a JSON object carrying either the requested data or
//! an `error` message; 200/204 mean success, 400 a malformed request, 404 an
//! unknown resource key, 500 a backend failure. All of these surface as
//! ordinary `RepasoError` values, never panics.

use async_trait::async_trait;
use chrono::Utc;
use repaso_core::error::{RepasoError, Result};
use repaso_core::settings::Settings;
use repaso_core::state::AppState;
use repaso_core::store::{AudioAsset, StateStore};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const STATE_KEY: &str = "app_state";
const SETTINGS_KEY: &str = "settings";

pub struct RemoteStore {
    client: Client,
    base_url: String,
}

impl RemoteStore {
    /// Creates a new client for the remote store at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn document_url(&self, key: &str) -> String {
        format!("{}/state/{}", self.base_url, key)
    }

    fn audio_url(&self, subtopic_id: Option<&str>) -> String {
        match subtopic_id {
            Some(id) => format!("{}/audio?subtopic={}", self.base_url, id),
            None => format!("{}/audio", self.base_url),
        }
    }

    /// Maps a non-success response into a `RepasoError`, preferring the
    /// server's own `error` message when the body carries one.
    fn map_error(status: StatusCode, body: Option<&Value>) -> RepasoError {
        let server_message = body
            .and_then(|b| b.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("no error message");
        match status.as_u16() {
            400 => RepasoError::data_access(format!("remote rejected request: {}", server_message)),
            404 => RepasoError::not_found("remote document", server_message),
            _ => RepasoError::data_access(format!(
                "remote backend failure ({}): {}",
                status, server_message
            )),
        }
    }

    fn transport_error(e: reqwest::Error) -> RepasoError {
        RepasoError::data_access(format!("remote request failed: {}", e))
    }

    /// Fetches one JSON document; 404 means the key holds no data.
    async fn get_document(&self, key: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get(self.document_url(key))
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = response.json().await.map_err(Self::transport_error)?;
        if !status.is_success() {
            return Err(Self::map_error(status, Some(&body)));
        }
        body.get("data")
            .cloned()
            .map(Some)
            .ok_or_else(|| RepasoError::data_access("remote response lacks a data field"))
    }

    /// Upserts one JSON document under its key.
    async fn put_document(&self, key: &str, data: Value) -> Result<()> {
        let response = self
            .client
            .put(self.document_url(key))
            .json(&json!({
                "data": data,
                "updatedAt": Utc::now().to_rfc3339(),
            }))
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Err(Self::map_error(status, Some(&body)))
    }
}

#[async_trait]
impl StateStore for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn load_state(&self) -> Result<Option<AppState>> {
        match self.get_document(STATE_KEY).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save_state(&self, state: &AppState) -> Result<()> {
        self.put_document(STATE_KEY, serde_json::to_value(state)?)
            .await
    }

    async fn load_settings(&self) -> Result<Option<Settings>> {
        match self.get_document(SETTINGS_KEY).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.put_document(SETTINGS_KEY, serde_json::to_value(settings)?)
            .await
    }

    async fn load_audio(&self, subtopic_id: Option<&str>) -> Result<Vec<AudioAsset>> {
        let response = self
            .client
            .get(self.audio_url(subtopic_id))
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body: Value = response.json().await.map_err(Self::transport_error)?;
        if !status.is_success() {
            return Err(Self::map_error(status, Some(&body)));
        }
        let data = body
            .get("data")
            .cloned()
            .ok_or_else(|| RepasoError::data_access("remote response lacks a data field"))?;
        Ok(serde_json::from_value(data)?)
    }

    async fn save_audio(&self, asset: &AudioAsset) -> Result<()> {
        // The asset serializes with a base64 payload plus its composite-key
        // metadata, which is exactly the upload body the server expects.
        let response = self
            .client
            .post(format!("{}/audio", self.base_url))
            .json(asset)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Err(Self::map_error(status, Some(&body)))
    }

    async fn clear_all(&self) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/state", self.base_url))
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Err(Self::map_error(status, Some(&body)))
    }

    async fn load_raw(&self, _key: &str) -> Result<Option<Value>> {
        // The remote store postdates both legacy schema generations; no
        // legacy records ever lived there.
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let store = RemoteStore::new("https://repaso.example.com/api/");
        assert_eq!(
            store.document_url("app_state"),
            "https://repaso.example.com/api/state/app_state"
        );
        assert_eq!(
            store.audio_url(Some("sub-1")),
            "https://repaso.example.com/api/audio?subtopic=sub-1"
        );
        assert_eq!(store.audio_url(None), "https://repaso.example.com/api/audio");
    }

    #[test]
    fn test_map_error_uses_server_message() {
        let body = json!({"error": "missing required field subtopicId"});
        let err = RemoteStore::map_error(StatusCode::BAD_REQUEST, Some(&body));
        assert!(err.to_string().contains("missing required field"));

        let err = RemoteStore::map_error(StatusCode::NOT_FOUND, Some(&json!({"error": "app_state"})));
        assert!(err.is_not_found());

        let err = RemoteStore::map_error(StatusCode::INTERNAL_SERVER_ERROR, None);
        assert!(err.to_string().contains("backend failure"));
    }
}

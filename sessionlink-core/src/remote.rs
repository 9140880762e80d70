//! HTTP client for the remote session service.
//!
//! Speaks the service's REST surface under `{base}/api/apps/{app}/users/{user}/sessions`
//! and converts payloads through [`crate::convert`]. Every call is a single
//! attempt; failures propagate to the caller unchanged.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::convert::{event_to_wire, wire_to_session};
use crate::error::StoreError;
use crate::models::{Event, Session};
use crate::session::SessionService;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// RemoteSessionClient
// ============================================================================

pub struct RemoteSessionClient {
    client: Client,
    base_url: Url,
}

impl RemoteSessionClient {
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// `timeout` applies to every request made through this client.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let parsed = Url::parse(base_url.trim())
            .map_err(|e| StoreError::InvalidUrl(format!("{base_url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    /// `{base}/api/apps/{app}/users/{user}/sessions[/...]`, each segment percent-encoded.
    fn sessions_url(&self, app_name: &str, user_id: &str, rest: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "apps", app_name, "users", user_id, "sessions"])
            .extend(rest);
        Ok(url)
    }

    async fn read_json(response: Response) -> Result<Value, StoreError> {
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Turn a rejected response into `StoreError::Api`, keeping the body text.
async fn api_error(response: Response) -> StoreError {
    let code = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    tracing::debug!(code, message = %message, "session service rejected request");
    StoreError::Api { code, message }
}

#[async_trait]
impl SessionService for RemoteSessionClient {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Map<String, Value>,
        session_id: Option<&str>,
    ) -> Result<Session, StoreError> {
        let url = match session_id.filter(|id| !id.is_empty()) {
            Some(id) => self.sessions_url(app_name, user_id, &[id])?,
            None => self.sessions_url(app_name, user_id, &[])?,
        };
        tracing::debug!(url = %url, "creating remote session");

        let response = self
            .client
            .post(url)
            .json(&json!({ "state": state }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(wire_to_session(&Self::read_json(response).await?))
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session, StoreError> {
        let url = self.sessions_url(app_name, user_id, &[session_id])?;
        tracing::debug!(url = %url, "fetching remote session");

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(wire_to_session(&Self::read_json(response).await?))
    }

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let url = self.sessions_url(app_name, user_id, &[])?;
        tracing::debug!(url = %url, "listing remote sessions");

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        match Self::read_json(response).await? {
            Value::Array(items) => Ok(items.iter().map(wire_to_session).collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), StoreError> {
        let url = self.sessions_url(app_name, user_id, &[session_id])?;
        tracing::debug!(url = %url, "deleting remote session");

        let response = self.client.delete(url).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }

    async fn append_event(&self, session: &Session, event: &Event) -> Result<Event, StoreError> {
        if let Some(field) = session.missing_identity() {
            return Err(StoreError::MissingIdentity(field));
        }

        let url = self.sessions_url(&session.app_name, &session.user_id, &[session.id.as_str(), "events"])?;
        tracing::debug!(url = %url, event_id = %event.id, author = %event.author, "appending remote event");

        let response = self
            .client
            .post(url)
            .json(&event_to_wire(event))
            .send()
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(event.clone()),
            _ => Err(api_error(response).await),
        }
    }

    fn name(&self) -> &str {
        "remote"
    }
}

// ============================================================================
// TESTS
// ============================================================================

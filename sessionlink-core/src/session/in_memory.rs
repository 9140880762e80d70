//! In-memory session backend for local development.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::SessionService;
use crate::error::StoreError;
use crate::models::{Event, Session};

type SessionKey = (String, String, String);

/// Process-local session store keyed by `(app_name, user_id, session_id)`.
pub struct InMemorySessionService {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySessionService {
    fn default() -> Self {
        Self::new()
    }
}

fn key(app_name: &str, user_id: &str, session_id: &str) -> SessionKey {
    (
        app_name.to_string(),
        user_id.to_string(),
        session_id.to_string(),
    )
}

fn not_found(app_name: &str, user_id: &str, session_id: &str) -> StoreError {
    StoreError::NotFound {
        app_name: app_name.to_string(),
        user_id: user_id.to_string(),
        session_id: session_id.to_string(),
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Map<String, Value>,
        session_id: Option<&str>,
    ) -> Result<Session, StoreError> {
        let id = match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        let mut sessions = self.sessions.write().await;
        let k = key(app_name, user_id, &id);
        if sessions.contains_key(&k) {
            return Err(StoreError::AlreadyExists {
                app_name: app_name.to_string(),
                user_id: user_id.to_string(),
                session_id: id,
            });
        }

        let session = Session::new(app_name, user_id, id, state);
        sessions.insert(k, session.clone());
        tracing::debug!(app_name, user_id, session_id = %session.id, "created in-memory session");
        Ok(session)
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session, StoreError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&key(app_name, user_id, session_id))
            .cloned()
            .ok_or_else(|| not_found(app_name, user_id, session_id))
    }

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut results: Vec<Session> = sessions
            .values()
            .filter(|s| s.app_name == app_name && s.user_id == user_id)
            .cloned()
            .collect();

        results.sort_by(|a, b| {
            b.last_update_time
                .total_cmp(&a.last_update_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(results)
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&key(app_name, user_id, session_id));
        Ok(())
    }

    async fn append_event(&self, session: &Session, event: &Event) -> Result<Event, StoreError> {
        if let Some(field) = session.missing_identity() {
            return Err(StoreError::MissingIdentity(field));
        }

        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&key(&session.app_name, &session.user_id, &session.id))
            .ok_or_else(|| not_found(&session.app_name, &session.user_id, &session.id))?;
        stored.apply_event(event.clone());
        Ok(event.clone())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

//! Session backend contract shared by the in-memory and remote stores.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::models::{Event, Session};

/// Persistent (or process-local) storage for sessions and their event logs.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session. `session_id` of `None` lets the backend assign one.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Map<String, Value>,
        session_id: Option<&str>,
    ) -> Result<Session, StoreError>;

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session, StoreError>;

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<Session>, StoreError>;

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), StoreError>;

    /// Append `event` to the end of `session`'s log. Returns the stored event.
    async fn append_event(&self, session: &Session, event: &Event) -> Result<Event, StoreError>;

    /// The name of this backend.
    fn name(&self) -> &str;
}

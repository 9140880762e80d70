//! Run Orchestrator: one inbound turn in, the turn's ordered events out.

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use sessionlink_core::{Content, Event, Part, SessionBackend, SessionService};
use std::sync::Arc;

use crate::runner::AgentRunner;

const DEFAULT_ID: &str = "default";

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub new_message: Option<NewMessage>,
}

#[derive(Debug, Deserialize, Default)]
pub struct NewMessage {
    pub parts: Option<Vec<Value>>,
}

/// A turn with its defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub user_id: String,
    pub session_id: String,
    pub content: Content,
}

impl Turn {
    pub fn from_request(req: RunRequest) -> Self {
        let parts = req
            .new_message
            .and_then(|m| m.parts)
            .filter(|p| !p.is_empty())
            .unwrap_or_default();
        Self {
            user_id: req.user_id.unwrap_or_else(|| DEFAULT_ID.to_string()),
            session_id: req.session_id.unwrap_or_else(|| DEFAULT_ID.to_string()),
            content: content_from_parts(&parts),
        }
    }
}

/// User content from inbound parts. Parts without `text` are skipped;
/// no parts at all means a single empty text part.
pub fn content_from_parts(parts: &[Value]) -> Content {
    if parts.is_empty() {
        return Content::user_text("");
    }
    let parts = parts
        .iter()
        .filter_map(|p| p.get("text"))
        .map(|text| Part::text(text.as_str().unwrap_or_default()))
        .collect();
    Content::new("user", parts)
}

pub struct RunOrchestrator {
    backend: SessionBackend,
    runner: Arc<dyn AgentRunner>,
    app_name: String,
}

impl RunOrchestrator {
    pub fn new(backend: SessionBackend, runner: Arc<dyn AgentRunner>, app_name: impl Into<String>) -> Self {
        Self {
            backend,
            runner,
            app_name: app_name.into(),
        }
    }

    pub fn runner_name(&self) -> &str {
        self.runner.name()
    }

    /// Run one turn. With the remote backend the user message is appended
    /// before the runner starts, so the runner sees it in the session log.
    ///
    /// The read-then-append is not guarded: concurrent turns on one session
    /// append in whatever order the store accepts them.
    pub async fn run_turn(&self, turn: Turn) -> anyhow::Result<Vec<Event>> {
        if self.backend.is_remote() {
            let service = self.backend.service();
            let session = service
                .get_session(&self.app_name, &turn.user_id, &turn.session_id)
                .await
                .with_context(|| format!("loading session {} before run", turn.session_id))?;
            let user_event = Event::user_turn(turn.content.clone());
            service
                .append_event(&session, &user_event)
                .await
                .context("pre-appending user message")?;
            tracing::debug!(session_id = %turn.session_id, event_id = %user_event.id, "pre-appended user message");
        }

        let outcome = self
            .runner
            .run(&turn.user_id, &turn.session_id, turn.content)
            .await
            .with_context(|| format!("runner {} failed", self.runner.name()))?;
        outcome.collect().await
    }
}

//! OpenAI-compatible chat-completions run loop.
//!
//! Points at a local endpoint (Ollama, KServe, ...) when `llm.base_url` is set,
//! otherwise at Gemini's OpenAI-compatible surface.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sessionlink_core::config::{AgentConfig, LlmConfig};
use sessionlink_core::models::{new_event_id, now_seconds};
use sessionlink_core::{Content, Event, EventActions, Part, Session, SessionBackend, SessionService};
use std::time::Duration;
use uuid::Uuid;

use super::{AgentRunner, RunOutcome};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const GEMINI_MODEL: &str = "gemini-2.0-flash";
const LOCAL_MODEL: &str = "local";
const LOCAL_API_KEY: &str = "ollama";
/// State key the reply is also written under.
pub const OUTPUT_KEY: &str = "diagram";

// ============================================================================
// Endpoint resolution
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum LlmEndpoint {
    Local { base_url: String, model_name: String },
    Gemini { model: String },
}

impl LlmEndpoint {
    pub fn from_config(config: &LlmConfig) -> Self {
        match config.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => LlmEndpoint::Local {
                base_url: ensure_v1(url),
                model_name: config
                    .model_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .unwrap_or(LOCAL_MODEL)
                    .to_string(),
            },
            _ => LlmEndpoint::Gemini {
                model: GEMINI_MODEL.to_string(),
            },
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            LlmEndpoint::Local { base_url, .. } => base_url,
            LlmEndpoint::Gemini { .. } => GEMINI_BASE_URL,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            LlmEndpoint::Local { model_name, .. } => model_name,
            LlmEndpoint::Gemini { model } => model,
        }
    }

    /// Summary reported by the health endpoint.
    pub fn info(&self) -> Value {
        match self {
            LlmEndpoint::Local {
                base_url,
                model_name,
            } => json!({
                "provider": "local",
                "base_url": base_url,
                "model_name": model_name,
            }),
            LlmEndpoint::Gemini { model } => json!({
                "provider": "gemini",
                "model": model,
            }),
        }
    }
}

/// Append `/v1` unless the URL already ends in it.
pub fn ensure_v1(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
}

#[derive(Debug, Serialize, PartialEq)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// ChatRunner
// ============================================================================

pub struct ChatRunner {
    client: Client,
    endpoint: LlmEndpoint,
    api_key: Option<String>,
    temperature: f64,
    backend: SessionBackend,
    agent: AgentConfig,
}

impl ChatRunner {
    pub fn new(
        llm: &LlmConfig,
        agent: &AgentConfig,
        backend: SessionBackend,
    ) -> anyhow::Result<Self> {
        let endpoint = LlmEndpoint::from_config(llm);
        let api_key = match &endpoint {
            LlmEndpoint::Local { .. } => {
                Some(llm.api_key.clone().unwrap_or_else(|| LOCAL_API_KEY.to_string()))
            }
            LlmEndpoint::Gemini { .. } => llm.api_key.clone(),
        };
        if api_key.is_none() {
            tracing::warn!("no API key configured for the Gemini endpoint; runs will fail");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(llm.timeout_seconds))
            .build()
            .context("building LLM HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            temperature: llm.temperature,
            backend,
            agent: agent.clone(),
        })
    }

    pub fn llm_info(&self) -> Value {
        self.endpoint.info()
    }

    async fn load_or_create(&self, user_id: &str, session_id: &str) -> anyhow::Result<Session> {
        let service = self.backend.service();
        match service
            .get_session(&self.agent.app_name, user_id, session_id)
            .await
        {
            Ok(session) => Ok(session),
            Err(e) if e.is_not_found() => {
                tracing::info!(user_id, session_id, "session not found, creating it");
                service
                    .create_session(&self.agent.app_name, user_id, Map::new(), Some(session_id))
                    .await
                    .with_context(|| format!("creating session {session_id}"))
            }
            Err(e) => Err(anyhow::Error::new(e).context(format!("loading session {session_id}"))),
        }
    }

    fn messages(&self, session: &Session) -> Vec<Message> {
        let mut messages = vec![Message {
            role: "system".to_string(),
            content: self.agent.instruction.clone(),
        }];
        messages.extend(session.events.iter().filter_map(|event| {
            let text = event.text();
            if text.is_empty() {
                return None;
            }
            let role = if event.is_user() { "user" } else { "assistant" };
            Some(Message {
                role: role.to_string(),
                content: text,
            })
        }));
        messages
    }

    async fn complete(&self, messages: Vec<Message>) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.endpoint.base_url());
        let request = ChatRequest {
            model: self.endpoint.model().to_string(),
            messages,
            temperature: self.temperature,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        let response = builder.send().await.context("calling chat completions")?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            anyhow::bail!("chat completions error ({status}): {error}");
        }

        let chat: ApiChatResponse = response
            .json()
            .await
            .context("decoding chat completions response")?;
        Ok(chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl AgentRunner for ChatRunner {
    async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        new_message: Content,
    ) -> anyhow::Result<RunOutcome> {
        let service = self.backend.service();
        let mut session = self.load_or_create(user_id, session_id).await?;

        let already_logged = session
            .events
            .last()
            .is_some_and(|e| e.is_user() && e.content.as_ref() == Some(&new_message));
        if !already_logged {
            let user_event = service
                .append_event(&session, &Event::user_turn(new_message))
                .await
                .context("appending user turn")?;
            session.events.push(user_event);
        }

        let reply = self.complete(self.messages(&session)).await?;
        tracing::debug!(session_id, chars = reply.len(), "model replied");

        let mut actions = EventActions::default();
        actions
            .state_delta
            .insert(OUTPUT_KEY.to_string(), Value::from(reply.clone()));
        let event = Event {
            id: new_event_id(),
            timestamp: now_seconds(),
            invocation_id: format!("e-{}", Uuid::new_v4()),
            author: self.agent.name.clone(),
            content: Some(Content::new("model", vec![Part::text(reply)])),
            actions,
            turn_complete: true,
            ..Event::default()
        };
        let stored = service
            .append_event(&session, &event)
            .await
            .context("appending model reply")?;

        Ok(RunOutcome::Ready(vec![stored]))
    }

    fn name(&self) -> &str {
        &self.agent.name
    }
}

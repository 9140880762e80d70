//! sessionlink-cli - terminal client for a SessionLink agent server
//!
//! Does from a shell what the browser UI does: runs turns, manages sessions
//! and names them.
//!
//! # Subcommands
//! - `run <text> [--session <id>] [--json]` - run one turn, print the model reply
//! - `sessions list|create|show|delete`      - session CRUD
//! - `title <id> <title>`                    - set a session's title
//! - `status`                                - show server health

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";
const DEFAULT_APP: &str = "diagram_agent";
const DEFAULT_USER: &str = "cli-user";
const TITLE_MAX_CHARS: usize = 25;
const SUMMARY_MAX_CHARS: usize = 28;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "sessionlink-cli",
    version,
    about = "SessionLink - run agent turns and manage sessions from the terminal"
)]
struct Cli {
    /// Agent server URL (overrides SESSIONLINK_SERVER env var)
    #[arg(long, env = "SESSIONLINK_SERVER", default_value = DEFAULT_SERVER)]
    server: String,

    /// Session API URL; defaults to the agent server
    #[arg(long, env = "SESSIONLINK_SESSION_SERVER")]
    session_server: Option<String>,

    /// User id sent with every request
    #[arg(long, env = "SESSIONLINK_USER", default_value = DEFAULT_USER)]
    user: String,

    /// Application name
    #[arg(long, default_value = DEFAULT_APP)]
    app: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one turn and print the model's reply
    Run {
        /// Message text
        text: String,

        /// Session to run in
        #[arg(long, default_value = "default")]
        session: String,

        /// Print the raw event array instead of the reply text
        #[arg(long)]
        json: bool,
    },

    /// Manage sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Set a session's title
    Title {
        /// Session id
        id: String,
        /// New title (truncated to 25 characters)
        title: String,
    },

    /// Show agent server status
    Status,
}

#[derive(Debug, Subcommand)]
enum SessionAction {
    /// List sessions, newest first
    List,
    /// Create a session
    Create {
        /// Caller-chosen id; the server assigns one when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// Show one session as JSON
    Show { id: String },
    /// Delete a session
    Delete { id: String },
}

// ============================================================================
// API Response Types
// ============================================================================

/// Session as returned by the session API.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSummary {
    pub id: String,
    pub last_update_time: f64,
    pub state: Value,
    pub events: Option<Vec<Value>>,
}

// ============================================================================
// Formatting
// ============================================================================

/// Concatenated text of an event's content parts.
pub fn event_text(event: &Value) -> String {
    event["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default()
}

/// Text of every non-user event, in order.
pub fn model_text(events: &[Value]) -> String {
    events
        .iter()
        .filter(|e| !e["author"].as_str().unwrap_or("").eq_ignore_ascii_case("user"))
        .map(event_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// First user message, shortened for a list label.
pub fn first_user_summary(events: &[Value]) -> Option<String> {
    events
        .iter()
        .filter(|e| e["author"].as_str().unwrap_or("").eq_ignore_ascii_case("user"))
        .map(|e| event_text(e).trim().to_string())
        .find(|t| !t.is_empty())
        .map(|text| {
            if text.chars().count() <= SUMMARY_MAX_CHARS {
                text
            } else {
                let cut: String = text.chars().take(SUMMARY_MAX_CHARS).collect();
                format!("{cut}…")
            }
        })
}

/// List label: state title, else first user message, else a numbered fallback.
pub fn session_label(session: &SessionSummary, number: usize) -> String {
    if let Some(title) = session.state["title"].as_str().filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    first_user_summary(session.events.as_deref().unwrap_or_default())
        .unwrap_or_else(|| format!("Diagram {number}"))
}

/// Append-event body carrying only a title state change.
pub fn title_event(title: &str, now: Duration) -> Value {
    let title: String = title.trim().chars().take(TITLE_MAX_CHARS).collect();
    json!({
        "id": format!("{:x}", now.as_nanos()),
        "time": now.as_secs(),
        "author": "user",
        "actions": { "stateDelta": { "title": title } },
    })
}

fn sessions_url(base: &str, app: &str, user: &str) -> String {
    format!("{base}/api/apps/{app}/users/{user}/sessions")
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

struct Api {
    client: reqwest::blocking::Client,
    server: String,
    session_server: String,
    app: String,
    user: String,
}

impl Api {
    fn new(cli: &Cli) -> anyhow::Result<Self> {
        let server = cli.server.trim_end_matches('/').to_string();
        let session_server = cli
            .session_server
            .as_deref()
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| server.clone());
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            server,
            session_server,
            app: cli.app.clone(),
            user: cli.user.clone(),
        })
    }

    fn sessions(&self) -> String {
        sessions_url(&self.session_server, &self.app, &self.user)
    }

    /// Send and return the body, failing on a non-success status.
    fn send(&self, req: reqwest::blocking::RequestBuilder, what: &str) -> anyhow::Result<String> {
        let resp = req.send().with_context(|| format!("{what}: connection failed"))?;
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("{what}: server returned {status}: {body}");
        }
        Ok(body)
    }

    fn run(&self, text: &str, session: &str, json_output: bool) -> anyhow::Result<()> {
        let body = json!({
            "appName": self.app,
            "userId": self.user,
            "sessionId": session,
            "newMessage": { "role": "user", "parts": [{ "text": text }] },
        });
        let url = format!("{}/api/run", self.server);
        let raw = self.send(self.client.post(&url).json(&body), "run")?;
        let events: Vec<Value> = serde_json::from_str(&raw).context("run: response is not an event array")?;

        if json_output {
            println!("{}", serde_json::to_string_pretty(&events)?);
        } else {
            let reply = model_text(&events);
            if reply.is_empty() {
                eprintln!("(no reply)");
            } else {
                println!("{reply}");
            }
        }
        Ok(())
    }

    fn list(&self) -> anyhow::Result<()> {
        let raw = self.send(self.client.get(self.sessions()), "list sessions")?;
        let mut sessions: Vec<SessionSummary> = serde_json::from_str(&raw).unwrap_or_default();
        sessions.sort_by(|a, b| b.last_update_time.total_cmp(&a.last_update_time));

        if sessions.is_empty() {
            eprintln!("No sessions for {}", self.user);
            return Ok(());
        }
        let total = sessions.len();
        for (i, s) in sessions.iter().enumerate() {
            println!("{}  {}", s.id, session_label(s, total - i));
        }
        Ok(())
    }

    fn create(&self, id: Option<&str>) -> anyhow::Result<()> {
        let url = match id {
            Some(id) => format!("{}/{}", self.sessions(), id),
            None => self.sessions(),
        };
        let raw = self.send(
            self.client.post(&url).json(&json!({ "state": {}, "events": [] })),
            "create session",
        )?;
        let session: SessionSummary = serde_json::from_str(&raw).context("create session: bad response")?;
        println!("{}", session.id);
        Ok(())
    }

    fn show(&self, id: &str) -> anyhow::Result<()> {
        let url = format!("{}/{}", self.sessions(), id);
        let raw = self.send(self.client.get(&url), "show session")?;
        let value: Value = serde_json::from_str(&raw).context("show session: bad response")?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        Ok(())
    }

    fn delete(&self, id: &str) -> anyhow::Result<()> {
        let url = format!("{}/{}", self.sessions(), id);
        self.send(self.client.delete(&url), "delete session")?;
        println!("Deleted {id}");
        Ok(())
    }

    fn title(&self, id: &str, title: &str) -> anyhow::Result<()> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let url = format!("{}/{}/events", self.sessions(), id);
        self.send(self.client.post(&url).json(&title_event(title, now)), "set title")?;
        Ok(())
    }

    fn status(&self) -> anyhow::Result<()> {
        let url = format!("{}/health", self.server);
        let raw = self.send(self.client.get(&url), "status")?;
        let body: Value = serde_json::from_str(&raw).unwrap_or_default();
        println!("Agent server: {}", body["status"].as_str().unwrap_or("unknown"));
        match body["llm"]["provider"].as_str() {
            Some("local") => println!(
                "LLM:          local {} at {}",
                body["llm"]["model_name"].as_str().unwrap_or("?"),
                body["llm"]["base_url"].as_str().unwrap_or("?")
            ),
            Some(provider) => println!(
                "LLM:          {} {}",
                provider,
                body["llm"]["model"].as_str().unwrap_or("?")
            ),
            None => println!("LLM:          ?"),
        }
        Ok(())
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let result = Api::new(&cli).and_then(|api| match &cli.command {
        Commands::Run {
            text,
            session,
            json,
        } => api.run(text, session, *json),
        Commands::Sessions { action } => match action {
            SessionAction::List => api.list(),
            SessionAction::Create { id } => api.create(id.as_deref()),
            SessionAction::Show { id } => api.show(id),
            SessionAction::Delete { id } => api.delete(id),
        },
        Commands::Title { id, title } => api.title(id, title),
        Commands::Status => api.status(),
    });

    if let Err(e) = result {
        eprintln!("sessionlink-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn event(author: &str, text: &str) -> Value {
        json!({"author": author, "content": {"role": "x", "parts": [{"text": text}]}})
    }

    // ========================================================================
    // TEST 1: model_text skips user events and joins the rest
    // ========================================================================
    #[test]
    fn test_model_text() {
        let events = vec![
            event("user", "draw it"),
            event("diagram_agent", "graph TD"),
            event("diagram_agent", "A --> B"),
        ];
        assert_eq!(model_text(&events), "graph TD\nA --> B");
        assert_eq!(model_text(&[]), "");
    }

    // ========================================================================
    // TEST 2: event_text tolerates missing content and non-text parts
    // ========================================================================
    #[test]
    fn test_event_text_tolerant() {
        assert_eq!(event_text(&json!({"author": "x"})), "");
        let mixed = json!({"content": {"parts": [{"inlineData": {}}, {"text": "a"}, {"text": "b"}]}});
        assert_eq!(event_text(&mixed), "ab");
    }

    // ========================================================================
    // TEST 3: label prefers the state title
    // ========================================================================
    #[test]
    fn test_session_label_prefers_title() {
        let session = SessionSummary {
            id: "s1".to_string(),
            state: json!({"title": "Login flow"}),
            events: Some(vec![event("user", "something else")]),
            ..SessionSummary::default()
        };
        assert_eq!(session_label(&session, 1), "Login flow");
    }

    // ========================================================================
    // TEST 4: label falls back to a shortened first user message
    // ========================================================================
    #[test]
    fn test_session_label_uses_first_user_message() {
        let long = "x".repeat(40);
        let session = SessionSummary {
            events: Some(vec![event("diagram_agent", "hi"), event("user", &long)]),
            ..SessionSummary::default()
        };
        let label = session_label(&session, 1);
        assert_eq!(label, format!("{}…", "x".repeat(28)));
    }

    // ========================================================================
    // TEST 5: label falls back to a number when there is nothing else
    // ========================================================================
    #[test]
    fn test_session_label_numbered_fallback() {
        let session = SessionSummary::default();
        assert_eq!(session_label(&session, 3), "Diagram 3");
    }

    // ========================================================================
    // TEST 6: session summaries tolerate null events from the store
    // ========================================================================
    #[test]
    fn test_session_summary_parses_null_events() {
        let s: SessionSummary = serde_json::from_value(json!({
            "id": "s1", "appName": "diagram_agent", "userId": "u",
            "lastUpdateTime": 1.5, "state": {}, "events": null
        }))
        .unwrap();
        assert_eq!(s.id, "s1");
        assert_eq!(s.last_update_time, 1.5);
        assert!(s.events.is_none());
    }

    // ========================================================================
    // TEST 7: title event carries only a state delta, truncated
    // ========================================================================
    #[test]
    fn test_title_event_shape() {
        let body = title_event("  A very long diagram title that keeps going  ", Duration::from_secs(1_700_000_000));
        assert_eq!(body["time"], 1_700_000_000_u64);
        assert_eq!(body["author"], "user");
        let title = body["actions"]["stateDelta"]["title"].as_str().unwrap();
        assert_eq!(title.chars().count(), 25);
        assert!(title.starts_with("A very long"));
        assert!(body["id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    // ========================================================================
    // TEST 8: session URLs live under /api
    // ========================================================================
    #[test]
    fn test_sessions_url() {
        assert_eq!(
            sessions_url("http://localhost:8081", "diagram_agent", "u1"),
            "http://localhost:8081/api/apps/diagram_agent/users/u1/sessions"
        );
    }
}

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Author name for events carrying the end user's message.
pub const USER_AUTHOR: &str = "user";

/// Structured message payload: a role plus an ordered list of parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One part of a message. Keys other than `text` are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            extra: Map::new(),
        }
    }
}

impl Content {
    pub fn new(role: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            role: Some(role.into()),
            parts,
        }
    }

    /// Single text part authored by the user.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(USER_AUTHOR, vec![Part::text(text)])
    }

    /// Concatenated text of every part that carries text.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

/// State and artifact mutations carried by an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventActions {
    #[serde(default)]
    pub state_delta: Map<String, Value>,
    #[serde(default)]
    pub artifact_delta: Map<String, Value>,
}

impl EventActions {
    pub fn is_empty(&self) -> bool {
        self.state_delta.is_empty() && self.artifact_delta.is_empty()
    }
}

/// One immutable turn artifact in a session's ordered log.
///
/// The serde form is the canonical camelCase dump returned by the run endpoint.
/// `timestamp` is seconds since the Unix epoch with sub-second precision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Event {
    pub id: String,
    pub timestamp: f64,
    pub invocation_id: String,
    pub branch: String,
    pub author: String,
    pub content: Option<Content>,
    pub actions: EventActions,
    pub partial: bool,
    pub turn_complete: bool,
    pub interrupted: bool,
    pub long_running_tool_ids: Vec<String>,
    pub error_code: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<Value>,
}

impl Event {
    /// A user-authored event wrapping `content`: fresh id, current time,
    /// empty actions, every flag false.
    pub fn user_turn(content: Content) -> Self {
        Self {
            id: new_event_id(),
            timestamp: now_seconds(),
            author: USER_AUTHOR.to_string(),
            content: Some(content),
            ..Self::default()
        }
    }

    pub fn is_user(&self) -> bool {
        self.author == USER_AUTHOR
    }

    /// Text of the event's content, empty when there is none.
    pub fn text(&self) -> String {
        self.content.as_ref().map(Content::text).unwrap_or_default()
    }
}

/// Short random event id (12 hex chars).
pub fn new_event_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Current wall-clock time in fractional seconds since the epoch.
pub fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

//! Representation converter between the in-process session model and the
//! session service's REST JSON.
//!
//! Everything here is pure: no I/O, no shared state. The wire side is camelCase
//! and carries event time as integer seconds in `time`. Inbound payloads are
//! treated as untrusted: unreadable events are dropped, a non-map `state`
//! becomes `{}`, and session construction degrades through an ordered chain of
//! constructors instead of failing the read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

use crate::models::{Event, EventActions, Session};

/// Epoch values above this are milliseconds.
pub const MILLIS_THRESHOLD: f64 = 1e12;

// ============================================================================
// Wire types
// ============================================================================

/// REST JSON shape of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSession {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    pub last_update_time: f64,
    pub events: Vec<Value>,
    pub state: Map<String, Value>,
}

/// REST JSON shape of an event, field for field what the session service decodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    pub id: String,
    pub time: i64,
    pub invocation_id: String,
    pub branch: String,
    pub author: String,
    pub partial: bool,
    pub long_running_tool_ids: Vec<String>,
    pub content: Option<Value>,
    pub grounding_metadata: Option<Value>,
    pub turn_complete: bool,
    pub interrupted: bool,
    pub error_code: String,
    pub error_message: String,
    pub actions: WireActions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireActions {
    pub state_delta: Map<String, Value>,
    pub artifact_delta: Map<String, Value>,
}

/// Reasons a session constructor rejects a payload.
#[derive(Error, Debug, PartialEq)]
pub enum ConvertError {
    #[error("{0} must be a string")]
    NotAString(&'static str),

    #[error("{0} must be a scalar")]
    NotScalar(&'static str),
}

// ============================================================================
// Boundary unions
// ============================================================================

/// An event time as callers hand it over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventTime {
    Seconds(f64),
    DateTime(DateTime<Utc>),
    Missing,
}

impl EventTime {
    /// Whole seconds since the epoch; 0 when missing.
    pub fn epoch_seconds(&self) -> i64 {
        match self {
            EventTime::Seconds(s) => *s as i64,
            EventTime::DateTime(dt) => dt.timestamp(),
            EventTime::Missing => 0,
        }
    }
}

impl From<f64> for EventTime {
    fn from(seconds: f64) -> Self {
        EventTime::Seconds(seconds)
    }
}

impl From<DateTime<Utc>> for EventTime {
    fn from(dt: DateTime<Utc>) -> Self {
        EventTime::DateTime(dt)
    }
}

impl<T: Into<EventTime>> From<Option<T>> for EventTime {
    fn from(value: Option<T>) -> Self {
        value.map_or(EventTime::Missing, Into::into)
    }
}

/// `actions` as it arrives: an already-typed record, a loose JSON map, or nothing.
///
/// Converted once into [`EventActions`]; nothing downstream looks at the shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionsShape {
    Record(EventActions),
    Mapping(Map<String, Value>),
    Absent,
}

impl ActionsShape {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Object(map)) => ActionsShape::Mapping(map.clone()),
            _ => ActionsShape::Absent,
        }
    }
}

impl From<ActionsShape> for EventActions {
    fn from(shape: ActionsShape) -> Self {
        match shape {
            ActionsShape::Record(actions) => actions,
            ActionsShape::Mapping(map) => EventActions {
                state_delta: delta(&map, "state_delta", "stateDelta"),
                artifact_delta: delta(&map, "artifact_delta", "artifactDelta"),
            },
            ActionsShape::Absent => EventActions::default(),
        }
    }
}

/// First non-empty map under either spelling of a delta key.
fn delta(map: &Map<String, Value>, snake: &str, camel: &str) -> Map<String, Value> {
    [snake, camel]
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_object))
        .find(|m| !m.is_empty())
        .cloned()
        .unwrap_or_default()
}

// ============================================================================
// Sessions
// ============================================================================

/// Read access to the fields of something session-shaped.
///
/// Implemented for the typed [`Session`] and for a loose JSON map with either
/// snake_case or camelCase keys.
pub trait SessionView {
    fn session_id(&self) -> String;
    fn session_app_name(&self) -> String;
    fn session_user_id(&self) -> String;
    fn session_last_update_time(&self) -> f64;
    fn session_state(&self) -> Map<String, Value>;
    fn session_events(&self) -> Vec<Value>;
}

impl SessionView for Session {
    fn session_id(&self) -> String {
        self.id.clone()
    }

    fn session_app_name(&self) -> String {
        self.app_name.clone()
    }

    fn session_user_id(&self) -> String {
        self.user_id.clone()
    }

    fn session_last_update_time(&self) -> f64 {
        self.last_update_time
    }

    fn session_state(&self) -> Map<String, Value> {
        self.state.clone()
    }

    fn session_events(&self) -> Vec<Value> {
        self.events
            .iter()
            .map(|e| serde_json::to_value(event_to_wire(e)).unwrap_or(Value::Null))
            .collect()
    }
}

impl SessionView for Map<String, Value> {
    fn session_id(&self) -> String {
        self.get("id").map(lossy_string).unwrap_or_default()
    }

    fn session_app_name(&self) -> String {
        either(self, "app_name", "appName").map(lossy_string).unwrap_or_default()
    }

    fn session_user_id(&self) -> String {
        either(self, "user_id", "userId").map(lossy_string).unwrap_or_default()
    }

    fn session_last_update_time(&self) -> f64 {
        either(self, "last_update_time", "lastUpdateTime")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    fn session_state(&self) -> Map<String, Value> {
        self.get("state")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    fn session_events(&self) -> Vec<Value> {
        self.get("events")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

fn either<'a>(map: &'a Map<String, Value>, snake: &str, camel: &str) -> Option<&'a Value> {
    map.get(snake).or_else(|| map.get(camel))
}

/// Render a session in wire casing. State and events pass through as-is.
pub fn session_to_wire<S: SessionView + ?Sized>(session: &S) -> WireSession {
    WireSession {
        id: session.session_id(),
        app_name: session.session_app_name(),
        user_id: session.session_user_id(),
        last_update_time: session.session_last_update_time(),
        events: session.session_events(),
        state: session.session_state(),
    }
}

/// Seconds since the epoch, dividing down values that are clearly milliseconds.
pub fn normalize_epoch_seconds(value: f64) -> f64 {
    if value > MILLIS_THRESHOLD {
        value / 1000.0
    } else {
        value
    }
}

/// Fields pulled out of a wire session before any constructor runs.
#[derive(Debug, Clone)]
struct SessionDraft {
    id: Value,
    app_name: Value,
    user_id: Value,
    last_update_time: f64,
    state: Map<String, Value>,
    events: Vec<Event>,
}

type Constructor = fn(&SessionDraft) -> Result<Session, ConvertError>;

/// Tried in order; the first success wins.
const CONSTRUCTORS: [(&str, Constructor); 3] = [
    ("strict", strict_session),
    ("validating", validating_session),
    ("eventless", eventless_session),
];

/// Convert a wire session into a [`Session`]. Never fails.
pub fn wire_to_session(data: &Value) -> Session {
    let empty = Map::new();
    let obj = data.as_object().unwrap_or(&empty);
    let field = |key: &str| obj.get(key).cloned().unwrap_or(Value::Null);

    let events = match obj.get("events") {
        Some(Value::Array(raw)) => convert_events(raw),
        _ => Vec::new(),
    };

    let draft = SessionDraft {
        id: field("id"),
        app_name: field("appName"),
        user_id: field("userId"),
        last_update_time: obj
            .get("lastUpdateTime")
            .and_then(Value::as_f64)
            .map(normalize_epoch_seconds)
            .unwrap_or(0.0),
        state: obj
            .get("state")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        events,
    };

    for (name, construct) in CONSTRUCTORS {
        match construct(&draft) {
            Ok(session) => return session,
            Err(e) => tracing::debug!(constructor = name, error = %e, "session constructor rejected payload"),
        }
    }
    placeholder_session(draft)
}

/// Convert each wire event, dropping unreadable ones and any repeat of a
/// non-empty id already seen. Survivors keep their order.
fn convert_events(raw: &[Value]) -> Vec<Event> {
    let mut seen = HashSet::new();
    raw.iter()
        .enumerate()
        .filter_map(|(index, ev)| {
            let Some(event) = wire_to_event(ev) else {
                tracing::warn!(index, "dropping unreadable event from session payload");
                return None;
            };
            if !event.id.is_empty() && !seen.insert(event.id.clone()) {
                tracing::warn!(index, event_id = %event.id, "dropping repeated event from session payload");
                return None;
            }
            Some(event)
        })
        .collect()
}

fn strict_session(draft: &SessionDraft) -> Result<Session, ConvertError> {
    let text = |value: &Value, name: &'static str| {
        value
            .as_str()
            .map(str::to_string)
            .ok_or(ConvertError::NotAString(name))
    };
    Ok(Session {
        id: text(&draft.id, "id")?,
        app_name: text(&draft.app_name, "appName")?,
        user_id: text(&draft.user_id, "userId")?,
        last_update_time: draft.last_update_time,
        state: draft.state.clone(),
        events: draft.events.clone(),
    })
}

fn validating_session(draft: &SessionDraft) -> Result<Session, ConvertError> {
    Ok(Session {
        events: draft.events.clone(),
        ..coerced_identity(draft)?
    })
}

fn eventless_session(draft: &SessionDraft) -> Result<Session, ConvertError> {
    coerced_identity(draft)
}

/// Built from the five structural fields with no validation at all.
fn placeholder_session(draft: SessionDraft) -> Session {
    Session {
        id: lossy_string(&draft.id),
        app_name: lossy_string(&draft.app_name),
        user_id: lossy_string(&draft.user_id),
        last_update_time: draft.last_update_time,
        state: draft.state,
        events: Vec::new(),
    }
}

/// Identity and state with scalars coerced to strings; no events.
fn coerced_identity(draft: &SessionDraft) -> Result<Session, ConvertError> {
    Ok(Session {
        id: scalar_string(&draft.id, "id")?,
        app_name: scalar_string(&draft.app_name, "appName")?,
        user_id: scalar_string(&draft.user_id, "userId")?,
        last_update_time: draft.last_update_time,
        state: draft.state.clone(),
        events: Vec::new(),
    })
}

fn scalar_string(value: &Value, name: &'static str) -> Result<String, ConvertError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Array(_) | Value::Object(_) => Err(ConvertError::NotScalar(name)),
    }
}

fn lossy_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// Events
// ============================================================================

/// Wire keys copied straight onto the event when present and non-null.
const PASSTHROUGH_FIELDS: [&str; 12] = [
    "id",
    "invocationId",
    "branch",
    "author",
    "partial",
    "turnComplete",
    "interrupted",
    "content",
    "longRunningToolIds",
    "errorCode",
    "errorMessage",
    "groundingMetadata",
];

/// Convert one wire event. `None` when the payload is not an object, carries
/// none of the known fields, or does not fit the typed [`Event`].
pub fn wire_to_event(data: &Value) -> Option<Event> {
    let obj = data.as_object()?;

    let recognised = PASSTHROUGH_FIELDS
        .iter()
        .chain(["time", "timestamp", "actions"].iter())
        .any(|key| obj.contains_key(*key));
    if !recognised {
        return None;
    }

    let mut normalized = Map::new();
    for key in PASSTHROUGH_FIELDS {
        match obj.get(key) {
            None | Some(Value::Null) => {}
            Some(value) => {
                normalized.insert(key.to_string(), value.clone());
            }
        }
    }

    match obj.get("time").or_else(|| obj.get("timestamp")) {
        None | Some(Value::Null) => {}
        Some(Value::Number(n)) => {
            let seconds = n.as_f64().map(normalize_epoch_seconds).unwrap_or(0.0);
            normalized.insert("timestamp".to_string(), Value::from(seconds));
        }
        Some(other) => {
            normalized.insert("timestamp".to_string(), other.clone());
        }
    }

    let mut event: Event = match serde_json::from_value(Value::Object(normalized)) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, "wire event does not fit the event type");
            return None;
        }
    };
    event.actions = ActionsShape::from_value(obj.get("actions")).into();
    Some(event)
}

/// Convert an event into the body of an append call.
pub fn event_to_wire(event: &Event) -> WireEvent {
    let actions = EventActions::from(ActionsShape::Record(event.actions.clone()));
    WireEvent {
        id: event.id.clone(),
        time: EventTime::from(event.timestamp).epoch_seconds(),
        invocation_id: event.invocation_id.clone(),
        branch: event.branch.clone(),
        author: event.author.clone(),
        partial: event.partial,
        long_running_tool_ids: event.long_running_tool_ids.clone(),
        content: event.content.as_ref().map(to_json),
        grounding_metadata: event.grounding_metadata.clone(),
        turn_complete: event.turn_complete,
        interrupted: event.interrupted,
        error_code: event.error_code.clone(),
        error_message: event.error_message.clone(),
        actions: WireActions {
            state_delta: actions.state_delta,
            artifact_delta: actions.artifact_delta,
        },
    }
}

/// Canonical JSON form of a structured payload.
fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ============================================================================
// TESTS
// ============================================================================

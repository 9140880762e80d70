use serde_json::{Map, Value};

use super::event::{now_seconds, Event};

/// A conversation record keyed by `(app_name, user_id, id)`.
///
/// `events` is append-only: entries are never reordered or edited in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    /// Seconds since the epoch.
    pub last_update_time: f64,
    pub state: Map<String, Value>,
    pub events: Vec<Event>,
}

impl Session {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        id: impl Into<String>,
        state: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            last_update_time: now_seconds(),
            state,
            events: Vec::new(),
        }
    }

    /// First identity field that is empty, if any.
    pub fn missing_identity(&self) -> Option<&'static str> {
        if self.app_name.is_empty() {
            Some("app_name")
        } else if self.user_id.is_empty() {
            Some("user_id")
        } else if self.id.is_empty() {
            Some("id")
        } else {
            None
        }
    }

    /// Append `event`, folding its state delta into `state`.
    pub fn apply_event(&mut self, event: Event) {
        for (key, value) in &event.actions.state_delta {
            self.state.insert(key.clone(), value.clone());
        }
        if event.timestamp > self.last_update_time {
            self.last_update_time = event.timestamp;
        }
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Content;

    fn event_with_id(id: &str) -> Event {
        Event {
            id: id.to_string(),
            ..Event::default()
        }
    }

    #[test]
    fn test_missing_identity_reports_first_empty_field() {
        let mut session = Session::new("app", "", "s1", Map::new());
        assert_eq!(session.missing_identity(), Some("user_id"));

        session.user_id = "u".to_string();
        assert_eq!(session.missing_identity(), None);
    }

    #[test]
    fn test_apply_event_folds_state_and_time() {
        let mut session = Session::new("app", "u", "s1", Map::new());
        session.last_update_time = 100.0;

        let mut event = Event::user_turn(Content::user_text("hi"));
        event.timestamp = 200.5;
        event
            .actions
            .state_delta
            .insert("title".to_string(), Value::from("Flowchart"));
        session.apply_event(event);

        assert_eq!(session.state["title"], "Flowchart");
        assert_eq!(session.last_update_time, 200.5);
        assert_eq!(session.events.len(), 1);

        let mut older = event_with_id("late");
        older.timestamp = 50.0;
        session.apply_event(older);
        assert_eq!(session.last_update_time, 200.5, "time never moves backwards");
    }
}

use crate::event::Event;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

// State scope prefixes. `app:` and `user:` keys outlive the session;
// `temp:` keys are dropped at append time and never persisted.
pub const KEY_PREFIX_APP: &str = "app:";
pub const KEY_PREFIX_USER: &str = "user:";
pub const KEY_PREFIX_TEMP: &str = "temp:";

pub type StateMap = HashMap<String, Value>;

struct SessionInner {
    events: Vec<Event>,
    state: StateMap,
    updated_at: DateTime<Utc>,
}

/// An append-only event log plus the state materialized from it.
///
/// The session is shared between the session service, the runner, and the
/// in-flight invocation context; interior locking keeps one store that all
/// of them observe. State is mutated only by [`Session::append_event`]
/// folding an event's `state_delta` — there is no direct write path, so
/// replaying the log from empty state reproduces the live state.
pub struct Session {
    app_name: String,
    user_id: String,
    id: String,
    inner: RwLock<SessionInner>,
}

impl Session {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self::with_state(app_name, user_id, id, StateMap::new())
    }

    pub fn with_state(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        id: impl Into<String>,
        state: StateMap,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            id: id.into(),
            inner: RwLock::new(SessionInner {
                events: Vec::new(),
                state,
                updated_at: Utc::now(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state_get(&self, key: &str) -> Option<Value> {
        self.inner.read().unwrap().state.get(key).cloned()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> StateMap {
        self.inner.read().unwrap().state.clone()
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<Event> {
        self.inner.read().unwrap().events.clone()
    }

    pub fn event_count(&self) -> usize {
        self.inner.read().unwrap().events.len()
    }

    pub fn last_update_time(&self) -> DateTime<Utc> {
        self.inner.read().unwrap().updated_at
    }

    /// Append an event and fold its state delta.
    ///
    /// Partial events are skipped entirely: their content is not
    /// authoritative and their deltas must not be observed twice once the
    /// merged non-partial event arrives.
    pub fn append_event(&self, event: &Event) {
        if event.is_partial() {
            return;
        }
        let mut inner = self.inner.write().unwrap();
        Self::fold_delta(&mut inner.state, &event.actions.state_delta);
        inner.events.push(event.clone());
        inner.updated_at = event.timestamp;
    }

    /// Fold one state delta into a state map, dropping `temp:` keys.
    pub fn fold_delta(state: &mut StateMap, delta: &StateMap) {
        for (key, value) in delta {
            if key.starts_with(KEY_PREFIX_TEMP) {
                continue;
            }
            state.insert(key.clone(), value.clone());
        }
    }

    /// Reconstruct state by folding the deltas of an event log in order.
    /// Replay of a session's own log yields its live state.
    pub fn replay_state(events: &[Event]) -> StateMap {
        let mut state = StateMap::new();
        for event in events {
            if event.is_partial() {
                continue;
            }
            Self::fold_delta(&mut state, &event.actions.state_delta);
        }
        state
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("app_name", &self.app_name)
            .field("user_id", &self.user_id)
            .field("id", &self.id)
            .field("events", &self.event_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Content;
    use serde_json::json;

    fn delta_event(key: &str, value: Value) -> Event {
        let mut event = Event::new("inv-1", "agent");
        event.actions.state_delta.insert(key.to_string(), value);
        event
    }

    #[test]
    fn test_append_folds_delta() {
        let session = Session::new("app", "user", "s1");
        session.append_event(&delta_event("count", json!(1)));
        session.append_event(&delta_event("count", json!(2)));
        assert_eq!(session.state_get("count"), Some(json!(2)));
        assert_eq!(session.event_count(), 2);
    }

    #[test]
    fn test_append_skips_partial_events() {
        let session = Session::new("app", "user", "s1");
        let mut partial = delta_event("k", json!("x"));
        partial.llm_response = crate::LlmResponse::partial(Content::new("model").with_text("x"));
        session.append_event(&partial);
        assert_eq!(session.event_count(), 0);
        assert_eq!(session.state_get("k"), None);
    }

    #[test]
    fn test_temp_keys_dropped() {
        let session = Session::new("app", "user", "s1");
        session.append_event(&delta_event("temp:scratch", json!(42)));
        assert_eq!(session.state_get("temp:scratch"), None);
    }

    #[test]
    fn test_replay_matches_live_state() {
        let session = Session::new("app", "user", "s1");
        session.append_event(&delta_event("a", json!(1)));
        session.append_event(&delta_event("b", json!([1, 2])));
        session.append_event(&delta_event("a", json!(3)));

        let replayed = Session::replay_state(&session.events());
        assert_eq!(replayed, session.state());
    }
}

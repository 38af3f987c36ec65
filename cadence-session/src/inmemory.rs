use crate::{CreateRequest, DeleteRequest, GetRequest, ListRequest, SessionService};
use cadence_core::{
    CadenceError, Event, KEY_PREFIX_APP, KEY_PREFIX_USER, Result, Session, StateMap,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SessionKey {
    app_name: String,
    user_id: String,
    session_id: String,
}

impl SessionKey {
    fn key(&self) -> String {
        format!("{}:{}:{}", self.app_name, self.user_id, self.session_id)
    }
}

/// In-memory session backend. Hands out live [`Session`] handles, so the
/// runner and the in-flight invocation observe one store. `app:`-prefixed
/// keys are shared across an application's sessions and `user:`-prefixed
/// keys across a user's sessions; new sessions are seeded from those scopes.
pub struct InMemorySessionService {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    app_state: Arc<RwLock<HashMap<String, StateMap>>>,
    user_state: Arc<RwLock<HashMap<String, HashMap<String, StateMap>>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            app_state: Arc::new(RwLock::new(HashMap::new())),
            user_state: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn split_scoped(delta: &StateMap) -> (StateMap, StateMap) {
        let mut app_delta = StateMap::new();
        let mut user_delta = StateMap::new();
        for (key, value) in delta {
            if key.starts_with(KEY_PREFIX_APP) {
                app_delta.insert(key.clone(), value.clone());
            } else if key.starts_with(KEY_PREFIX_USER) {
                user_delta.insert(key.clone(), value.clone());
            }
        }
        (app_delta, user_delta)
    }

    fn scoped_seed(&self, app_name: &str, user_id: &str) -> StateMap {
        let mut seed = StateMap::new();
        if let Some(app) = self.app_state.read().unwrap().get(app_name) {
            seed.extend(app.clone());
        }
        if let Some(user) =
            self.user_state.read().unwrap().get(app_name).and_then(|m| m.get(user_id))
        {
            seed.extend(user.clone());
        }
        seed
    }

    fn record_scoped(&self, app_name: &str, user_id: &str, delta: &StateMap) {
        let (app_delta, user_delta) = Self::split_scoped(delta);
        if !app_delta.is_empty() {
            let mut lock = self.app_state.write().unwrap();
            lock.entry(app_name.to_string()).or_default().extend(app_delta);
        }
        if !user_delta.is_empty() {
            let mut lock = self.user_state.write().unwrap();
            lock.entry(app_name.to_string())
                .or_default()
                .entry(user_id.to_string())
                .or_default()
                .extend(user_delta);
        }
    }
}

impl Default for InMemorySessionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create(&self, req: CreateRequest) -> Result<Arc<Session>> {
        let session_id = req.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = SessionKey {
            app_name: req.app_name.clone(),
            user_id: req.user_id.clone(),
            session_id: session_id.clone(),
        };

        self.record_scoped(&req.app_name, &req.user_id, &req.state);

        let mut state = self.scoped_seed(&req.app_name, &req.user_id);
        for (k, v) in &req.state {
            if !k.starts_with(cadence_core::KEY_PREFIX_TEMP) {
                state.insert(k.clone(), v.clone());
            }
        }

        let session =
            Arc::new(Session::with_state(req.app_name, req.user_id, session_id, state));
        self.sessions.write().unwrap().insert(key.key(), session.clone());
        Ok(session)
    }

    async fn get(&self, req: GetRequest) -> Result<Arc<Session>> {
        let key = SessionKey {
            app_name: req.app_name,
            user_id: req.user_id,
            session_id: req.session_id,
        };
        self.sessions
            .read()
            .unwrap()
            .get(&key.key())
            .cloned()
            .ok_or_else(|| CadenceError::Session("session not found".into()))
    }

    async fn list(&self, req: ListRequest) -> Result<Vec<Arc<Session>>> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions
            .values()
            .filter(|s| s.app_name() == req.app_name && s.user_id() == req.user_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, req: DeleteRequest) -> Result<()> {
        let key = SessionKey {
            app_name: req.app_name,
            user_id: req.user_id,
            session_id: req.session_id,
        };
        self.sessions.write().unwrap().remove(&key.key());
        Ok(())
    }

    async fn append_event(&self, session: &Session, event: &Event) -> Result<()> {
        if !event.is_partial() {
            self.record_scoped(session.app_name(), session.user_id(), &event.actions.state_delta);
        }
        session.append_event(event);
        Ok(())
    }
}

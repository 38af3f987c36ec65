use cadence_core::{Event, Result, Session, StateMap};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub state: StateMap,
}

#[derive(Debug, Clone)]
pub struct GetRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone)]
pub struct ListRequest {
    pub app_name: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

/// Storage boundary for sessions. The runtime only requires that a session
/// it is handed exposes an ordered event log and a state it can read and
/// append deltas to; everything else is up to the backend.
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn create(&self, req: CreateRequest) -> Result<Arc<Session>>;
    async fn get(&self, req: GetRequest) -> Result<Arc<Session>>;
    async fn list(&self, req: ListRequest) -> Result<Vec<Arc<Session>>>;
    async fn delete(&self, req: DeleteRequest) -> Result<()>;
    async fn append_event(&self, session: &Session, event: &Event) -> Result<()>;
}

use crate::context::InvocationContext;
use cadence_core::{
    AUTHOR_USER, Agent, AgentTree, Artifacts, Content, Event, EventStream, LiveRequestQueue,
    Result, RunConfig, Session,
};
use cadence_session::{CreateRequest, GetRequest, SessionService};
use async_stream::stream;
use futures::StreamExt;
use std::sync::Arc;

pub struct RunnerConfig {
    pub app_name: String,
    pub agent: Arc<dyn Agent>,
    pub session_service: Arc<dyn SessionService>,
    pub artifact_service: Option<Arc<dyn Artifacts>>,
}

/// Top-level driver: opens the session, records the user turn, constructs
/// the root invocation context, and exposes the agent's output as an event
/// stream. Every non-partial event is persisted through the session
/// service in yield order — that ordering, not tool completion order, is
/// what serializes state.
pub struct Runner {
    app_name: String,
    root_agent: Arc<dyn Agent>,
    tree: Arc<AgentTree>,
    session_service: Arc<dyn SessionService>,
    artifact_service: Option<Arc<dyn Artifacts>>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Result<Self> {
        // Building the arena up front also validates name uniqueness.
        let tree = Arc::new(AgentTree::new(config.agent.clone())?);
        Ok(Self {
            app_name: config.app_name,
            root_agent: config.agent,
            tree,
            session_service: config.session_service,
            artifact_service: config.artifact_service,
        })
    }

    pub async fn run(
        &self,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        new_message: Content,
    ) -> Result<EventStream> {
        self.run_with_config(user_id, session_id, new_message, RunConfig::default()).await
    }

    #[tracing::instrument(skip_all, fields(app = %self.app_name))]
    pub async fn run_with_config(
        &self,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        new_message: Content,
        run_config: RunConfig,
    ) -> Result<EventStream> {
        let session =
            self.get_or_create_session(user_id.into(), session_id.into()).await?;

        let invocation_id = format!("inv-{}", uuid::Uuid::new_v4());
        let agent_to_run = self.select_agent(&session);
        tracing::debug!(invocation = %invocation_id, agent = %agent_to_run.name(), "starting invocation");

        let mut ctx = InvocationContext::new(
            invocation_id.clone(),
            agent_to_run.clone(),
            self.tree.clone(),
            session.clone(),
            new_message.clone(),
        )
        .with_run_config(run_config);
        if let Some(artifacts) = &self.artifact_service {
            ctx = ctx.with_artifacts(artifacts.clone());
        }
        let ctx = Arc::new(ctx);

        let session_service = self.session_service.clone();
        let s = stream! {
            // Record the user turn before the agent observes the session.
            let user_event = Event::new(&invocation_id, AUTHOR_USER)
                .with_content(new_message.clone());
            if let Err(e) = session_service.append_event(&session, &user_event).await {
                yield Err(e);
                return;
            }

            let mut events = match agent_to_run.run(ctx).await {
                Ok(events) => events,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            while let Some(result) = events.next().await {
                match result {
                    Ok(event) => {
                        // Fold deltas in yield order; partial fragments are
                        // surfaced to the caller but never persisted.
                        if let Err(e) = session_service.append_event(&session, &event).await {
                            yield Err(e);
                            return;
                        }
                        yield Ok(event);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(s))
    }

    /// Live entry point: same shell, with the hand-off queue wired into the
    /// context and the agent's live behavior driving the model connection.
    pub async fn run_live(
        &self,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        live_queue: Arc<LiveRequestQueue>,
        run_config: RunConfig,
    ) -> Result<EventStream> {
        let session =
            self.get_or_create_session(user_id.into(), session_id.into()).await?;

        let invocation_id = format!("inv-{}", uuid::Uuid::new_v4());
        let agent_to_run = self.select_agent(&session);

        let mut ctx = InvocationContext::new(
            invocation_id,
            agent_to_run.clone(),
            self.tree.clone(),
            session.clone(),
            Content::new("user"),
        )
        .with_run_config(run_config)
        .with_live_queue(live_queue);
        if let Some(artifacts) = &self.artifact_service {
            ctx = ctx.with_artifacts(artifacts.clone());
        }
        let ctx = Arc::new(ctx);

        let session_service = self.session_service.clone();
        let s = stream! {
            let mut events = match agent_to_run.run_live(ctx).await {
                Ok(events) => events,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            while let Some(result) = events.next().await {
                match result {
                    Ok(event) => {
                        if let Err(e) = session_service.append_event(&session, &event).await {
                            yield Err(e);
                            return;
                        }
                        yield Ok(event);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(s))
    }

    async fn get_or_create_session(
        &self,
        user_id: String,
        session_id: String,
    ) -> Result<Arc<Session>> {
        let get = self
            .session_service
            .get(GetRequest {
                app_name: self.app_name.clone(),
                user_id: user_id.clone(),
                session_id: session_id.clone(),
            })
            .await;
        match get {
            Ok(session) => Ok(session),
            Err(_) => {
                self.session_service
                    .create(CreateRequest {
                        app_name: self.app_name.clone(),
                        user_id,
                        session_id: Some(session_id),
                        state: Default::default(),
                    })
                    .await
            }
        }
    }

    /// Conversation continuity: the last agent that spoke keeps the
    /// conversation when it is still in the tree; otherwise the root agent
    /// handles the turn.
    fn select_agent(&self, session: &Arc<Session>) -> Arc<dyn Agent> {
        for event in session.events().iter().rev() {
            if event.author == AUTHOR_USER {
                continue;
            }
            if let Some(agent) = self.tree.get(&event.author) {
                return agent;
            }
        }
        self.root_agent.clone()
    }
}

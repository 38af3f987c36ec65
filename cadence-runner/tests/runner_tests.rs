//! End-to-end runner behavior: persistence, state folding, replay.

use cadence_agent::LlmAgentBuilder;
use cadence_core::{
    AUTHOR_USER, Content, LlmResponse, Part, RunConfig, Session, StreamingMode, ToolContext,
};
use cadence_model::MockLlm;
use cadence_runner::{Runner, RunnerConfig};
use cadence_session::{GetRequest, InMemorySessionService, SessionService};
use cadence_tool::FunctionTool;
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::Arc;

async fn drain(mut stream: cadence_core::EventStream) -> Vec<cadence_core::Event> {
    let mut events = Vec::new();
    while let Some(result) = stream.next().await {
        events.push(result.expect("no errors expected"));
    }
    events
}

fn roll_die_runner(sessions: Arc<InMemorySessionService>) -> Runner {
    let model = Arc::new(
        MockLlm::new("mock-model")
            .with_response(LlmResponse::new(
                Content::new("model").with_part(Part::function_call("roll_die", json!({"sides": 6}))),
            ))
            .with_response(LlmResponse::new(Content::new("model").with_text("You rolled a 4"))),
    );
    let roll_die = FunctionTool::new(
        "roll_die",
        "Rolls a die.",
        |ctx: Arc<dyn ToolContext>, _args: Value| async move {
            ctx.state_set("rolls".to_string(), json!([4]));
            Ok(json!(4))
        },
    );
    let agent = LlmAgentBuilder::new("roller")
        .model(model)
        .tool(Arc::new(roll_die))
        .build()
        .unwrap();

    Runner::new(RunnerConfig {
        app_name: "dice".to_string(),
        agent: Arc::new(agent),
        session_service: sessions,
        artifact_service: None,
    })
    .unwrap()
}

#[tokio::test]
async fn test_roll_die_turn_end_to_end() {
    let sessions = Arc::new(InMemorySessionService::new());
    let runner = roll_die_runner(sessions.clone());

    let stream = runner
        .run("u1", "s1", Content::new("user").with_text("roll a d6"))
        .await
        .unwrap();
    let events = drain(stream).await;

    // [function-call, function-response, final text]
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].function_calls().len(), 1);
    assert_eq!(events[1].function_responses().len(), 1);
    assert_eq!(events[2].content().unwrap().merged_text(), "You rolled a 4");

    // The tool's delta was folded into session state after the turn.
    let session = sessions
        .get(GetRequest {
            app_name: "dice".to_string(),
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(session.state_get("rolls"), Some(json!([4])));

    // Log = user event + the three agent events, in yield order.
    let log = session.events();
    assert_eq!(log.len(), 4);
    assert_eq!(log[0].author, AUTHOR_USER);
    assert!(log[1..].iter().all(|e| e.author == "roller"));

    // Replaying the log reconstructs the same state.
    assert_eq!(Session::replay_state(&log), session.state());
}

#[tokio::test]
async fn test_partial_events_streamed_but_not_persisted() {
    let sessions = Arc::new(InMemorySessionService::new());
    let model = Arc::new(MockLlm::new("mock-model").with_turn(vec![
        LlmResponse::partial(Content::new("model").with_text("Hel")),
        LlmResponse::partial(Content::new("model").with_text("lo")),
        LlmResponse::new(Content::new("model").with_text("Hello")),
    ]));
    let agent = LlmAgentBuilder::new("stream_talker").model(model).build().unwrap();
    let runner = Runner::new(RunnerConfig {
        app_name: "chat".to_string(),
        agent: Arc::new(agent),
        session_service: sessions.clone(),
        artifact_service: None,
    })
    .unwrap();

    let stream = runner
        .run_with_config(
            "u1",
            "s1",
            Content::new("user").with_text("hi"),
            RunConfig::default().with_streaming_mode(StreamingMode::Sse),
        )
        .await
        .unwrap();
    let events = drain(stream).await;

    // The caller sees the fragments and the authoritative final event, and
    // the fragments' concatenation equals the final text.
    assert_eq!(events.len(), 3);
    let partial_text: String = events[..2]
        .iter()
        .map(|e| {
            assert!(e.is_partial());
            e.content().unwrap().merged_text()
        })
        .collect();
    assert!(!events[2].is_partial());
    assert_eq!(partial_text, events[2].content().unwrap().merged_text());

    // Only the final event is in the log.
    let session = sessions
        .get(GetRequest {
            app_name: "chat".to_string(),
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
        })
        .await
        .unwrap();
    let log = session.events();
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|e| !e.is_partial()));
}

#[tokio::test]
async fn test_second_turn_sees_first_turn_history() {
    let sessions = Arc::new(InMemorySessionService::new());
    let model = Arc::new(MockLlm::new("mock-model").repeating(vec![LlmResponse::new(
        Content::new("model").with_text("hello again"),
    )]));
    let model_handle = model.clone();
    let agent = LlmAgentBuilder::new("greeter").model(model).build().unwrap();
    let runner = Runner::new(RunnerConfig {
        app_name: "chat".to_string(),
        agent: Arc::new(agent),
        session_service: sessions,
        artifact_service: None,
    })
    .unwrap();

    drain(runner.run("u1", "s1", Content::new("user").with_text("first")).await.unwrap()).await;
    drain(runner.run("u1", "s1", Content::new("user").with_text("second")).await.unwrap()).await;

    let requests = model_handle.requests();
    assert_eq!(requests.len(), 2);
    // The second request replays the first turn: user, model, user.
    let texts: Vec<String> =
        requests[1].contents.iter().map(|c| c.merged_text()).collect();
    assert_eq!(texts, vec!["first", "hello again", "second"]);
}

#[tokio::test]
async fn test_runner_rejects_duplicate_agent_names() {
    let model = Arc::new(MockLlm::new("m"));
    let a = LlmAgentBuilder::new("dup").model(model.clone()).build().unwrap();
    let b = LlmAgentBuilder::new("dup").model(model.clone()).build().unwrap();
    let root = LlmAgentBuilder::new("root")
        .model(model)
        .sub_agent(Arc::new(a))
        .sub_agent(Arc::new(b))
        .build();

    // The builder itself rejects duplicate names among direct children.
    assert!(root.is_err());
}

#[tokio::test]
async fn test_end_invocation_callback_stops_the_turn() {
    let sessions = Arc::new(InMemorySessionService::new());
    let model = Arc::new(MockLlm::new("mock-model").repeating(vec![LlmResponse::new(
        Content::new("model").with_text("should not appear"),
    )]));
    let model_handle = model.clone();
    let agent = LlmAgentBuilder::new("cancelled")
        .model(model)
        .before_callback(Box::new(|ctx: Arc<dyn cadence_core::CallbackContext>| {
            Box::pin(async move {
                let mut actions = ctx.actions();
                actions.end_invocation = true;
                ctx.set_actions(actions);
                Ok(None)
            })
        }))
        .build()
        .unwrap();
    let runner = Runner::new(RunnerConfig {
        app_name: "chat".to_string(),
        agent: Arc::new(agent),
        session_service: sessions,
        artifact_service: None,
    })
    .unwrap();

    let events =
        drain(runner.run("u1", "s1", Content::new("user").with_text("hi")).await.unwrap()).await;

    // The cancellation flag short-circuits the rest of the pipeline
    // without an error; the model is never consulted.
    assert_eq!(model_handle.call_count(), 0);
    assert!(events.iter().all(|e| e.content().is_none()));
}

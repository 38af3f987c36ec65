//! Live flow: partial accumulation, flush triggers, terminal events.

mod test_context;

use cadence_agent::LlmAgentBuilder;
use cadence_core::{
    Agent, Content, InvocationContext, LiveRequestQueue, LlmResponse, Part, ToolContext,
};
use cadence_model::MockLlm;
use cadence_tool::FunctionTool;
use serde_json::{Value, json};
use std::sync::Arc;
use test_context::{TestContext, collect_events};

fn turn_complete() -> LlmResponse {
    LlmResponse { turn_complete: true, ..Default::default() }
}

fn interrupted() -> LlmResponse {
    LlmResponse { interrupted: true, ..Default::default() }
}

#[tokio::test]
async fn test_partial_fragments_concatenate_into_final_event() {
    let model = Arc::new(MockLlm::new("live-model").with_live_fragments(vec![
        LlmResponse::partial(Content::new("model").with_text("Hel")),
        LlmResponse::partial(Content::new("model").with_text("lo")),
        turn_complete(),
    ]));
    let agent = Arc::new(LlmAgentBuilder::new("narrator").model(model).build().unwrap());

    let queue = Arc::new(LiveRequestQueue::new());
    let ctx = Arc::new(TestContext::new(agent, "talk to me").with_live_queue(queue));
    let events = collect_events(ctx.session(), ctx.agent().run_live(ctx.clone()).await.unwrap()).await;

    // Two partials, one merged utterance, one terminal event.
    assert_eq!(events.len(), 4);
    assert!(events[0].is_partial());
    assert!(events[1].is_partial());

    let partial_text: String =
        events[..2].iter().map(|e| e.content().unwrap().merged_text()).collect();
    let merged = &events[2];
    assert!(!merged.is_partial());
    assert_eq!(merged.content().unwrap().merged_text(), partial_text);
    assert_eq!(merged.content().unwrap().merged_text(), "Hello");

    let terminal = &events[3];
    assert!(terminal.llm_response.turn_complete);
}

#[tokio::test]
async fn test_interruption_flushes_pending_text_first() {
    let model = Arc::new(MockLlm::new("live-model").with_live_fragments(vec![
        LlmResponse::partial(Content::new("model").with_text("He")),
        interrupted(),
    ]));
    let agent = Arc::new(LlmAgentBuilder::new("narrator").model(model).build().unwrap());

    let queue = Arc::new(LiveRequestQueue::new());
    let ctx = Arc::new(TestContext::new(agent, "talk").with_live_queue(queue));
    let events = collect_events(ctx.session(), ctx.agent().run_live(ctx.clone()).await.unwrap()).await;

    assert_eq!(events.len(), 3);
    assert!(events[0].is_partial());
    // Pending text lands before the interruption surfaces.
    assert_eq!(events[1].content().unwrap().merged_text(), "He");
    assert!(!events[1].is_partial());
    assert!(events[2].llm_response.interrupted);
}

#[tokio::test]
async fn test_live_function_calls_execute_and_respond() {
    let model = Arc::new(MockLlm::new("live-model").with_live_fragments(vec![
        LlmResponse {
            content: Some(
                Content::new("model").with_part(Part::function_call("check_time", json!({}))),
            ),
            ..Default::default()
        },
        turn_complete(),
    ]));

    let check_time = FunctionTool::new(
        "check_time",
        "Tells the time.",
        |_ctx: Arc<dyn ToolContext>, _args: Value| async move { Ok(json!("12:00")) },
    );

    let agent = Arc::new(
        LlmAgentBuilder::new("clock")
            .model(model)
            .tool(Arc::new(check_time))
            .build()
            .unwrap(),
    );

    let queue = Arc::new(LiveRequestQueue::new());
    let ctx = Arc::new(TestContext::new(agent, "what time is it").with_live_queue(queue));
    let events = collect_events(ctx.session(), ctx.agent().run_live(ctx.clone()).await.unwrap()).await;

    // [call event, function-response event, terminal event]
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].function_calls().len(), 1);
    assert_eq!(events[1].function_responses().len(), 1);
    assert_eq!(
        events[0].function_calls()[0].correlation_id(),
        events[1].function_responses()[0].correlation_id()
    );
    assert!(events[2].llm_response.turn_complete);
}

#[tokio::test]
async fn test_live_requires_queue() {
    let model = Arc::new(MockLlm::new("live-model").with_live_fragments(vec![turn_complete()]));
    let agent = Arc::new(LlmAgentBuilder::new("mute").model(model).build().unwrap());

    let ctx = Arc::new(TestContext::new(agent, "hi"));
    let mut stream = ctx.agent().run_live(ctx.clone()).await.unwrap();

    use futures::StreamExt;
    let first = stream.next().await.unwrap();
    assert!(first.unwrap_err().to_string().contains("live request queue"));
}

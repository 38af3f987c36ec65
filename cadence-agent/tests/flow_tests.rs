//! The model-call / function-call loop.

mod test_context;

use cadence_agent::LlmAgentBuilder;
use cadence_core::{
    Agent, CadenceError, Content, InvocationContext, LlmResponse, Part, RunConfig, ToolContext,
};
use cadence_model::MockLlm;
use cadence_tool::FunctionTool;
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::Arc;
use test_context::{TestContext, collect_events};

fn call_part(name: &str, args: Value) -> Part {
    Part::function_call(name, args)
}

#[tokio::test]
async fn test_response_without_function_calls_terminates_after_one_model_call() {
    let model = Arc::new(
        MockLlm::new("mock-model")
            .with_response(LlmResponse::new(Content::new("model").with_text("plain answer"))),
    );
    let agent = LlmAgentBuilder::new("plain").model(model.clone()).build().unwrap();

    let ctx = Arc::new(TestContext::new(Arc::new(agent), "hi"));
    let events = collect_events(ctx.session(), ctx.agent().run(ctx.clone()).await.unwrap()).await;

    assert_eq!(model.call_count(), 1);
    assert_eq!(events.len(), 1);
    assert!(events[0].function_calls().is_empty());
}

#[tokio::test]
async fn test_roll_die_turn_produces_call_response_and_text_events() {
    let model = Arc::new(
        MockLlm::new("mock-model")
            .with_response(LlmResponse::new(
                Content::new("model").with_part(call_part("roll_die", json!({"sides": 6}))),
            ))
            .with_response(LlmResponse::new(Content::new("model").with_text("You rolled a 4"))),
    );

    let roll_die = FunctionTool::new(
        "roll_die",
        "Rolls a die with the given number of sides.",
        |ctx: Arc<dyn ToolContext>, _args: Value| async move {
            ctx.state_set("rolls".to_string(), json!([4]));
            Ok(json!(4))
        },
    );

    let agent = LlmAgentBuilder::new("roller")
        .model(model.clone())
        .tool(Arc::new(roll_die))
        .build()
        .unwrap();

    let ctx = Arc::new(TestContext::new(Arc::new(agent), "roll a d6"));
    let events = collect_events(ctx.session(), ctx.agent().run(ctx.clone()).await.unwrap()).await;

    // [function-call event, function-response event, final text event]
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].function_calls().len(), 1);
    assert_eq!(events[1].function_responses().len(), 1);
    assert_eq!(events[2].content().unwrap().merged_text(), "You rolled a 4");

    // The tool's state write rides on the function-response event.
    assert_eq!(events[1].actions.state_delta.get("rolls"), Some(&json!([4])));

    // Call and response share one correlation id.
    let call_id = events[0].function_calls()[0].correlation_id().unwrap().to_string();
    assert_eq!(events[1].function_responses()[0].correlation_id(), Some(call_id.as_str()));
    assert!(call_id.starts_with("fc-"));

    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn test_parallel_calls_all_answered_and_ids_stripped_from_requests() {
    let model = Arc::new(
        MockLlm::new("mock-model")
            .with_response(LlmResponse::new(
                Content::new("model")
                    .with_part(call_part("lookup", json!({"q": "a"})))
                    .with_part(call_part("lookup_other", json!({"q": "b"}))),
            ))
            .with_response(LlmResponse::new(Content::new("model").with_text("done"))),
    );

    let lookup = FunctionTool::new(
        "lookup",
        "Looks something up.",
        |_ctx: Arc<dyn ToolContext>, _args: Value| async move { Ok(json!({"hit": 1})) },
    );
    let lookup_other = FunctionTool::new(
        "lookup_other",
        "Looks something else up.",
        |_ctx: Arc<dyn ToolContext>, _args: Value| async move { Ok(json!({"hit": 2})) },
    );

    let agent = LlmAgentBuilder::new("searcher")
        .model(model.clone())
        .tool(Arc::new(lookup))
        .tool(Arc::new(lookup_other))
        .build()
        .unwrap();

    let ctx = Arc::new(TestContext::new(Arc::new(agent), "search twice"));
    let events = collect_events(ctx.session(), ctx.agent().run(ctx.clone()).await.unwrap()).await;

    // The call event carries ids; the response event echoes them pairwise.
    let calls = events[0].function_calls();
    let responses = events[1].function_responses();
    assert_eq!(calls.len(), 2);
    assert_eq!(responses.len(), 2);
    for (call, response) in calls.iter().zip(responses.iter()) {
        assert!(call.correlation_id().is_some());
        assert_eq!(call.correlation_id(), response.correlation_id());
    }
    let ids: std::collections::HashSet<_> =
        calls.iter().map(|c| c.correlation_id().unwrap()).collect();
    assert_eq!(ids.len(), 2, "correlation ids are unique within the invocation");

    // The second request carries exactly two function responses and no ids
    // anywhere: correlation is local bookkeeping, not model-visible.
    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    let mut response_parts = 0;
    for content in &requests[1].contents {
        for part in &content.parts {
            assert_eq!(part.correlation_id(), None, "ids must be stripped from requests");
            if matches!(part, Part::FunctionResponse { .. }) {
                response_parts += 1;
            }
        }
    }
    assert_eq!(response_parts, 2);
}

#[tokio::test]
async fn test_concurrent_tools_report_in_call_order() {
    let model = Arc::new(
        MockLlm::new("mock-model")
            .with_response(LlmResponse::new(
                Content::new("model")
                    .with_part(call_part("slow", json!({})))
                    .with_part(call_part("fast", json!({}))),
            ))
            .with_response(LlmResponse::new(Content::new("model").with_text("done"))),
    );

    let slow = FunctionTool::new(
        "slow",
        "Takes a while.",
        |_ctx: Arc<dyn ToolContext>, _args: Value| async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(json!("slow result"))
        },
    );
    let fast = FunctionTool::new(
        "fast",
        "Returns immediately.",
        |_ctx: Arc<dyn ToolContext>, _args: Value| async move { Ok(json!("fast result")) },
    );

    let agent = LlmAgentBuilder::new("racer")
        .model(model)
        .tool(Arc::new(slow))
        .tool(Arc::new(fast))
        .build()
        .unwrap();

    let ctx = Arc::new(TestContext::new(Arc::new(agent), "race"));
    let events = collect_events(ctx.session(), ctx.agent().run(ctx.clone()).await.unwrap()).await;

    // Results appear in call order even though `fast` finished first:
    // event order, not wall clock, serializes effects.
    let responses = events[1].function_responses();
    let names: Vec<&str> = responses
        .iter()
        .map(|p| match p {
            Part::FunctionResponse { name, .. } => name.as_str(),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(names, vec!["slow", "fast"]);
}

#[tokio::test]
async fn test_failing_tool_becomes_error_payload_and_loop_continues() {
    let model = Arc::new(
        MockLlm::new("mock-model")
            .with_response(LlmResponse::new(
                Content::new("model").with_part(call_part("broken", json!({}))),
            ))
            .with_response(LlmResponse::new(
                Content::new("model").with_text("the tool failed, sorry"),
            )),
    );

    let broken = FunctionTool::new(
        "broken",
        "Always fails.",
        |_ctx: Arc<dyn ToolContext>, _args: Value| async move {
            Err(CadenceError::Tool("disk on fire".to_string()))
        },
    );

    let agent =
        LlmAgentBuilder::new("sturdy").model(model.clone()).tool(Arc::new(broken)).build().unwrap();

    let ctx = Arc::new(TestContext::new(Arc::new(agent), "try it"));
    let events = collect_events(ctx.session(), ctx.agent().run(ctx.clone()).await.unwrap()).await;

    assert_eq!(events.len(), 3);
    let response = &events[1].function_responses()[0];
    match response {
        Part::FunctionResponse { response, .. } => {
            assert!(response["error"].as_str().unwrap().contains("disk on fire"));
        }
        _ => unreachable!(),
    }
    assert_eq!(model.call_count(), 2, "the loop keeps going after a tool failure");
}

#[tokio::test]
async fn test_exceeding_max_llm_calls_is_fatal() {
    // The model asks for the tool on every turn, so the loop never settles.
    let model = Arc::new(MockLlm::new("mock-model").repeating(vec![LlmResponse::new(
        Content::new("model").with_part(call_part("ping", json!({}))),
    )]));
    let ping = FunctionTool::new(
        "ping",
        "Pings.",
        |_ctx: Arc<dyn ToolContext>, _args: Value| async move { Ok(json!("pong")) },
    );
    let agent = LlmAgentBuilder::new("looper")
        .model(model)
        .tool(Arc::new(ping))
        .build()
        .unwrap();

    let ctx = Arc::new(
        TestContext::new(Arc::new(agent), "go")
            .with_run_config(RunConfig::default().with_max_llm_calls(1)),
    );
    let mut stream = ctx.agent().run(ctx.clone()).await.unwrap();

    let mut events = 0;
    let error = loop {
        match stream.next().await.expect("stream must end with the limit error") {
            Ok(_) => events += 1,
            Err(e) => break e,
        }
    };
    assert!(matches!(error, CadenceError::LlmCallsLimitExceeded { limit: 1 }));
    // One allowed exchange: the call event and its responses.
    assert_eq!(events, 2);
    assert!(stream.next().await.is_none(), "no further events after the limit error");
}

#[tokio::test]
async fn test_model_error_response_surfaces_as_event_and_ends_turn() {
    let model = Arc::new(
        MockLlm::new("mock-model")
            .with_response(LlmResponse::error("UNAVAILABLE", "backend overloaded")),
    );
    let agent = LlmAgentBuilder::new("unlucky").model(model.clone()).build().unwrap();

    let ctx = Arc::new(TestContext::new(Arc::new(agent), "hi"));
    let events = collect_events(ctx.session(), ctx.agent().run(ctx.clone()).await.unwrap()).await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].llm_response.error_code.as_deref(), Some("UNAVAILABLE"));
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn test_output_key_saves_final_text_to_state_delta() {
    let model = Arc::new(
        MockLlm::new("mock-model")
            .with_response(LlmResponse::new(Content::new("model").with_text("42"))),
    );
    let agent = LlmAgentBuilder::new("oracle")
        .model(model)
        .output_key("answer")
        .build()
        .unwrap();

    let ctx = Arc::new(TestContext::new(Arc::new(agent), "meaning of life?"));
    let events = collect_events(ctx.session(), ctx.agent().run(ctx.clone()).await.unwrap()).await;

    assert_eq!(events[0].actions.state_delta.get("answer"), Some(&json!("42")));
}

#[tokio::test]
async fn test_long_running_calls_stop_the_loop() {
    let model = Arc::new(
        MockLlm::new("mock-model")
            .with_response(LlmResponse::new(
                Content::new("model").with_part(call_part("export_report", json!({}))),
            ))
            // A second scripted turn exists, but the loop must not reach it.
            .with_response(LlmResponse::new(Content::new("model").with_text("unreachable"))),
    );

    let export = FunctionTool::new(
        "export_report",
        "Starts a report export.",
        |_ctx: Arc<dyn ToolContext>, _args: Value| async move { Ok(json!({"status": "pending"})) },
    )
    .with_long_running(true);

    let agent = LlmAgentBuilder::new("exporter")
        .model(model.clone())
        .tool(Arc::new(export))
        .build()
        .unwrap();

    let ctx = Arc::new(TestContext::new(Arc::new(agent), "export it"));
    let events = collect_events(ctx.session(), ctx.agent().run(ctx.clone()).await.unwrap()).await;

    assert_eq!(model.call_count(), 1, "pending long-running calls end the loop");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].long_running_tool_ids.len(), 1);
    assert_eq!(ctx.streaming_tools().len(), 1);
    assert_eq!(ctx.streaming_tools()[0].name, "export_report");
}

#[tokio::test]
async fn test_instruction_provider_resolves_each_invocation() {
    let model = Arc::new(MockLlm::new("mock-model").repeating(vec![LlmResponse::new(
        Content::new("model").with_text("ok"),
    )]));
    let agent = LlmAgentBuilder::new("primed")
        .model(model.clone())
        .instruction_provider(Box::new(|ctx| {
            Box::pin(async move {
                Ok(format!("You are serving user {}.", ctx.user_id()))
            })
        }))
        .build()
        .unwrap();

    let ctx = Arc::new(TestContext::new(Arc::new(agent), "hi"));
    collect_events(ctx.session(), ctx.agent().run(ctx.clone()).await.unwrap()).await;

    let requests = model.requests();
    assert!(
        requests[0]
            .system_instruction
            .as_deref()
            .unwrap()
            .contains("You are serving user test-user.")
    );
}

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use teamflow_controller::{AgentBuilder, Review, Validator, Verdict};
use teamflow_core::mocks::{FailingTool, MockLlm, RecordingEmitter, RecordingTool};
use teamflow_core::traits::{
    Agent, AgentContext, FunctionCall, LlmResponse, Peer, StepWatcher, ToolCall,
};
use teamflow_core::types::{Message, MessageType, StepAction};
use teamflow_core::{Error, EventType, Result};

const END: &str = r#"{"cate": "END", "thought": "done", "content": "FINAL ANSWER: 42"}"#;

fn task() -> Vec<Message> {
    vec![Message::msg("User", "Coder", "answer the question")]
}

fn ctx() -> AgentContext {
    AgentContext::new(CancellationToken::new())
}

#[tokio::test]
async fn test_feedback_circuit_breaker_clears_steps() {
    let llm = Arc::new(MockLlm::constant("this is not json"));
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_llm(llm.clone())
        .with_max_iterations(8)
        .build()
        .unwrap();

    let err = agent.run(task(), &ctx()).await.unwrap_err();
    assert!(matches!(err, Error::NotFinished { iterations: 8, .. }));

    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 8);
    assert_eq!(prompts[0].matches("Feedback:").count(), 0);
    assert_eq!(prompts[5].matches("Feedback:").count(), 5);
    // Six rejections in a row: the seventh round starts from scratch.
    assert_eq!(prompts[6].matches("Feedback:").count(), 0);
    assert_eq!(prompts[7].matches("Feedback:").count(), 1);
    assert!(prompts[1].contains("parse output failed with error:"));
}

#[tokio::test]
async fn test_unknown_tool_is_fed_back_without_calling() {
    let llm = Arc::new(MockLlm::new(vec![
        r#"{"thought": "ship it", "action": "deploy", "input": "prod"}"#,
        END,
    ]));
    let search = Arc::new(RecordingTool::new("search", "web search", "found"));
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_llm(llm.clone())
        .with_tool(search.clone())
        .build()
        .unwrap();

    let generation = agent.run(task(), &ctx()).await.unwrap();
    assert_eq!(generation.messages[0].content, "FINAL ANSWER: 42");
    assert!(search.calls().is_empty());

    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("- deploy is not a valid tool, please check your answer"));
}

#[tokio::test]
async fn test_tools_match_case_insensitively_and_observations_flow() {
    let llm = Arc::new(MockLlm::new(vec![
        r#"{"thought": "look", "action": "SEARCH", "input": {"q": "rust"}}"#,
        END,
    ]));
    let search = Arc::new(RecordingTool::new("search", "web search", "found 3 crates"));
    let emitter = Arc::new(RecordingEmitter::new());
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_llm(llm.clone())
        .with_tool(search.clone())
        .with_emitter(emitter.clone())
        .build()
        .unwrap();

    let generation = agent.run(task(), &ctx()).await.unwrap();
    assert_eq!(search.calls(), vec![r#"{"q":"rust"}"#.to_string()]);
    assert!(llm.prompts()[1].contains("Observation: found 3 crates"));

    // Two rounds at 30 tokens each, stamped on the first message.
    assert_eq!(generation.total_tokens, 60);
    assert_eq!(generation.messages[0].token_cost, 60);
    assert_eq!(generation.messages[0].sender, "Coder");

    assert_eq!(emitter.count(EventType::AgentStarted), 1);
    assert_eq!(emitter.count(EventType::AgentFinished), 1);
    assert_eq!(emitter.count(EventType::ToolExecStarted), 1);
    assert_eq!(emitter.count(EventType::ToolExecFinished), 1);
}

#[tokio::test]
async fn test_tool_error_becomes_feedback() {
    let llm = Arc::new(MockLlm::new(vec![
        r#"{"action": "fetch", "input": "https://example.com"}"#,
        END,
    ]));
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_llm(llm.clone())
        .with_tool(Arc::new(FailingTool::new("fetch", "timeout")))
        .build()
        .unwrap();

    agent.run(task(), &ctx()).await.unwrap();
    assert!(llm.prompts()[1].contains("Feedback: Tool execution failed: timeout"));
}

#[tokio::test]
async fn test_reasoning_prefix_is_dropped() {
    let llm = Arc::new(MockLlm::constant(
        r#"<think>{"cate": "END", "content": "draft"}</think>{"cate": "END", "content": "42"}"#,
    ));
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_llm(llm)
        .build()
        .unwrap();

    let generation = agent.run(task(), &ctx()).await.unwrap();
    assert_eq!(generation.messages.len(), 1);
    assert_eq!(generation.messages[0].content, "42");
    assert_eq!(generation.messages[0].kind, MessageType::End);
}

struct RejectActions;

#[async_trait]
impl Validator for RejectActions {
    fn name(&self) -> &str {
        "no-actions"
    }

    async fn validate(&self, review: &Review<'_>) -> Result<Verdict> {
        if review.actions.is_empty() {
            Ok(Verdict::approve())
        } else {
            Ok(Verdict::reject("tools are disabled"))
        }
    }
}

#[tokio::test]
async fn test_rejected_round_runs_no_tools() {
    let llm = Arc::new(MockLlm::constant(r#"{"action": "search", "input": "x"}"#));
    let search = Arc::new(RecordingTool::new("search", "web search", "found"));
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_llm(llm.clone())
        .with_tool(search.clone())
        .with_validator(Arc::new(RejectActions))
        .with_max_iterations(2)
        .build()
        .unwrap();

    let err = agent.run(task(), &ctx()).await.unwrap_err();
    assert!(matches!(err, Error::NotFinished { .. }));
    assert!(search.calls().is_empty());
    assert!(llm.prompts()[1].contains("Feedback: - tools are disabled"));
}

#[tokio::test]
async fn test_content_validator_rejects_unknown_receiver() {
    let llm = Arc::new(MockLlm::new(vec![
        r#"[{"cate": "MSG", "receiver": "Designer", "content": "hi"}]"#,
        r#"[{"cate": "MSG", "receiver": "Leader", "content": "hi"}]"#,
    ]));
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_llm(llm.clone())
        .build()
        .unwrap();
    let ctx = ctx().with_peers(vec![Peer {
        name: "Leader".into(),
        description: "leads".into(),
    }]);

    let generation = agent.run(task(), &ctx).await.unwrap();
    assert_eq!(generation.messages[0].receiver, "Leader");
    assert!(llm.prompts()[1].contains("Designer is not a valid receiver, choose from: Leader"));
}

#[tokio::test]
async fn test_native_tool_calls() {
    let call = LlmResponse {
        tool_calls: vec![ToolCall {
            id: "call_1".into(),
            function: FunctionCall {
                name: "search".into(),
                arguments: r#"{"q":"tokio"}"#.into(),
            },
        }],
        ..Default::default()
    }
    .with_usage(5, 5);
    let llm = Arc::new(MockLlm::with_responses(vec![call, LlmResponse::text(END)]));
    let search = Arc::new(RecordingTool::new("search", "web search", "found"));
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_llm(llm.clone())
        .with_tool(search.clone())
        .with_function_call(true)
        .build()
        .unwrap();

    let generation = agent.run(task(), &ctx()).await.unwrap();
    assert_eq!(generation.total_tokens, 10);
    assert_eq!(search.calls(), vec![r#"{"q":"tokio"}"#.to_string()]);

    let options = llm.options();
    assert_eq!(options[0].tools.len(), 1);
    assert_eq!(options[0].tools[0].function.name, "search");
}

#[tokio::test]
async fn test_prompt_inputs() {
    let llm = Arc::new(MockLlm::constant(END));
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_prompt("{{ name }}|{{ agent_names }}|{{ sop }}|{{ question }}|{{ team }}")
        .with_var("team", "blue")
        .with_llm(llm.clone())
        .build()
        .unwrap();
    let ctx = ctx().with_sop("digraph { a -> b }").with_peers(vec![
        Peer {
            name: "Leader".into(),
            description: "leads".into(),
        },
        Peer {
            name: "Tester".into(),
            description: "tests".into(),
        },
    ]);

    agent.run(task(), &ctx).await.unwrap();
    assert_eq!(
        llm.prompts()[0],
        "Coder|Leader, Tester|digraph { a -> b }|answer the question|blue"
    );
}

#[tokio::test]
async fn test_memory_filter_runs_first() {
    let llm = Arc::new(MockLlm::constant(END));
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_prompt("{{ question }}")
        .with_llm(llm.clone())
        .with_memory_filter(|msgs| msgs.into_iter().skip(1).collect())
        .build()
        .unwrap();

    let messages = vec![
        Message::msg("User", "Coder", "old"),
        Message::msg("Leader", "Coder", "new"),
    ];
    agent.run(messages, &ctx()).await.unwrap();
    assert_eq!(llm.prompts()[0], "new");
}

#[tokio::test]
async fn test_cancelled_context_aborts_model_call() {
    let llm = Arc::new(MockLlm::constant(END));
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_llm(llm.clone())
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = agent
        .run(task(), &AgentContext::new(cancel))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

/// Rejects the first history it is shown, then lets everything pass.
#[derive(Default)]
struct RejectOnce {
    reviewed: Mutex<Vec<usize>>,
}

#[async_trait]
impl StepWatcher for RejectOnce {
    async fn review_steps(
        &self,
        _agent: &str,
        steps: &[StepAction],
        _cancel: &CancellationToken,
    ) -> Option<String> {
        let mut reviewed = self.reviewed.lock().unwrap();
        reviewed.push(steps.len());
        (reviewed.len() == 1).then(|| "stop searching".to_string())
    }
}

#[tokio::test]
async fn test_step_watcher_resets_history_with_a_hint() {
    let act = r#"{"thought": "look", "action": "search", "input": "x"}"#;
    let llm = Arc::new(MockLlm::new(vec![act, act, act, END]));
    let search = Arc::new(RecordingTool::new("search", "web search", "found"));
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_prompt("{{ history }}")
        .with_llm(llm.clone())
        .with_tool(search.clone())
        .build()
        .unwrap();
    let watcher = Arc::new(RejectOnce::default());
    let ctx = ctx().with_step_watcher(watcher.clone(), 3);

    let generation = agent.run(task(), &ctx).await.unwrap();
    assert_eq!(generation.messages[0].content, "FINAL ANSWER: 42");
    assert_eq!(search.calls().len(), 3);
    assert_eq!(*watcher.reviewed.lock().unwrap(), vec![3]);

    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 4);
    assert_eq!(prompts[2].matches("Observation: found").count(), 2);
    // The fourth round starts over from the task plus the watcher's hint.
    assert_eq!(
        prompts[3],
        "(User -> me): answer the question\n(Hint from Global Watcher): stop searching\n"
    );
    assert_eq!(generation.total_tokens, 120);
}

#[tokio::test]
async fn test_step_watcher_disabled_by_zero_interval() {
    let act = r#"{"action": "search", "input": "x"}"#;
    let llm = Arc::new(MockLlm::new(vec![act, act, act, END]));
    let agent = AgentBuilder::new("Coder")
        .with_description("writes code")
        .with_llm(llm)
        .with_tool(Arc::new(RecordingTool::new("search", "web search", "found")))
        .build()
        .unwrap();
    let watcher = Arc::new(RejectOnce::default());
    let ctx = ctx().with_step_watcher(watcher.clone(), 0);

    agent.run(task(), &ctx).await.unwrap();
    assert!(watcher.reviewed.lock().unwrap().is_empty());
}

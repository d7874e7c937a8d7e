//! End-to-end runs of a team built from model-driven agents.

use std::sync::Arc;

use teamflow::teamflow_controller::NodeColor;
use teamflow::teamflow_core::mocks::{MockLlm, RecordingTool};
use teamflow::teamflow_core::traits::Agent;
use teamflow::teamflow_core::types::Message;
use teamflow::{AgentBuilder, AppConfig, Error, Scheduler};

const TASK: &str = "what is six times seven?";

fn agent(name: &str, description: &str, llm: Arc<MockLlm>) -> Arc<dyn Agent> {
    Arc::new(
        AgentBuilder::new(name)
            .with_description(description)
            .with_llm(llm)
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn test_leader_and_worker_reach_final_answer() {
    let leader_llm = Arc::new(MockLlm::new(vec![
        r#"```json
[{"cate": "MSG", "thought": "delegate", "receiver": "Worker", "content": "compute 6*7"}]
```"#,
        r#"{"cate": "END", "thought": "verified", "content": "FINAL ANSWER: 42"}"#,
    ]));
    let worker_llm = Arc::new(MockLlm::constant(
        r#"[{"cate": "MSG", "receiver": "Leader", "content": "42"}]"#,
    ));

    let scheduler = Scheduler::builder()
        .with_config(&AppConfig::default())
        .with_member(agent("Leader", "splits the task", leader_llm.clone()))
        .with_member(agent("Worker", "does arithmetic", worker_llm.clone()))
        .with_leader("Leader")
        .build()
        .unwrap();

    let answer = scheduler.run(TASK).await.unwrap();
    assert_eq!(answer, "FINAL ANSWER: 42");

    assert_eq!(leader_llm.call_count(), 2);
    assert_eq!(worker_llm.call_count(), 1);
    assert!(worker_llm.prompts()[0].contains("(Leader -> me): compute 6*7"));
    assert!(leader_llm.prompts()[1].contains("(Worker -> me): 42"));

    // Three model calls at 30 tokens each.
    assert_eq!(scheduler.env().tokens().await, 90);
}

#[tokio::test]
async fn test_watcher_restarts_a_worker_that_went_astray() {
    let leader_llm = Arc::new(MockLlm::new(vec![
        r#"[{"cate": "MSG", "receiver": "Worker", "content": "compute 6*7"}]"#,
        r#"{"cate": "END", "content": "FINAL ANSWER: 42"}"#,
    ]));
    let worker_llm = Arc::new(MockLlm::new(vec![
        r#"[{"cate": "MSG", "receiver": "Leader", "content": "wrong: 41"}]"#,
        r#"[{"cate": "MSG", "receiver": "Leader", "content": "42"}]"#,
    ]));
    let watcher_llm = Arc::new(MockLlm::constant(
        r#"{"thought": "the worker miscounted", "replace": ["Worker"], "receiver": "Worker", "content": "recheck the arithmetic"}"#,
    ));
    let watcher = AgentBuilder::watcher(watcher_llm.clone()).build().unwrap();

    let scheduler = Scheduler::builder()
        .with_member(agent("Leader", "splits the task", leader_llm.clone()))
        .with_member(agent("Worker", "does arithmetic", worker_llm.clone()))
        .with_leader("Leader")
        .with_watcher(Arc::new(watcher))
        .with_watch_predicate(|m: &Message| m.content.starts_with("wrong"))
        .build()
        .unwrap();

    let answer = scheduler.run(TASK).await.unwrap();
    assert_eq!(answer, "FINAL ANSWER: 42");
    assert_eq!(watcher_llm.call_count(), 1);

    // The worker's wrong answer never reached the leader.
    assert_eq!(leader_llm.call_count(), 2);
    assert!(!leader_llm.prompts()[1].contains("wrong"));
    assert!(scheduler
        .env()
        .messages()
        .await
        .iter()
        .all(|m| !m.content.starts_with("wrong")));

    // The restarted worker saw the original request and the watcher's hint.
    let retry = &worker_llm.prompts()[1];
    assert!(retry.contains("(Leader -> me): compute 6*7"));
    assert!(retry.contains("(Hint from Global Watcher): recheck the arithmetic"));
}

#[tokio::test]
async fn test_message_to_missing_agent_is_fatal() {
    let leader_llm = Arc::new(MockLlm::constant(
        r#"[{"cate": "MSG", "receiver": "Ghost", "content": "anyone there?"}]"#,
    ));
    let scheduler = Scheduler::builder()
        .with_member(agent("Leader", "splits the task", leader_llm))
        .with_leader("Leader")
        .build()
        .unwrap();

    let err = scheduler.run(TASK).await.unwrap_err();
    assert_eq!(err.to_string(), "get unexpected agent Ghost");
    assert!(matches!(err, Error::NoSuchAgent(_)));
}

#[tokio::test]
async fn test_sop_expert_feeds_graph_leader() {
    let expert_llm = Arc::new(MockLlm::constant(
        "Here is the procedure:\n```dot\ndigraph {\n  collect [label=\"Collect facts\"];\n  answer [label=\"Answer\"];\n  collect -> answer;\n}\n```",
    ));
    let leader_llm = Arc::new(MockLlm::new(vec![
        r#"{"thought": "look it up", "action": "search", "input": "6*7", "node": "collect"}"#,
        r#"{"cate": "END", "content": "FINAL ANSWER: 42"}"#,
    ]));
    let search = Arc::new(RecordingTool::new("search", "web search", "42"));
    let leader = Arc::new(
        AgentBuilder::new("Leader")
            .with_description("follows the procedure")
            .with_llm(leader_llm.clone())
            .with_tool(search.clone())
            .build_graph()
            .unwrap(),
    );
    let expert = AgentBuilder::sop_expert(expert_llm.clone()).build().unwrap();

    let scheduler = Scheduler::builder()
        .with_member(leader.clone())
        .with_leader("Leader")
        .with_sop_expert(Arc::new(expert))
        .build()
        .unwrap();

    assert_eq!(scheduler.run(TASK).await.unwrap(), "FINAL ANSWER: 42");
    assert_eq!(expert_llm.call_count(), 1);
    assert!(scheduler.env().sop().await.contains("collect -> answer"));
    assert_eq!(search.calls(), vec!["6*7".to_string()]);

    let prompts = leader_llm.prompts();
    assert!(prompts[0].contains("- collect: Collect facts"));
    assert!(prompts[1].contains("- answer: Answer"));

    let driver = leader.driver().await.unwrap();
    assert_eq!(driver.color("collect"), Some(NodeColor::Executing));
    assert_eq!(driver.color("answer"), None);
}

#[tokio::test]
async fn test_watcher_resets_a_looping_agent() {
    let act = r#"{"thought": "look again", "action": "search", "input": "6*7"}"#;
    let leader_llm = Arc::new(MockLlm::new(vec![
        act,
        act,
        act,
        r#"{"cate": "END", "content": "FINAL ANSWER: 42"}"#,
    ]));
    let watcher_llm = Arc::new(MockLlm::constant(
        r#"{"thought": "stuck in a loop", "replace": ["Leader"], "content": "stop searching and answer"}"#,
    ));
    let search = Arc::new(RecordingTool::new("search", "web search", "no results"));
    let leader = AgentBuilder::new("Leader")
        .with_description("answers questions")
        .with_llm(leader_llm.clone())
        .with_tool(search.clone())
        .build()
        .unwrap();
    let watcher = AgentBuilder::watcher(watcher_llm.clone()).build().unwrap();

    let scheduler = Scheduler::builder()
        .with_config(&AppConfig::default())
        .with_member(Arc::new(leader))
        .with_leader("Leader")
        .with_watcher(Arc::new(watcher))
        .with_watch_predicate(|_: &Message| false)
        .build()
        .unwrap();

    assert_eq!(scheduler.run(TASK).await.unwrap(), "FINAL ANSWER: 42");
    assert_eq!(search.calls().len(), 3);
    // Only the step review after the third search ran the watcher.
    assert_eq!(watcher_llm.call_count(), 1);
    assert!(watcher_llm.prompts()[0].contains("Action history:"));

    let last = &leader_llm.prompts()[3];
    assert!(last.contains("(Hint from Global Watcher): stop searching and answer"));
    assert!(!last.contains("no results"));
}

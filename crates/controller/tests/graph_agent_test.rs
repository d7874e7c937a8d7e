use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use teamflow_controller::{AgentBuilder, NodeColor};
use teamflow_core::mocks::{MockLlm, RecordingTool};
use teamflow_core::traits::{Agent, AgentContext};
use teamflow_core::types::Message;
use teamflow_core::Error;

const SOP: &str = r#"digraph {
    collect [label="Collect"];
    search [label="Search"];
    collect -> search;
}"#;

fn task() -> Vec<Message> {
    vec![Message::msg("User", "Planner", "plan a trip")]
}

fn llm() -> Arc<MockLlm> {
    Arc::new(MockLlm::new(vec![
        r#"{"thought": "start", "action": "search", "input": "needs", "node": "collect"}"#,
        r#"[{"thought": "go", "action": "search", "input": "flights", "node": "search"}]"#,
        r#"{"cate": "END", "content": "booked"}"#,
    ]))
}

#[tokio::test]
async fn test_graph_agent_walks_the_sop() {
    let llm = llm();
    let search = Arc::new(RecordingTool::new("search", "web search", "ok"));
    let agent = AgentBuilder::new("Planner")
        .with_description("plans trips")
        .with_prompt("now:\n{{ current_nodes }}next:\n{{ next_nodes }}")
        .with_llm(llm.clone())
        .with_tool(search.clone())
        .with_sop(SOP)
        .build_graph()
        .unwrap();

    let generation = agent
        .run(task(), &AgentContext::new(CancellationToken::new()))
        .await
        .unwrap();
    assert_eq!(generation.messages[0].content, "booked");
    assert_eq!(search.calls().len(), 2);

    let prompts = llm.prompts();
    assert_eq!(prompts[0], "now:\nnext:\n- collect: Collect\n");
    assert_eq!(
        prompts[1],
        "now:\n- collect: Collect\nnext:\n- search: Search\n"
    );

    let driver = agent.driver().await.unwrap();
    assert_eq!(driver.color("collect"), Some(NodeColor::Done));
    assert_eq!(driver.color("search"), Some(NodeColor::Done));
    assert_eq!(driver.execution().edges().len(), 1);
}

#[tokio::test]
async fn test_graph_agent_needs_a_sop() {
    let agent = AgentBuilder::new("Planner")
        .with_description("plans trips")
        .with_llm(llm())
        .build_graph()
        .unwrap();

    let err = agent
        .run(task(), &AgentContext::new(CancellationToken::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingGraph));
}

#[tokio::test]
async fn test_graph_agent_takes_sop_from_context() {
    let llm = llm();
    let agent = AgentBuilder::new("Planner")
        .with_description("plans trips")
        .with_prompt("{{ all_nodes }}")
        .with_llm(llm.clone())
        .with_tool(Arc::new(RecordingTool::new("search", "web search", "ok")))
        .build_graph()
        .unwrap();
    assert!(agent.driver().await.is_none());

    let ctx = AgentContext::new(CancellationToken::new()).with_sop(SOP);
    agent.run(task(), &ctx).await.unwrap();

    assert_eq!(llm.prompts()[0], "collect");
    assert!(agent.driver().await.is_some());
}

#![deny(unused)]
//! Orchestration layer for Teamflow.
//!
//! This crate provides the message bus (log, team, environment), the agent
//! plan-act loop with output parsing and validation, SOP graph tracking, and
//! the scheduler that drives a team run with a concurrent watcher.

pub mod agent;
pub mod builder;
pub mod driver;
pub mod environment;
pub mod feedback;
pub mod graph;
pub mod graph_agent;
pub mod memory;
pub mod parser;
pub mod prompts;
pub mod registry;
pub mod scheduler;
pub mod sop;
pub mod team;
pub mod transcript;
pub mod watcher;

pub use agent::{BaseAgent, MemoryFilter};
pub use builder::{AgentBuilder, SOP_EXPERT_NAME, WATCHER_NAME};
pub use driver::{GraphDriver, RenderedStates};
pub use environment::{Dispatch, Environment};
pub use feedback::{ContentValidator, FeedbackChain, Review, Validator, Verdict};
pub use graph::{Edge, Graph, Node, NodeColor};
pub use graph_agent::GraphAgent;
pub use memory::MessageLog;
pub use parser::{parse_output, OutputFormat, ParsedOutput};
pub use registry::ToolRegistry;
pub use scheduler::{Scheduler, SchedulerBuilder, DEFAULT_SENDER};
pub use team::{Subscription, Team};
pub use watcher::{WatchPredicate, Watcher, WatcherHandle};

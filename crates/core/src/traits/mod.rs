//! Core traits for Teamflow.
//!
//! - `llm`: model capability (LlmClient) and its request/response types
//! - `tool`: tool capability (Tool)
//! - `agent`: agent contract (Agent) and the per-run context
//! - `events`: structured run events (EventEmitter)

pub mod agent;
pub mod events;
pub mod llm;
pub mod tool;

pub use agent::*;
pub use events::*;
pub use llm::*;
pub use tool::*;

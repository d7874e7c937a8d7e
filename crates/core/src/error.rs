//! Error types for Teamflow.

use thiserror::Error;

/// Result type alias using Teamflow's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Teamflow.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors (fatal at construction)
    // =========================================================================
    #[error("missing field LLM")]
    MissingLlm,

    #[error("missing agent name")]
    MissingName,

    #[error("missing agent description")]
    MissingDescription,

    #[error("missing prompt template")]
    MissingPrompt,

    #[error("missing sop graph")]
    MissingGraph,

    #[error("leader agent is not set")]
    MissingLeader,

    #[error("team has no members")]
    MissingTeam,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // =========================================================================
    // Agent Run Errors
    // =========================================================================
    #[error("agent {agent} not finished before max iterations ({iterations})")]
    NotFinished { agent: String, iterations: usize },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Model error: {0}")]
    Model(String),

    // =========================================================================
    // Scheduling Errors
    // =========================================================================
    #[error("get unexpected agent {0}")]
    NoSuchAgent(String),

    #[error("generating messages is nil for agent {0}")]
    EmptyGeneration(String),

    #[error("Turn budget exhausted: used {used}, limit {limit}")]
    TurnBudgetExhausted { used: u64, limit: u64 },

    #[error("Token budget exhausted: used {used}, limit {limit}")]
    TokenBudgetExhausted { used: u64, limit: u64 },

    #[error("no routable message left before an end message was produced")]
    Stalled,

    #[error("run cancelled")]
    Cancelled,

    // =========================================================================
    // Graph Errors
    // =========================================================================
    #[error("Graph error: {0}")]
    Graph(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Template error: {0}")]
    Template(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a tool execution error.
    pub fn tool_execution(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a model error.
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create a graph error.
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    /// Create a template error.
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error means a budget ran out rather than something broke.
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(
            self,
            Self::NotFinished { .. }
                | Self::TurnBudgetExhausted { .. }
                | Self::TokenBudgetExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_classification() {
        let err = Error::NotFinished {
            agent: "Writer".into(),
            iterations: 20,
        };
        assert!(err.is_budget_exhausted());
        assert!(Error::TokenBudgetExhausted { used: 11, limit: 10 }.is_budget_exhausted());
        assert!(!Error::NoSuchAgent("Ghost".into()).is_budget_exhausted());
        assert!(!Error::parse("bad json").is_budget_exhausted());
    }

    #[test]
    fn test_display_keeps_agent_name() {
        let err = Error::NoSuchAgent("Ghost".into());
        assert_eq!(err.to_string(), "get unexpected agent Ghost");
    }
}

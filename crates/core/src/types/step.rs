use serde::{Deserialize, Serialize};

use super::message::Message;

// =============================================================================
// Agent Run Types
// =============================================================================

/// One tool invocation attempt within an agent run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepAction {
    #[serde(default)]
    pub id: String,
    /// Tool name as written by the model.
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub thought: String,
    /// Tool input, always a string (nested objects are re-serialized).
    #[serde(default)]
    pub input: String,
    /// Workflow-graph node this action belongs to.
    #[serde(default)]
    pub node: String,
    /// Set when something about this step was rejected.
    #[serde(default)]
    pub feedback: String,
    /// Raw model output the step was parsed from.
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub observation: String,
}

impl StepAction {
    /// Create an action for the named tool.
    pub fn new(action: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            input: input.into(),
            ..Default::default()
        }
    }

    /// Synthetic step carrying a rejection back into the next prompt.
    pub fn feedback(feedback: impl Into<String>, log: impl Into<String>) -> Self {
        Self {
            feedback: feedback.into(),
            log: log.into(),
            ..Default::default()
        }
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = thought.into();
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    /// Whether this step carries a rejection instead of an observation.
    pub fn is_feedback(&self) -> bool {
        !self.feedback.is_empty()
    }
}

/// Why a round was rejected: a parse failure or a validator verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFeedback {
    pub feedback: String,
    /// Copy of the raw model output.
    pub log: String,
}

impl StepFeedback {
    pub fn new(feedback: impl Into<String>, log: impl Into<String>) -> Self {
        Self {
            feedback: feedback.into(),
            log: log.into(),
        }
    }
}

/// Result of a successful agent run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub messages: Vec<Message>,
    pub total_tokens: u64,
}

impl Generation {
    /// Wrap outbound messages, stamping the token count on the first one.
    pub fn new(mut messages: Vec<Message>, total_tokens: u64) -> Self {
        if let Some(first) = messages.first_mut() {
            first.token_cost = total_tokens;
        }
        Self {
            messages,
            total_tokens,
        }
    }
}

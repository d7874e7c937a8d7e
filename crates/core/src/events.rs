use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured run event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: String,
    /// Run the event belongs to (shared by every event of one scheduler run)
    pub run_id: Option<String>,
    /// Agent or component that triggered the event ('environment', 'scheduler', agent name)
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    /// Event-specific data
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: None,
            actor: "system".to_string(),
            timestamp: Utc::now(),
            event_type,
            payload,
        }
    }

    pub fn with_run(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Scheduler run began
    RunStarted,
    /// Scheduler run ended (answer or error)
    RunFinished,
    /// Message entered the bus
    MessageProduced,
    /// Message was taken off the bus for delivery
    MessageConsumed,
    /// SOP text replaced by an SOP-definition message
    SopUpdated,
    /// Agent invoked by the scheduler
    AgentStarted,
    /// Agent returned a generation
    AgentFinished,
    /// Tool call started
    ToolExecStarted,
    /// Tool call finished (observation or error)
    ToolExecFinished,
    /// Supervisory pass failed and was skipped
    WatcherFailed,
}

// Helper structs for common payloads

#[derive(Serialize, Deserialize)]
pub struct MessagePayload {
    pub cate: String,
    pub sender: String,
    pub receiver: String,
    pub token: u64,
}

#[derive(Serialize, Deserialize)]
pub struct ToolExecPayload {
    pub tool_name: String,
    pub input: String,
    pub output: Option<String>,
    pub error: Option<String>,
}

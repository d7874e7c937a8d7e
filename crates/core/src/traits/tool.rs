//! Tool capability trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::traits::llm::{FunctionDefinition, ToolSpec};

/// Tool an agent can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model refers to; matched case-insensitively.
    fn name(&self) -> &str;

    /// Human-readable description shown in the tool catalog.
    fn description(&self) -> &str;

    /// JSON Schema for the input.
    fn schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    /// Whether the backend should enforce the schema strictly.
    fn strict(&self) -> bool {
        false
    }

    /// Run the tool on the raw input string.
    async fn call(&self, input: &str) -> Result<String>;
}

/// Describe a tool for native function calling.
pub fn tool_spec(tool: &dyn Tool) -> ToolSpec {
    ToolSpec::function(FunctionDefinition {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.schema(),
        strict: tool.strict(),
    })
}

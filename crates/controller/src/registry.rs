//! Per-agent tool registry.

use dashmap::DashMap;
use std::sync::Arc;

use teamflow_core::{
    traits::{tool_spec, Tool, ToolSpec},
    Error, Result,
};

/// Tools keyed by lower-cased name, so lookups are case-insensitive.
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique ignoring case.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let key = tool.name().to_lowercase();
        if self.tools.contains_key(&key) {
            return Err(Error::internal(format!(
                "Tool '{}' is already registered",
                tool.name()
            )));
        }
        tracing::debug!(tool = %tool.name(), "Registering tool");
        self.tools.insert(key, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .get(&name.trim().to_lowercase())
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tools sorted by name.
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self.tools.iter().map(|e| e.value().clone()).collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// Function-calling descriptions of every tool.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.list().iter().map(|t| tool_spec(t.as_ref())).collect()
    }

    /// `a, b, c`
    pub fn names(&self) -> String {
        self.list()
            .iter()
            .map(|t| t.name().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// One `- name: description` line per tool.
    pub fn descriptions(&self) -> String {
        self.list()
            .iter()
            .map(|t| format!("- {}: {}\n", t.name(), t.description()))
            .collect()
    }
}

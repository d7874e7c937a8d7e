//! Mock implementations of core traits for testing.
//!
//! Scripted models, recording tools and a recording event emitter, shared by
//! the unit tests of every crate and by the workspace scenario tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    events::{EventEnvelope, EventType},
    traits::{
        Agent, AgentContext, EventEmitter, GenerateOptions, LlmClient, LlmResponse, Tool,
    },
    types::{Generation, Message},
    Error, Result,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Mock LLM Client
// =============================================================================

/// Scripted mock LLM that replays responses in order.
///
/// Once the script is exhausted the last response repeats. Every prompt is
/// recorded so tests can inspect what the agent actually sent.
pub struct MockLlm {
    responses: Mutex<VecDeque<LlmResponse>>,
    last: Mutex<Option<LlmResponse>>,
    prompts: Mutex<Vec<String>>,
    options: Mutex<Vec<GenerateOptions>>,
}

impl MockLlm {
    /// Create a mock with a queue of text responses.
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self::with_responses(
            responses
                .into_iter()
                .map(|r| LlmResponse::text(r).with_usage(10, 20))
                .collect(),
        )
    }

    /// Create a mock with fully specified responses (tool calls, usage).
    pub fn with_responses(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn constant(response: &str) -> Self {
        Self::new(vec![response])
    }

    /// Get the number of calls made to this mock.
    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    /// Options received so far, oldest first.
    pub fn options(&self) -> Vec<GenerateOptions> {
        lock(&self.options).clone()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<LlmResponse> {
        lock(&self.prompts).push(prompt.to_string());
        lock(&self.options).push(options.clone());

        let next = lock(&self.responses).pop_front();
        let mut last = lock(&self.last);
        match next {
            Some(response) => {
                *last = Some(response.clone());
                Ok(response)
            }
            None => last
                .clone()
                .ok_or_else(|| Error::model("mock LLM has no scripted responses")),
        }
    }
}

/// Mock LLM whose every call fails.
pub struct FailingLlm {
    message: String,
}

impl FailingLlm {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for FailingLlm {
    async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<LlmResponse> {
        Err(Error::model(self.message.clone()))
    }
}

// =============================================================================
// Mock Tools
// =============================================================================

/// Mock tool that records calls.
pub struct RecordingTool {
    name: String,
    description: String,
    response: String,
    calls: Mutex<Vec<String>>,
}

impl RecordingTool {
    pub fn new(name: &str, description: &str, response: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            response: response.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Inputs received so far.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, input: &str) -> Result<String> {
        lock(&self.calls).push(input.to_string());
        Ok(self.response.clone())
    }
}

/// Mock tool that always fails.
pub struct FailingTool {
    name: String,
    error: String,
}

impl FailingTool {
    pub fn new(name: &str, error: &str) -> Self {
        Self {
            name: name.to_string(),
            error: error.to_string(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "always fails"
    }

    async fn call(&self, _input: &str) -> Result<String> {
        Err(Error::tool_execution(self.error.clone()))
    }
}

// =============================================================================
// Mock Agents
// =============================================================================

/// Agent that replays scripted generations and records what it was shown.
pub struct ScriptedAgent {
    name: String,
    description: String,
    script: Mutex<VecDeque<Result<Vec<Message>>>>,
    seen: Mutex<Vec<Vec<Message>>>,
    contexts: Mutex<Vec<AgentContext>>,
}

impl ScriptedAgent {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            script: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Queue the messages returned by the next run.
    pub fn then_reply(self, messages: Vec<Message>) -> Self {
        lock(&self.script).push_back(Ok(messages));
        self
    }

    /// Queue a failure for the next run.
    pub fn then_fail(self, error: Error) -> Self {
        lock(&self.script).push_back(Err(error));
        self
    }

    /// Message histories received, one per run.
    pub fn seen(&self) -> Vec<Vec<Message>> {
        lock(&self.seen).clone()
    }

    /// Contexts received, one per run.
    pub fn contexts(&self) -> Vec<AgentContext> {
        lock(&self.contexts).clone()
    }

    pub fn run_count(&self) -> usize {
        lock(&self.seen).len()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, messages: Vec<Message>, ctx: &AgentContext) -> Result<Generation> {
        lock(&self.seen).push(messages);
        lock(&self.contexts).push(ctx.clone());

        let next = lock(&self.script).pop_front();
        match next {
            Some(Ok(messages)) => {
                let messages = messages
                    .into_iter()
                    .map(|mut m| {
                        if m.sender.is_empty() {
                            m.sender = self.name.clone();
                        }
                        m
                    })
                    .collect();
                Ok(Generation::new(messages, 0))
            }
            Some(Err(e)) => Err(e),
            None => Ok(Generation::default()),
        }
    }
}

// =============================================================================
// Mock Event Emitter
// =============================================================================

/// Event emitter that keeps every event in memory.
#[derive(Default, Clone)]
pub struct RecordingEmitter {
    events: Arc<Mutex<Vec<EventEnvelope>>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventEnvelope> {
        lock(&self.events).clone()
    }

    /// Count events of one type.
    pub fn count(&self, event_type: EventType) -> usize {
        lock(&self.events)
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl EventEmitter for RecordingEmitter {
    async fn emit(&self, event: EventEnvelope) {
        lock(&self.events).push(event);
    }
}

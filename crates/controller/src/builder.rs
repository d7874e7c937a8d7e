//! Builder for model-driven agents.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use teamflow_core::{
    config::AgentConfig,
    traits::{noop_emitter, EventEmitter, LlmClient, Tool},
    types::Message,
    Error, PromptTemplate, Result,
};

use crate::agent::{BaseAgent, MemoryFilter, DEFAULT_FEEDBACK_RESET_THRESHOLD, DEFAULT_MAX_ITERATIONS};
use crate::driver::GraphDriver;
use crate::feedback::{ContentValidator, FeedbackChain, Validator};
use crate::graph_agent::GraphAgent;
use crate::parser::OutputFormat;
use crate::prompts::{BASE_PROMPT, GRAPH_PROMPT, SOP_EXPERT_PROMPT, WATCHER_PROMPT};
use crate::registry::ToolRegistry;
use crate::transcript::WATCHER_SENDER;

/// Name of the preset SOP expert.
pub const SOP_EXPERT_NAME: &str = "SopExpert";

/// Name of the preset watcher.
pub const WATCHER_NAME: &str = WATCHER_SENDER;

/// Builder for [`BaseAgent`] and [`GraphAgent`].
pub struct AgentBuilder {
    name: String,
    description: String,
    role: String,
    prompt: Option<String>,
    llm: Option<Arc<dyn LlmClient>>,
    tools: Vec<Arc<dyn Tool>>,
    vars: HashMap<String, String>,
    chain: FeedbackChain,
    max_iterations: usize,
    feedback_reset_threshold: usize,
    use_function_call: bool,
    format: Option<OutputFormat>,
    memory_filter: Option<MemoryFilter>,
    emitter: Arc<dyn EventEmitter>,
    sop: String,
}

impl AgentBuilder {
    /// Start a builder; the content validator is on by default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            role: String::new(),
            prompt: None,
            llm: None,
            tools: Vec::new(),
            vars: HashMap::new(),
            chain: FeedbackChain::new().with(Arc::new(ContentValidator)),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            feedback_reset_threshold: DEFAULT_FEEDBACK_RESET_THRESHOLD,
            use_function_call: false,
            format: None,
            memory_filter: None,
            emitter: noop_emitter(),
            sop: String::new(),
        }
    }

    /// Preset for the agent that writes the SOP graph.
    pub fn sop_expert(llm: Arc<dyn LlmClient>) -> Self {
        Self::new(SOP_EXPERT_NAME)
            .with_description("an expert who turns a task into a standard operating procedure graph")
            .with_prompt(SOP_EXPERT_PROMPT)
            .with_llm(llm)
            .with_format(OutputFormat::Sop)
    }

    /// Preset for the supervisor that may remove or restart agents.
    ///
    /// Its output may carry no content, so the content validator is off.
    pub fn watcher(llm: Arc<dyn LlmClient>) -> Self {
        Self::new(WATCHER_NAME)
            .with_description("a supervisor who watches the team and restarts agents that go astray")
            .with_prompt(WATCHER_PROMPT)
            .with_llm(llm)
            .with_format(OutputFormat::Management)
            .with_feedback_chain(FeedbackChain::new())
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Replace the default prompt template.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Extra template input; built-in inputs win on conflict.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Append a validator after the existing ones.
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.chain.push(validator);
        self
    }

    /// Replace the whole validator chain.
    pub fn with_feedback_chain(mut self, chain: FeedbackChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_feedback_reset_threshold(mut self, threshold: usize) -> Self {
        self.feedback_reset_threshold = threshold;
        self
    }

    /// Send tools as native function definitions instead of prompt text.
    pub fn with_function_call(mut self, enabled: bool) -> Self {
        self.use_function_call = enabled;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_memory_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Vec<Message>) -> Vec<Message> + Send + Sync + 'static,
    {
        self.memory_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// SOP for a graph agent; otherwise taken from the run context.
    pub fn with_sop(mut self, sop: impl Into<String>) -> Self {
        self.sop = sop.into();
        self
    }

    /// Apply iteration, feedback and function-call settings.
    pub fn with_config(mut self, config: &AgentConfig) -> Self {
        self.max_iterations = config.max_iterations;
        self.feedback_reset_threshold = config.feedback_reset_threshold;
        self.use_function_call = config.use_function_call;
        self
    }

    pub fn build(self) -> Result<BaseAgent> {
        self.build_base(BASE_PROMPT, OutputFormat::Standard)
    }

    /// Build a graph agent. An SOP given here is parsed immediately.
    pub fn build_graph(self) -> Result<GraphAgent> {
        let sop = self.sop.clone();
        let driver = if sop.trim().is_empty() {
            None
        } else {
            Some(GraphDriver::from_sop(&sop)?)
        };
        let base = self.build_base(GRAPH_PROMPT, OutputFormat::Graph)?;

        Ok(GraphAgent {
            base,
            sop,
            driver: Mutex::new(driver),
        })
    }

    fn build_base(self, default_prompt: &str, default_format: OutputFormat) -> Result<BaseAgent> {
        if self.name.trim().is_empty() {
            return Err(Error::MissingName);
        }
        if self.description.trim().is_empty() {
            return Err(Error::MissingDescription);
        }
        let template = PromptTemplate::new(self.prompt.as_deref().unwrap_or(default_prompt))?;
        let llm = self.llm.ok_or(Error::MissingLlm)?;

        let tools = ToolRegistry::new();
        for tool in self.tools {
            tools.register(tool)?;
        }

        Ok(BaseAgent {
            name: self.name,
            description: self.description,
            role: self.role,
            llm,
            tools,
            template,
            vars: self.vars,
            chain: self.chain,
            max_iterations: self.max_iterations,
            feedback_reset_threshold: self.feedback_reset_threshold,
            use_function_call: self.use_function_call,
            format: self.format.unwrap_or(default_format),
            memory_filter: self.memory_filter,
            emitter: self.emitter,
        })
    }
}

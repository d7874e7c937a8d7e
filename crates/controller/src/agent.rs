//! Plan-act loop shared by every model-driven agent.
//!
//! Each round renders the prompt, calls the model, parses the answer, runs
//! the validator chain, then either executes the proposed actions or returns
//! the proposed messages. Rejections and tool failures are fed back into the
//! next round's transcript instead of aborting the run.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use teamflow_core::{
    traits::{Agent, AgentContext, EventEmitter, GenerateOptions, LlmClient, LlmResponse},
    types::{Generation, Message, StepAction, StepFeedback},
    EventEnvelope, EventType, Error, PromptTemplate, Result, ToolExecPayload,
};

use crate::driver::GraphDriver;
use crate::feedback::{FeedbackChain, Review};
use crate::parser::{parse_output, strip_reasoning, OutputFormat, ParsedOutput};
use crate::registry::ToolRegistry;
use crate::transcript::{peer_descriptions, peer_names, render_history, WATCHER_SENDER};

pub const DEFAULT_MAX_ITERATIONS: usize = 20;
pub const DEFAULT_FEEDBACK_RESET_THRESHOLD: usize = 5;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Rewrites the visible history before the first round.
pub type MemoryFilter = Arc<dyn Fn(Vec<Message>) -> Vec<Message> + Send + Sync>;

/// Agent answering through a prompt template and a tool registry.
///
/// Built with [`crate::builder::AgentBuilder`].
pub struct BaseAgent {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) role: String,
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) tools: ToolRegistry,
    pub(crate) template: PromptTemplate,
    pub(crate) vars: HashMap<String, String>,
    pub(crate) chain: FeedbackChain,
    pub(crate) max_iterations: usize,
    pub(crate) feedback_reset_threshold: usize,
    pub(crate) use_function_call: bool,
    pub(crate) format: OutputFormat,
    pub(crate) memory_filter: Option<MemoryFilter>,
    pub(crate) emitter: Arc<dyn EventEmitter>,
}

/// Outcome of one planning round.
struct Plan {
    parsed: ParsedOutput,
    /// Set when parsing failed or a validator rejected the output.
    feedback: Option<StepFeedback>,
    tokens: u64,
}

impl BaseAgent {
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run the loop; with a driver, graph projections join the prompt and
    /// every action round advances the driver.
    pub(crate) async fn run_loop(
        &self,
        mut messages: Vec<Message>,
        ctx: &AgentContext,
        mut driver: Option<&mut GraphDriver>,
    ) -> Result<Generation> {
        if let Some(filter) = &self.memory_filter {
            messages = filter(messages);
        }

        tracing::info!(
            agent = %self.name,
            messages = messages.len(),
            max_iterations = self.max_iterations,
            "Agent run started"
        );
        self.emit(
            EventType::AgentStarted,
            serde_json::json!({ "messages": messages.len() }),
        )
        .await;

        let mut steps: Vec<StepAction> = Vec::new();
        let mut tokens: u64 = 0;
        let mut total_feedbacks: usize = 0;

        for iteration in 0..self.max_iterations {
            if total_feedbacks > self.feedback_reset_threshold {
                tracing::debug!(
                    agent = %self.name,
                    iteration,
                    feedbacks = total_feedbacks,
                    "Too many rejections, clearing step history"
                );
                steps.clear();
                total_feedbacks = 0;
            }

            let plan = self
                .plan(&messages, &steps, ctx, driver.as_deref())
                .await?;
            tokens += plan.tokens;

            if let Some(rejection) = plan.feedback {
                total_feedbacks += 1;
                steps.push(StepAction::feedback(
                    format!("- {}\n", rejection.feedback),
                    rejection.log,
                ));
                continue;
            }

            let ParsedOutput {
                mut actions,
                messages: mut outbound,
            } = plan.parsed;

            if actions.is_empty() && outbound.is_empty() {
                steps.push(StepAction::default());
                continue;
            }

            if !actions.is_empty() {
                for action in &mut actions {
                    self.execute(action, ctx).await?;
                }
                steps.extend(actions.iter().cloned());
                if let Some(driver) = driver.as_deref_mut() {
                    driver.update_graph_state(&steps, &actions);
                }

                if let Some(hint) = self.watch_steps(&steps, ctx).await {
                    messages.push(Message::msg(WATCHER_SENDER, &self.name, hint));
                    steps.clear();
                    total_feedbacks = 0;
                    continue;
                }
            }

            if !outbound.is_empty() {
                for msg in &mut outbound {
                    if msg.sender.is_empty() {
                        msg.sender = self.name.clone();
                    }
                }
                tracing::info!(
                    agent = %self.name,
                    iteration,
                    messages = outbound.len(),
                    tokens,
                    "Agent run finished"
                );
                self.emit(
                    EventType::AgentFinished,
                    serde_json::json!({
                        "iterations": iteration + 1,
                        "messages": outbound.len(),
                        "tokens": tokens,
                    }),
                )
                .await;
                return Ok(Generation::new(outbound, tokens));
            }
        }

        tracing::warn!(
            agent = %self.name,
            iterations = self.max_iterations,
            "Agent did not finish"
        );
        Err(Error::NotFinished {
            agent: self.name.clone(),
            iterations: self.max_iterations,
        })
    }

    async fn plan(
        &self,
        messages: &[Message],
        steps: &[StepAction],
        ctx: &AgentContext,
        driver: Option<&GraphDriver>,
    ) -> Result<Plan> {
        let mut options = ctx.options.clone();
        let inputs = self.prompt_inputs(messages, steps, ctx, driver, &mut options);
        let prompt = self.template.render(&inputs)?;
        tracing::debug!(agent = %self.name, prompt_len = prompt.len(), "Calling model");

        let mut response: LlmResponse = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
            response = self.llm.generate(&prompt, &options) => response?,
        };
        let tokens = response.usage.total_tokens;
        response.content = strip_reasoning(&response.content).to_string();
        let raw = response.content.clone();

        let parsed = match parse_output(self.format, &self.name, &response) {
            Ok(parsed) => parsed,
            Err(e) => {
                let reason = match e {
                    Error::Parse(reason) => reason,
                    other => other.to_string(),
                };
                tracing::debug!(agent = %self.name, reason = %reason, "Unparseable output");
                return Ok(Plan {
                    parsed: ParsedOutput::default(),
                    feedback: Some(StepFeedback::new(
                        format!("parse output failed with error: {}", reason),
                        raw,
                    )),
                    tokens,
                });
            }
        };

        let review = Review {
            agent: &self.name,
            messages: &parsed.messages,
            actions: &parsed.actions,
            steps,
            peers: &ctx.peers,
            prompt: &prompt,
        };
        let feedback = self
            .chain
            .review(&review)
            .await
            .map(|reason| StepFeedback::new(reason, raw));

        Ok(Plan {
            parsed,
            feedback,
            tokens,
        })
    }

    fn prompt_inputs(
        &self,
        messages: &[Message],
        steps: &[StepAction],
        ctx: &AgentContext,
        driver: Option<&GraphDriver>,
        options: &mut GenerateOptions,
    ) -> HashMap<String, String> {
        let mut inputs = self.vars.clone();

        if self.use_function_call {
            options.tools = self.tools.specs();
            inputs.insert("tool_names".into(), String::new());
            inputs.insert("tool_descriptions".into(), String::new());
        } else {
            inputs.insert("tool_names".into(), self.tools.names());
            inputs.insert("tool_descriptions".into(), self.tools.descriptions());
        }

        inputs.insert("name".into(), self.name.clone());
        inputs.insert("description".into(), self.description.clone());
        inputs.insert("role".into(), self.role.clone());
        inputs.insert("history".into(), render_history(&self.name, messages, steps));
        inputs.insert(
            "current".into(),
            chrono::Local::now().format(TIME_FORMAT).to_string(),
        );
        inputs.insert("agent_names".into(), peer_names(&ctx.peers));
        inputs.insert("agent_descriptions".into(), peer_descriptions(&ctx.peers));
        inputs.insert("sop".into(), ctx.sop.clone());
        inputs.insert(
            "question".into(),
            messages.first().map(|m| m.content.clone()).unwrap_or_default(),
        );

        if let Some(driver) = driver {
            let states = driver.render_states();
            inputs.insert("current_nodes".into(), states.current);
            inputs.insert("next_nodes".into(), states.next);
            inputs.insert("all_nodes".into(), states.all);
            inputs.insert("current_sop".into(), driver.render_without_annotations());
        }
        inputs
    }

    /// Let the step watcher look at the step history every
    /// `watch_interval` steps. A hint means the history should be dropped.
    async fn watch_steps(&self, steps: &[StepAction], ctx: &AgentContext) -> Option<String> {
        let watcher = ctx.step_watcher.as_ref()?;
        if ctx.watch_interval == 0 || steps.is_empty() || steps.len() % ctx.watch_interval != 0 {
            return None;
        }

        tracing::debug!(agent = %self.name, steps = steps.len(), "Asking watcher to review steps");
        let hint = watcher.review_steps(&self.name, steps, &ctx.cancel).await?;
        tracing::info!(agent = %self.name, steps = steps.len(), "Watcher reset step history");
        Some(hint)
    }

    /// Run one action, recording its observation or the reason it failed.
    ///
    /// Only cancellation aborts the run.
    async fn execute(&self, action: &mut StepAction, ctx: &AgentContext) -> Result<()> {
        let Some(tool) = self.tools.get(&action.action) else {
            tracing::warn!(agent = %self.name, tool = %action.action, "Unknown tool");
            action.feedback.push_str(&format!(
                "- {} is not a valid tool, please check your answer\n",
                action.action
            ));
            return Ok(());
        };

        tracing::info!(agent = %self.name, tool = %tool.name(), "Executing tool call");
        self.emit(
            EventType::ToolExecStarted,
            serde_json::to_value(ToolExecPayload {
                tool_name: tool.name().to_string(),
                input: action.input.clone(),
                output: None,
                error: None,
            })
            .unwrap_or_default(),
        )
        .await;

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
            result = tool.call(&action.input) => result,
        };

        let (output, error) = match result {
            Ok(observation) => {
                action.observation = observation;
                (Some(action.observation.clone()), None)
            }
            Err(e) => {
                tracing::warn!(agent = %self.name, tool = %tool.name(), error = %e, "Tool failed");
                action.feedback = e.to_string();
                (None, Some(action.feedback.clone()))
            }
        };
        self.emit(
            EventType::ToolExecFinished,
            serde_json::to_value(ToolExecPayload {
                tool_name: tool.name().to_string(),
                input: action.input.clone(),
                output,
                error,
            })
            .unwrap_or_default(),
        )
        .await;
        Ok(())
    }

    async fn emit(&self, event_type: EventType, payload: serde_json::Value) {
        self.emitter
            .emit(EventEnvelope::new(event_type, payload).with_actor(&self.name))
            .await;
    }
}

#[async_trait]
impl Agent for BaseAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, messages: Vec<Message>, ctx: &AgentContext) -> Result<Generation> {
        self.run_loop(messages, ctx, None).await
    }
}

//! Top-level driver of a team run.
//!
//! A run initialises subscriptions, lets the SOP expert write an SOP when
//! none is set, starts the watcher, then loops: consume the next message,
//! stop on an end-message, otherwise run every resolved receiver and produce
//! what it answers.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use teamflow_core::{
    config::{AppConfig, SubscribeMode},
    events::{EventEnvelope, EventType},
    traits::{noop_emitter, Agent, AgentContext, EventEmitter, GenerateOptions},
    types::Message,
    Error, Result,
};
use teamflow_governance::RunBudget;

use crate::environment::Environment;
use crate::memory::MessageLog;
use crate::team::{Subscription, Team};
use crate::watcher::{WatchPredicate, Watcher, WatcherHandle};

/// Sender of the seed message and of the standing task reminder.
pub const DEFAULT_SENDER: &str = "User";

/// Receiver of the standing task reminder.
pub const REMINDER_RECEIVER: &str = "All";

/// Drives one team through a task.
pub struct Scheduler {
    env: Arc<Environment>,
    sop_expert: Option<Arc<dyn Agent>>,
    watcher: Option<Arc<dyn Agent>>,
    watch_predicate: Option<WatchPredicate>,
    watch_interval: usize,
    options: GenerateOptions,
    emitter: Arc<dyn EventEmitter>,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }

    /// Run `task` to completion and return the end-message content.
    pub async fn run(&self, task: &str) -> Result<String> {
        self.run_with_cancel(task, CancellationToken::new()).await
    }

    /// Like [`Scheduler::run`]; cancelling `cancel` aborts in-flight model
    /// and tool calls with [`Error::Cancelled`].
    pub async fn run_with_cancel(&self, task: &str, cancel: CancellationToken) -> Result<String> {
        let run_id = Uuid::new_v4().to_string();
        self.emit_run(
            &run_id,
            EventType::RunStarted,
            serde_json::json!({ "task": task }),
        )
        .await;

        let result = self.run_inner(&run_id, task, cancel).await;

        let payload = match &result {
            Ok(answer) => serde_json::json!({ "answer": answer }),
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        };
        self.emit_run(&run_id, EventType::RunFinished, payload).await;
        result
    }

    async fn emit_run(&self, run_id: &str, event_type: EventType, payload: serde_json::Value) {
        self.emitter
            .emit(
                EventEnvelope::new(event_type, payload)
                    .with_run(run_id)
                    .with_actor("scheduler"),
            )
            .await;
    }

    async fn run_inner(&self, run_id: &str, task: &str, cancel: CancellationToken) -> Result<String> {
        tracing::info!(run_id = %run_id, task_len = task.len(), "Run started");
        self.env.init_subscriptions().await?;
        self.build_sop(task, &cancel).await?;

        let watcher = self.watcher.as_ref().map(|agent| {
            Watcher::new(agent.clone(), self.env.clone(), self.emitter.clone())
                .with_predicate(self.watch_predicate.clone())
                .with_options(self.options.clone())
                .spawn(cancel.child_token())
        });

        let result = self.schedule(task, &cancel, watcher.as_ref()).await;
        if let Some(watcher) = watcher {
            watcher.shutdown().await;
        }

        let tokens = self.env.tokens().await;
        match &result {
            Ok(answer) => tracing::info!(
                run_id = %run_id,
                answer_len = answer.len(),
                tokens,
                "Run finished"
            ),
            Err(e) => tracing::warn!(run_id = %run_id, error = %e, "Run failed"),
        }
        result
    }

    /// Ask the SOP expert for an SOP when none is set yet.
    async fn build_sop(&self, task: &str, cancel: &CancellationToken) -> Result<()> {
        let Some(expert) = &self.sop_expert else {
            return Ok(());
        };
        if !self.env.sop().await.is_empty() {
            return Ok(());
        }

        tracing::info!(expert = %expert.name(), "Building SOP");
        let ctx = self.context_for(expert.name(), cancel).await;
        let seed = Message::msg(DEFAULT_SENDER, expert.name(), task);
        let generation = expert.run(vec![seed], &ctx).await?;
        self.env.produce(generation.messages).await
    }

    async fn schedule(
        &self,
        task: &str,
        cancel: &CancellationToken,
        watcher: Option<&WatcherHandle>,
    ) -> Result<String> {
        let leader = self.env.leader().await.ok_or(Error::MissingLeader)?;
        self.env
            .produce(vec![Message::msg(DEFAULT_SENDER, leader.name(), task)])
            .await?;

        while let Some(msg) = self.env.consume().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if msg.is_end() {
                tracing::info!(sender = %msg.sender, "End message received");
                return Ok(msg.content);
            }

            let receivers = msg.receivers();
            for receiver in &receivers {
                let Some(agent) = self.env.agent(receiver).await else {
                    if receivers.len() == 1 {
                        return Err(Error::NoSuchAgent(msg.receiver.clone()));
                    }
                    tracing::warn!(receiver = %receiver, "Skipping unknown receiver");
                    continue;
                };

                let mut messages = self.env.load_memory(agent.name()).await;
                if msg.sender != DEFAULT_SENDER {
                    messages.insert(0, Message::msg(DEFAULT_SENDER, REMINDER_RECEIVER, task));
                }

                tracing::info!(
                    sender = %msg.sender,
                    receiver = %agent.name(),
                    visible = messages.len(),
                    "Dispatching to agent"
                );
                let mut ctx = self.context_for(agent.name(), cancel).await;
                if let Some(watcher) = watcher.filter(|_| self.watch_interval > 0) {
                    ctx = ctx.with_step_watcher(watcher.step_watcher(), self.watch_interval);
                }
                let generation = agent.run(messages, &ctx).await?;
                if generation.messages.is_empty() {
                    return Err(Error::EmptyGeneration(agent.name().to_string()));
                }

                self.env.produce(generation.messages.clone()).await?;
                if let Some(watcher) = watcher {
                    for produced in generation.messages {
                        if let Err(e) = watcher.notify(produced).await {
                            tracing::warn!(error = %e, "Watcher hand-off failed");
                        }
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.env.budget_exhaustion().await {
            Some(exhaustion) => Err(exhaustion.into()),
            None => Err(Error::Stalled),
        }
    }

    async fn context_for(&self, name: &str, cancel: &CancellationToken) -> AgentContext {
        AgentContext::new(cancel.clone())
            .with_peers(self.env.subscribed_peers(name).await)
            .with_sop(self.env.sop().await)
            .with_options(self.options.clone())
    }
}

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
    members: Vec<Arc<dyn Agent>>,
    leader: Option<String>,
    subscriptions: Vec<Subscription>,
    subscribe_mode: SubscribeMode,
    sop_expert: Option<Arc<dyn Agent>>,
    planner: Option<Arc<dyn Agent>>,
    watcher: Option<Arc<dyn Agent>>,
    watch_predicate: Option<WatchPredicate>,
    watch_interval: usize,
    max_turns: u64,
    max_tokens: u64,
    window: usize,
    sop: String,
    options: GenerateOptions,
    emitter: Arc<dyn EventEmitter>,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerBuilder {
    /// Defaults follow [`AppConfig::default`].
    pub fn new() -> Self {
        let config = AppConfig::default();
        Self {
            members: Vec::new(),
            leader: None,
            subscriptions: Vec::new(),
            subscribe_mode: config.scheduler.subscribe_mode,
            sop_expert: None,
            planner: None,
            watcher: None,
            watch_predicate: None,
            watch_interval: config.scheduler.watch_interval,
            max_turns: config.scheduler.max_turns,
            max_tokens: config.scheduler.max_tokens,
            window: config.memory.window,
            sop: String::new(),
            options: GenerateOptions::default(),
            emitter: noop_emitter(),
        }
    }

    /// Apply budgets, subscribe mode, watch interval and memory window.
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.max_turns = config.scheduler.max_turns;
        self.max_tokens = config.scheduler.max_tokens;
        self.subscribe_mode = config.scheduler.subscribe_mode;
        self.watch_interval = config.scheduler.watch_interval;
        self.window = config.memory.window;
        self
    }

    pub fn with_member(mut self, agent: Arc<dyn Agent>) -> Self {
        self.members.push(agent);
        self
    }

    pub fn with_members(mut self, agents: impl IntoIterator<Item = Arc<dyn Agent>>) -> Self {
        self.members.extend(agents);
        self
    }

    /// Name of the member who receives the task.
    pub fn with_leader(mut self, name: impl Into<String>) -> Self {
        self.leader = Some(name.into());
        self
    }

    /// Explicit edges, used by [`SubscribeMode::Custom`] and added to the
    /// derived ones otherwise.
    pub fn with_subscriptions(mut self, subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        self.subscriptions.extend(subscriptions);
        self
    }

    pub fn with_subscribe_mode(mut self, mode: SubscribeMode) -> Self {
        self.subscribe_mode = mode;
        self
    }

    pub fn with_sop_expert(mut self, agent: Arc<dyn Agent>) -> Self {
        self.sop_expert = Some(agent);
        self
    }

    /// Team member that sees the whole log and may address everyone.
    pub fn with_planner(mut self, agent: Arc<dyn Agent>) -> Self {
        self.planner = Some(agent);
        self
    }

    pub fn with_watcher(mut self, agent: Arc<dyn Agent>) -> Self {
        self.watcher = Some(agent);
        self
    }

    /// Only mirrored messages passing `predicate` wake the watcher.
    pub fn with_watch_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.watch_predicate = Some(Arc::new(predicate));
        self
    }

    /// Have the watcher review a running agent every `interval` tool steps.
    /// 0 disables step reviews.
    pub fn with_watch_interval(mut self, interval: usize) -> Self {
        self.watch_interval = interval;
        self
    }

    /// 0 disables the limit.
    pub fn with_max_turns(mut self, max_turns: u64) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// 0 disables the limit.
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_memory_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Start with this SOP; the SOP expert is then skipped.
    pub fn with_sop(mut self, sop: impl Into<String>) -> Self {
        self.sop = sop.into();
        self
    }

    /// Options forwarded to every agent's model calls.
    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn build(self) -> Result<Scheduler> {
        let mut members = self.members;
        if let Some(planner) = &self.planner {
            if !members.iter().any(|m| m.name().eq_ignore_ascii_case(planner.name())) {
                members.push(planner.clone());
            }
        }
        if members.is_empty() {
            return Err(Error::MissingTeam);
        }
        let leader = self.leader.ok_or(Error::MissingLeader)?;
        let leader = members
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(leader.trim()))
            .map(|m| m.name().to_string())
            .ok_or(Error::MissingLeader)?;

        let mut team = Team::new(self.subscribe_mode);
        team.add_members(members);
        team.set_leader(leader);
        team.add_subscriptions(self.subscriptions);

        let mut env = Environment::new(team)
            .with_log(MessageLog::with_window(self.window))
            .with_budget(RunBudget::new(self.max_turns, self.max_tokens))
            .with_sop(self.sop)
            .with_emitter(self.emitter.clone());
        for role in [&self.sop_expert, &self.planner, &self.watcher]
            .into_iter()
            .flatten()
        {
            env = env.with_global_role(role.name());
        }

        Ok(Scheduler {
            env: Arc::new(env),
            sop_expert: self.sop_expert,
            watcher: self.watcher,
            watch_predicate: self.watch_predicate,
            watch_interval: self.watch_interval,
            options: self.options,
            emitter: self.emitter,
        })
    }
}

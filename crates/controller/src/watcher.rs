//! Background supervision of a scheduler run.
//!
//! The scheduler mirrors every produced message to the watcher through a
//! rendezvous. Each hand-off carries a oneshot acknowledgment and the
//! scheduler waits for it before mirroring the next message, so the ack, not
//! the channel capacity, is what holds the scheduler back. The watcher sees
//! messages in production order and its output is on the bus before the
//! scheduler moves on.
//!
//! The same watcher also reviews the tool steps of a running agent through
//! [`StepWatcher`], and may tell it to drop them and start over.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use teamflow_core::{
    events::{EventEnvelope, EventType},
    traits::{Agent, AgentContext, EventEmitter, GenerateOptions, StepWatcher},
    types::{Message, StepAction},
    Error, Result,
};

use crate::environment::Environment;
use crate::transcript::render_history;

/// Decides which mirrored messages trigger a supervisory pass.
pub type WatchPredicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

type Handoff = (Message, oneshot::Sender<()>);

/// Supervisor agent bound to an environment.
pub struct Watcher {
    agent: Arc<dyn Agent>,
    env: Arc<Environment>,
    predicate: Option<WatchPredicate>,
    options: GenerateOptions,
    emitter: Arc<dyn EventEmitter>,
}

impl Watcher {
    pub fn new(agent: Arc<dyn Agent>, env: Arc<Environment>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            agent,
            env,
            predicate: None,
            options: GenerateOptions::default(),
            emitter,
        }
    }

    pub fn with_predicate(mut self, predicate: Option<WatchPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Start the worker task.
    ///
    /// It stops when the handle is shut down or `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> WatcherHandle {
        let watcher = Arc::new(self);
        let worker = watcher.clone();
        let (tx, mut rx) = mpsc::channel::<Handoff>(1);
        let task = tokio::spawn(async move {
            tracing::debug!(watcher = %worker.agent.name(), "Watcher started");
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = rx.recv() => next,
                };
                let Some((msg, ack)) = next else {
                    break;
                };
                worker.handle(&msg, &cancel).await;
                let _ = ack.send(());
            }
            tracing::debug!(watcher = %worker.agent.name(), "Watcher stopped");
        });
        WatcherHandle { tx, task, watcher }
    }

    async fn context(&self, name: &str, cancel: &CancellationToken) -> AgentContext {
        AgentContext::new(cancel.clone())
            .with_peers(self.env.subscribed_peers(name).await)
            .with_sop(self.env.sop().await)
            .with_options(self.options.clone())
    }

    async fn report_failure(&self, error: &Error, trigger_sender: &str) {
        let name = self.agent.name();
        tracing::warn!(watcher = %name, error = %error, "Watcher pass failed, skipping");
        self.emitter
            .emit(
                EventEnvelope::new(
                    EventType::WatcherFailed,
                    serde_json::json!({
                        "error": error.to_string(),
                        "trigger_sender": trigger_sender,
                    }),
                )
                .with_actor(name),
            )
            .await;
    }

    async fn handle(&self, msg: &Message, cancel: &CancellationToken) {
        if let Some(predicate) = &self.predicate {
            if !predicate(msg) {
                return;
            }
        }

        let name = self.agent.name();
        let messages = self.env.load_memory(name).await;
        let ctx = self.context(name, cancel).await;

        let result = match self.agent.run(messages, &ctx).await {
            Ok(generation) => self.env.produce(generation.messages).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.report_failure(&e, &msg.sender).await;
        }
    }
}

#[async_trait]
impl StepWatcher for Watcher {
    /// Show the watcher the whole log plus the agent's action history. Only a
    /// `replace` in its first output message produces a hint: the guidance
    /// text when there is one, otherwise the first replaced name.
    async fn review_steps(
        &self,
        agent: &str,
        steps: &[StepAction],
        cancel: &CancellationToken,
    ) -> Option<String> {
        let name = self.agent.name();
        let mut messages = self.env.load_memory(name).await;
        messages.push(Message::msg(
            agent,
            name,
            format!("Action history:\n{}", render_history(agent, &[], steps)),
        ));
        let ctx = self.context(name, cancel).await;

        let generation = match self.agent.run(messages, &ctx).await {
            Ok(generation) => generation,
            Err(e) => {
                self.report_failure(&e, agent).await;
                return None;
            }
        };

        let first = generation.messages.into_iter().next()?;
        let info = first.management?;
        let replaced = info.replace.into_iter().next()?;
        tracing::info!(watcher = %name, agent = %agent, replaced = %replaced, "Watcher rejected step history");
        if first.content.is_empty() {
            Some(replaced)
        } else {
            Some(first.content)
        }
    }
}

/// Scheduler side of the rendezvous.
pub struct WatcherHandle {
    tx: mpsc::Sender<Handoff>,
    task: JoinHandle<()>,
    watcher: Arc<Watcher>,
}

impl WatcherHandle {
    /// The running watcher as a step reviewer for agent contexts.
    pub fn step_watcher(&self) -> Arc<dyn StepWatcher> {
        self.watcher.clone()
    }

    /// Hand `msg` to the watcher and wait until it has been handled.
    pub async fn notify(&self, msg: Message) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((msg, ack_tx))
            .await
            .map_err(|_| Error::internal("watcher is no longer running"))?;
        ack_rx
            .await
            .map_err(|_| Error::internal("watcher stopped before acknowledging"))
    }

    /// Close the channel and wait for the worker to exit.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Watcher task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamflow_core::config::SubscribeMode;
    use teamflow_core::mocks::{RecordingEmitter, ScriptedAgent};
    use teamflow_core::types::ManagementInfo;

    use crate::team::Team;

    fn env_with(members: Vec<Arc<dyn Agent>>) -> Arc<Environment> {
        let mut team = Team::new(SubscribeMode::All);
        team.add_members(members);
        Arc::new(Environment::new(team).with_global_role("Watcher"))
    }

    #[tokio::test]
    async fn test_predicate_skips_without_running() {
        let watcher = Arc::new(ScriptedAgent::new("Watcher", "watches"));
        let env = env_with(vec![]);
        let predicate: WatchPredicate = Arc::new(|m: &Message| m.is_end());
        let handle = Watcher::new(watcher.clone(), env, Arc::new(RecordingEmitter::new()))
            .with_predicate(Some(predicate))
            .spawn(CancellationToken::new());

        handle.notify(Message::msg("Leader", "Coder", "go")).await.unwrap();
        assert_eq!(watcher.run_count(), 0);

        handle.notify(Message::end("Coder", "done")).await.unwrap();
        assert_eq!(watcher.run_count(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_output_is_produced_before_ack() {
        let coder: Arc<dyn Agent> = Arc::new(ScriptedAgent::new("Coder", "codes"));
        let info = ManagementInfo {
            remove: vec!["Coder".into()],
            ..Default::default()
        };
        let watcher = Arc::new(
            ScriptedAgent::new("Watcher", "watches")
                .then_reply(vec![Message::management("Watcher", info)]),
        );
        let env = env_with(vec![coder]);
        env.produce(vec![Message::msg("User", "Coder", "task")])
            .await
            .unwrap();

        let handle = Watcher::new(watcher.clone(), env.clone(), Arc::new(RecordingEmitter::new()))
            .spawn(CancellationToken::new());
        handle.notify(Message::msg("Coder", "User", "hi")).await.unwrap();

        // The watcher saw the whole log and its removal already applied.
        assert_eq!(watcher.seen()[0].len(), 1);
        assert!(env.agent("Coder").await.is_none());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_failures_are_swallowed_and_reported() {
        let watcher = Arc::new(
            ScriptedAgent::new("Watcher", "watches").then_fail(Error::model("offline")),
        );
        let emitter = Arc::new(RecordingEmitter::new());
        let handle = Watcher::new(watcher, env_with(vec![]), emitter.clone())
            .spawn(CancellationToken::new());

        handle.notify(Message::msg("A", "B", "x")).await.unwrap();
        assert_eq!(emitter.count(EventType::WatcherFailed), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_step_review_turns_replace_into_hint() {
        let mut verdict = Message::management(
            "Watcher",
            ManagementInfo {
                replace: vec!["Coder".into()],
                ..Default::default()
            },
        );
        verdict.content = "read the docs first".into();
        let watcher = Arc::new(
            ScriptedAgent::new("Watcher", "watches")
                .then_reply(vec![verdict])
                .then_reply(vec![Message::msg("Watcher", "Coder", "carry on")]),
        );
        let env = env_with(vec![]);
        env.produce(vec![Message::msg("User", "Coder", "task")])
            .await
            .unwrap();
        let handle = Watcher::new(watcher.clone(), env.clone(), Arc::new(RecordingEmitter::new()))
            .spawn(CancellationToken::new());
        let reviewer = handle.step_watcher();

        let steps = vec![StepAction::new("search", "tokio")];
        let hint = reviewer
            .review_steps("Coder", &steps, &CancellationToken::new())
            .await;
        assert_eq!(hint.as_deref(), Some("read the docs first"));

        let seen = &watcher.seen()[0];
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].sender, "Coder");
        assert!(seen[1].content.starts_with("Action history:\n"));
        assert!(seen[1].content.contains("Action: search"));

        // Plain messages are advice, not a reset.
        assert!(reviewer
            .review_steps("Coder", &steps, &CancellationToken::new())
            .await
            .is_none());
        // Reviews never touch the bus.
        assert_eq!(env.messages().await.len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_stops_worker() {
        let cancel = CancellationToken::new();
        let handle = Watcher::new(
            Arc::new(ScriptedAgent::new("Watcher", "watches")),
            env_with(vec![]),
            Arc::new(RecordingEmitter::new()),
        )
        .spawn(cancel.clone());

        cancel.cancel();
        handle.task.await.unwrap();
        assert!(handle.tx.is_closed());
    }
}

//! Agent contract.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::traits::llm::GenerateOptions;
use crate::types::{Generation, Message, StepAction};

/// Steps between two step reviews unless configured otherwise.
pub const DEFAULT_WATCH_INTERVAL: usize = 3;

/// A team member driven by a language model.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique name within the team.
    fn name(&self) -> &str;

    /// One-line description shown to peers.
    fn description(&self) -> &str;

    /// Handle the visible message history and answer with outbound messages.
    async fn run(&self, messages: Vec<Message>, ctx: &AgentContext) -> Result<Generation>;
}

/// Name and description of a peer the agent may address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub name: String,
    pub description: String,
}

impl Peer {
    pub fn of(agent: &dyn Agent) -> Self {
        Self {
            name: agent.name().to_string(),
            description: agent.description().to_string(),
        }
    }
}

/// Supervises an agent's tool steps while it is still running.
#[async_trait]
pub trait StepWatcher: Send + Sync {
    /// Review `agent`'s accumulated steps.
    ///
    /// Returns a hint when the agent should drop its steps and start over.
    /// Failures are the watcher's own business and end up as `None`.
    async fn review_steps(
        &self,
        agent: &str,
        steps: &[StepAction],
        cancel: &CancellationToken,
    ) -> Option<String>;
}

/// Everything an agent sees of its environment for one run.
#[derive(Clone, Default)]
pub struct AgentContext {
    /// Agents subscribed to this agent's broadcasts.
    pub peers: Vec<Peer>,
    /// Current SOP text, empty when none is set.
    pub sop: String,
    /// Options forwarded to every model call.
    pub options: GenerateOptions,
    /// Cancels in-flight model and tool calls.
    pub cancel: CancellationToken,
    pub step_watcher: Option<Arc<dyn StepWatcher>>,
    /// Steps between reviews; 0 disables them.
    pub watch_interval: usize,
}

impl fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentContext")
            .field("peers", &self.peers)
            .field("sop", &self.sop)
            .field("options", &self.options)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("step_watcher", &self.step_watcher.is_some())
            .field("watch_interval", &self.watch_interval)
            .finish()
    }
}

impl AgentContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Default::default()
        }
    }

    pub fn with_peers(mut self, peers: Vec<Peer>) -> Self {
        self.peers = peers;
        self
    }

    pub fn with_sop(mut self, sop: impl Into<String>) -> Self {
        self.sop = sop.into();
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Review the agent's steps every `interval` steps.
    pub fn with_step_watcher(mut self, watcher: Arc<dyn StepWatcher>, interval: usize) -> Self {
        self.step_watcher = Some(watcher);
        self.watch_interval = interval;
        self
    }
}

//! Environment: the team's message bus.
//!
//! Owns the message log, the team roster, the SOP text and the run budget.
//! Every mutation funnels through [`Environment::produce`], which classifies
//! each message into a [`Dispatch`] strategy.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use teamflow_core::{
    events::{EventEnvelope, EventType, MessagePayload},
    traits::{noop_emitter, Agent, EventEmitter, Peer},
    types::{Message, MessageType},
    Result,
};
use teamflow_governance::{Exhaustion, RunBudget};

use crate::memory::MessageLog;
use crate::team::Team;

/// How a produced message is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// MSG and END: resolve receivers and append to the log.
    PlainOrEnd,
    /// SOP: replace the current SOP text.
    SopDefinition,
    /// CREATIVE: apply team management, then append to the log.
    Management,
}

impl Dispatch {
    pub fn of(kind: MessageType) -> Self {
        match kind {
            MessageType::Msg | MessageType::End => Self::PlainOrEnd,
            MessageType::Sop => Self::SopDefinition,
            MessageType::Creative => Self::Management,
        }
    }
}

struct EnvState {
    log: MessageLog,
    team: Team,
    sop: String,
    budget: RunBudget,
}

/// Shared message bus for one team.
pub struct Environment {
    state: Mutex<EnvState>,
    global_roles: HashSet<String>,
    emitter: Arc<dyn EventEmitter>,
}

impl Environment {
    pub fn new(team: Team) -> Self {
        Self {
            state: Mutex::new(EnvState {
                log: MessageLog::new(),
                team,
                sop: String::new(),
                budget: RunBudget::unlimited(),
            }),
            global_roles: HashSet::new(),
            emitter: noop_emitter(),
        }
    }

    pub fn with_log(mut self, log: MessageLog) -> Self {
        self.state.get_mut().log = log;
        self
    }

    pub fn with_budget(mut self, budget: RunBudget) -> Self {
        self.state.get_mut().budget = budget;
        self
    }

    pub fn with_sop(mut self, sop: impl Into<String>) -> Self {
        self.state.get_mut().sop = sop.into();
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Mark an agent name as a global role (SOP expert, planner, watcher):
    /// it sees the whole log and the whole team.
    pub fn with_global_role(mut self, name: impl Into<String>) -> Self {
        self.global_roles.insert(name.into());
        self
    }

    pub fn is_global_role(&self, name: &str) -> bool {
        self.global_roles.contains(name)
    }

    // =========================================================================
    // Produce / Consume
    // =========================================================================

    /// Dispatch messages in order.
    pub async fn produce(&self, msgs: Vec<Message>) -> Result<()> {
        let mut events = Vec::with_capacity(msgs.len());
        {
            let mut state = self.state.lock().await;
            for msg in msgs {
                state.budget.record_tokens(msg.token_cost);
                events.push(message_event(EventType::MessageProduced, &msg));

                match Dispatch::of(msg.kind) {
                    Dispatch::PlainOrEnd => Self::dispatch_plain(&mut state, msg),
                    Dispatch::SopDefinition => {
                        tracing::info!(sender = %msg.sender, "SOP updated");
                        state.sop = msg.content.clone();
                        events.push(
                            EventEnvelope::new(
                                EventType::SopUpdated,
                                serde_json::json!({ "sop": msg.content }),
                            )
                            .with_actor(&msg.sender),
                        );
                        state.log.save(msg);
                    }
                    Dispatch::Management => Self::dispatch_management(&mut state, msg),
                }
            }
        }

        for event in events {
            self.emitter.emit(event).await;
        }
        Ok(())
    }

    fn dispatch_plain(state: &mut EnvState, mut msg: Message) {
        let subscribers = state.team.message_subscribers(&msg);

        for name in msg.receivers() {
            if let Some(agent) = state.team.member(&name) {
                msg.resolved_receivers.push(agent.name().to_string());
            }
        }
        if msg.is_msg() {
            msg.resolved_receivers.extend(subscribers);
        }
        let mut seen = HashSet::new();
        msg.resolved_receivers.retain(|name| seen.insert(name.clone()));

        tracing::debug!(
            cate = %msg.kind,
            sender = %msg.sender,
            receiver = %msg.receiver,
            resolved = ?msg.resolved_receivers,
            "Message dispatched"
        );
        state.log.save(msg);
    }

    fn dispatch_management(state: &mut EnvState, mut msg: Message) {
        if let Some(info) = &msg.management {
            if !info.remove.is_empty() {
                state.team.remove_members(&info.remove);
            }
            if !info.replace.is_empty() {
                tracing::info!(agents = ?info.replace, "Replacing agents with a fresh start");
                state.log.remove_messages_by_agents(&info.replace);
            }
            if !info.create.is_empty() || !info.select.is_empty() {
                tracing::debug!(
                    create = info.create.len(),
                    select = info.select.len(),
                    "Ignoring unsupported management operations"
                );
            }
        }

        // Guidance addressed to surviving members stays visible to them.
        for name in msg.receivers() {
            if let Some(agent) = state.team.member(&name) {
                msg.resolved_receivers.push(agent.name().to_string());
            }
        }
        state.log.save(msg);
    }

    /// Take the next routable message, collapsing back-to-back messages to
    /// the same receiver into the latest one.
    ///
    /// Returns `None` once the turn or token budget is exceeded or the log
    /// has no deliverable message left.
    pub async fn consume(&self) -> Option<Message> {
        let msg = {
            let mut state = self.state.lock().await;
            if state.budget.try_take_turn().is_err() {
                return None;
            }

            let mut msg = state.log.load_next()?;
            let receiver = msg.receiver.clone();
            while let Some(next) = state.log.load_next_if(|m| m.receiver == receiver) {
                tracing::debug!(
                    receiver = %receiver,
                    dropped_sender = %msg.sender,
                    "Coalesced message to same receiver"
                );
                msg = next;
            }
            msg
        };

        self.emitter
            .emit(message_event(EventType::MessageConsumed, &msg))
            .await;
        Some(msg)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Messages visible to `receiver`.
    ///
    /// Global roles see the full log; everyone else sees messages up to the
    /// cursor that they sent or that were resolved to them.
    pub async fn load_memory(&self, receiver: &str) -> Vec<Message> {
        let state = self.state.lock().await;
        if self.is_global_role(receiver) {
            return state.log.load_all();
        }
        state.log.load(|index, cursor, m| {
            index <= cursor
                && (m.sender.eq_ignore_ascii_case(receiver) || m.is_addressed_to(receiver))
        })
    }

    pub async fn agent(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.state.lock().await.team.member(name)
    }

    pub async fn leader(&self) -> Option<Arc<dyn Agent>> {
        self.state.lock().await.team.leader()
    }

    pub async fn team(&self) -> Vec<Arc<dyn Agent>> {
        self.state.lock().await.team.members().to_vec()
    }

    pub async fn sop(&self) -> String {
        self.state.lock().await.sop.clone()
    }

    /// Peers an agent may address: its subscribers, or the whole team for
    /// global roles.
    pub async fn subscribed_peers(&self, name: &str) -> Vec<Peer> {
        let state = self.state.lock().await;
        let agents = if self.is_global_role(name) {
            state.team.members().to_vec()
        } else {
            state.team.subscribers_of(name)
        };
        agents.iter().map(|a| Peer::of(a.as_ref())).collect()
    }

    pub async fn init_subscriptions(&self) -> Result<()> {
        self.state.lock().await.team.init_subscriptions()
    }

    /// Which budget limit, if any, has been exceeded.
    pub async fn budget_exhaustion(&self) -> Option<Exhaustion> {
        self.state.lock().await.budget.exhaustion()
    }

    /// Total tokens produced so far.
    pub async fn tokens(&self) -> u64 {
        self.state.lock().await.budget.tokens()
    }

    /// Snapshot of the whole log.
    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.log.messages().to_vec()
    }
}

fn message_event(event_type: EventType, msg: &Message) -> EventEnvelope {
    let payload = MessagePayload {
        cate: msg.kind.to_string(),
        sender: msg.sender.clone(),
        receiver: msg.receiver.clone(),
        token: msg.token_cost,
    };
    EventEnvelope::new(
        event_type,
        serde_json::to_value(payload).unwrap_or_default(),
    )
    .with_actor("environment")
}

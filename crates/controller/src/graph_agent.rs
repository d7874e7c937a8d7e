//! Agent that works through an SOP graph.

use async_trait::async_trait;
use tokio::sync::Mutex;

use teamflow_core::{
    traits::{Agent, AgentContext},
    types::{Generation, Message},
    Error, Result,
};

use crate::agent::BaseAgent;
use crate::driver::GraphDriver;

/// [`BaseAgent`] whose prompt tracks progress against an SOP graph.
///
/// The driver is built from the configured SOP, or from the SOP in the run
/// context the first time the agent runs, and persists across runs.
pub struct GraphAgent {
    pub(crate) base: BaseAgent,
    pub(crate) sop: String,
    pub(crate) driver: Mutex<Option<GraphDriver>>,
}

impl GraphAgent {
    pub fn base(&self) -> &BaseAgent {
        &self.base
    }

    /// SOP text the driver was (or will be) built from.
    pub fn sop(&self) -> &str {
        &self.sop
    }

    /// Snapshot of the driver, `None` before the first run.
    pub async fn driver(&self) -> Option<GraphDriver> {
        self.driver.lock().await.clone()
    }
}

#[async_trait]
impl Agent for GraphAgent {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn description(&self) -> &str {
        &self.base.description
    }

    async fn run(&self, messages: Vec<Message>, ctx: &AgentContext) -> Result<Generation> {
        let sop = if self.sop.is_empty() {
            ctx.sop.clone()
        } else {
            self.sop.clone()
        };

        let mut guard = self.driver.lock().await;
        if guard.is_none() {
            if sop.trim().is_empty() {
                return Err(Error::MissingGraph);
            }
            *guard = Some(GraphDriver::from_sop(&sop)?);
            tracing::debug!(agent = %self.base.name, "SOP driver initialised");
        }

        let ctx = ctx.clone().with_sop(sop);
        self.base.run_loop(messages, &ctx, guard.as_mut()).await
    }
}

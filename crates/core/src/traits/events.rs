use async_trait::async_trait;
use std::sync::Arc;

use crate::events::EventEnvelope;

/// Sink for structured run events.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, event: EventEnvelope);
}

/// Emitter that drops everything; the default when no observer is registered.
pub struct NoOpEventEmitter;

#[async_trait]
impl EventEmitter for NoOpEventEmitter {
    async fn emit(&self, _event: EventEnvelope) {}
}

/// Shared no-op emitter.
pub fn noop_emitter() -> Arc<dyn EventEmitter> {
    Arc::new(NoOpEventEmitter)
}

//! Validator chain for parsed agent output.
//!
//! Validators inspect what the model proposed before any tool runs. The
//! first rejection wins and is fed back into the next prompt.

use async_trait::async_trait;
use std::sync::Arc;

use teamflow_core::{
    traits::Peer,
    types::{Message, StepAction, ALL_RECEIVER},
    Result,
};

/// Outcome of one validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub approved: bool,
    pub reason: Option<String>,
}

impl Verdict {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
        }
    }
}

/// Everything a validator may look at for one round.
#[derive(Debug, Clone, Copy)]
pub struct Review<'a> {
    pub agent: &'a str,
    pub messages: &'a [Message],
    pub actions: &'a [StepAction],
    pub steps: &'a [StepAction],
    pub peers: &'a [Peer],
    pub prompt: &'a str,
}

/// Post-parse check that can force a retry.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, review: &Review<'_>) -> Result<Verdict>;
}

/// Ordered validators; the first rejection is returned.
#[derive(Clone, Default)]
pub struct FeedbackChain {
    validators: Vec<Arc<dyn Validator>>,
}

impl FeedbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn push(&mut self, validator: Arc<dyn Validator>) {
        self.validators.push(validator);
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Rejection reason, or `None` when every validator approves.
    ///
    /// A validator that errors is skipped.
    pub async fn review(&self, review: &Review<'_>) -> Option<String> {
        for validator in &self.validators {
            match validator.validate(review).await {
                Ok(verdict) if verdict.approved => {}
                Ok(verdict) => {
                    let reason = verdict
                        .reason
                        .unwrap_or_else(|| format!("rejected by {}", validator.name()));
                    tracing::debug!(
                        agent = %review.agent,
                        validator = %validator.name(),
                        reason = %reason,
                        "Output rejected"
                    );
                    return Some(reason);
                }
                Err(e) => {
                    tracing::warn!(
                        agent = %review.agent,
                        validator = %validator.name(),
                        error = %e,
                        "Validator failed, skipping"
                    );
                }
            }
        }
        None
    }
}

/// Rejects empty messages, messages to oneself and, when the agent knows
/// its peers, plain messages to anyone outside them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentValidator;

#[async_trait]
impl Validator for ContentValidator {
    fn name(&self) -> &str {
        "content"
    }

    async fn validate(&self, review: &Review<'_>) -> Result<Verdict> {
        for msg in review.messages {
            if msg.content.trim().is_empty() {
                return Ok(Verdict::reject(
                    "message content is empty, put your answer in the content field",
                ));
            }
            if !msg.is_msg() {
                continue;
            }

            for receiver in msg.receivers() {
                if receiver.eq_ignore_ascii_case(review.agent) {
                    return Ok(Verdict::reject(
                        "you cannot send a message to yourself, choose another receiver",
                    ));
                }
                let known = review.peers.is_empty()
                    || receiver.eq_ignore_ascii_case(ALL_RECEIVER)
                    || review
                        .peers
                        .iter()
                        .any(|p| p.name.eq_ignore_ascii_case(&receiver));
                if !known {
                    let names: Vec<&str> = review.peers.iter().map(|p| p.name.as_str()).collect();
                    return Ok(Verdict::reject(format!(
                        "{} is not a valid receiver, choose from: {}",
                        receiver,
                        names.join(", ")
                    )));
                }
            }
        }
        Ok(Verdict::approve())
    }
}

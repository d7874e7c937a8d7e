//! Turn and token budget for a scheduler run.

use serde::Serialize;

use teamflow_core::{Error, Result};

/// Which limit stopped the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exhaustion {
    Turns { used: u64, limit: u64 },
    Tokens { used: u64, limit: u64 },
}

impl From<Exhaustion> for Error {
    fn from(exhaustion: Exhaustion) -> Self {
        match exhaustion {
            Exhaustion::Turns { used, limit } => Error::TurnBudgetExhausted { used, limit },
            Exhaustion::Tokens { used, limit } => Error::TokenBudgetExhausted { used, limit },
        }
    }
}

/// Running turn and token counters with optional limits.
///
/// A limit of 0 disables that check. Limits are checked before a turn is
/// taken, so a run with `max_turns = N` is admitted N+1 consumes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunBudget {
    max_turns: u64,
    max_tokens: u64,
    turns: u64,
    tokens: u64,
}

impl RunBudget {
    /// Create a budget with the given limits.
    pub fn new(max_turns: u64, max_tokens: u64) -> Self {
        Self {
            max_turns,
            max_tokens,
            turns: 0,
            tokens: 0,
        }
    }

    /// Budget with no limits.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Add the token cost of a produced message.
    pub fn record_tokens(&mut self, tokens: u64) {
        self.tokens = self.tokens.saturating_add(tokens);
        tracing::trace!(tokens = tokens, total = self.tokens, "Recorded token usage");
    }

    /// Which limit, if any, is exceeded right now.
    pub fn exhaustion(&self) -> Option<Exhaustion> {
        if self.max_turns > 0 && self.turns > self.max_turns {
            return Some(Exhaustion::Turns {
                used: self.turns,
                limit: self.max_turns,
            });
        }
        if self.max_tokens > 0 && self.tokens > self.max_tokens {
            return Some(Exhaustion::Tokens {
                used: self.tokens,
                limit: self.max_tokens,
            });
        }
        None
    }

    /// Take one turn, failing closed once a limit is exceeded.
    pub fn try_take_turn(&mut self) -> Result<()> {
        if let Some(exhaustion) = self.exhaustion() {
            tracing::info!(?exhaustion, "Run budget exhausted");
            return Err(exhaustion.into());
        }
        self.turns += 1;
        Ok(())
    }

    pub fn turns(&self) -> u64 {
        self.turns
    }

    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Tokens left before the limit trips; `None` when unlimited.
    pub fn remaining_tokens(&self) -> Option<u64> {
        (self.max_tokens > 0).then(|| self.max_tokens.saturating_sub(self.tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_limit_admits_one_extra_consume() {
        let mut budget = RunBudget::new(2, 0);
        assert!(budget.try_take_turn().is_ok());
        assert!(budget.try_take_turn().is_ok());
        assert!(budget.try_take_turn().is_ok());
        assert!(matches!(
            budget.try_take_turn(),
            Err(Error::TurnBudgetExhausted { used: 3, limit: 2 })
        ));
    }

    #[test]
    fn test_token_limit() {
        let mut budget = RunBudget::new(0, 100);
        budget.record_tokens(100);
        assert!(budget.try_take_turn().is_ok());
        assert_eq!(budget.remaining_tokens(), Some(0));

        budget.record_tokens(1);
        assert_eq!(
            budget.exhaustion(),
            Some(Exhaustion::Tokens { used: 101, limit: 100 })
        );
        assert!(matches!(
            budget.try_take_turn(),
            Err(Error::TokenBudgetExhausted { .. })
        ));
    }

    #[test]
    fn test_unlimited_never_exhausts() {
        let mut budget = RunBudget::unlimited();
        budget.record_tokens(u64::MAX);
        for _ in 0..1000 {
            budget.try_take_turn().unwrap();
        }
        assert_eq!(budget.remaining_tokens(), None);
        assert_eq!(budget.turns(), 1000);
    }
}

use teamflow_core::Error;
use teamflow_governance::{Exhaustion, RunBudget};

#[test]
fn test_refused_turn_is_not_counted() {
    let mut budget = RunBudget::new(2, 0);
    for _ in 0..3 {
        budget.try_take_turn().unwrap();
    }
    assert_eq!(budget.turns(), 3);
    assert_eq!(
        budget.exhaustion(),
        Some(Exhaustion::Turns { used: 3, limit: 2 })
    );

    let err = budget.try_take_turn().unwrap_err();
    assert_eq!(err.to_string(), "Turn budget exhausted: used 3, limit 2");
    // A refused turn is not counted.
    assert_eq!(budget.turns(), 3);
}

#[test]
fn test_turns_are_checked_before_tokens() {
    let mut budget = RunBudget::new(1, 10);
    budget.try_take_turn().unwrap();
    budget.try_take_turn().unwrap();
    budget.record_tokens(11);

    assert!(matches!(
        budget.try_take_turn(),
        Err(Error::TurnBudgetExhausted { used: 2, limit: 1 })
    ));
}

#[test]
fn test_unlimited_budget_never_exhausts() {
    let mut budget = RunBudget::unlimited();
    budget.record_tokens(u64::MAX);
    budget.record_tokens(1);
    for _ in 0..1_000 {
        budget.try_take_turn().unwrap();
    }
    assert_eq!(budget.tokens(), u64::MAX);
    assert_eq!(budget.remaining_tokens(), None);
    assert!(budget.exhaustion().is_none());
}

#[test]
fn test_exhaustion_serializes_as_tagged_snake_case() {
    let json = serde_json::to_value(Exhaustion::Tokens { used: 30, limit: 20 }).unwrap();
    assert_eq!(json, serde_json::json!({ "tokens": { "used": 30, "limit": 20 } }));
}

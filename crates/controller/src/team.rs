//! Team roster and subscription routing.

use std::collections::HashSet;
use std::sync::Arc;

use teamflow_core::{config::SubscribeMode, traits::Agent, types::Message, Error, Result};

/// Directed edge: when `subscribed` broadcasts, `subscriber` is an implicit receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub subscribed: String,
    pub subscriber: String,
    /// Only messages carrying this condition tag are routed when set.
    pub condition: String,
}

impl Subscription {
    pub fn new(subscribed: impl Into<String>, subscriber: impl Into<String>) -> Self {
        Self {
            subscribed: subscribed.into(),
            subscriber: subscriber.into(),
            condition: String::new(),
        }
    }

    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }
}

/// Mutable roster of agents plus the subscription set.
#[derive(Clone, Default)]
pub struct Team {
    members: Vec<Arc<dyn Agent>>,
    leader: Option<String>,
    subscriptions: Vec<Subscription>,
    mode: SubscribeMode,
}

impl Team {
    pub fn new(mode: SubscribeMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn add_members(&mut self, members: impl IntoIterator<Item = Arc<dyn Agent>>) {
        self.members.extend(members);
    }

    pub fn set_leader(&mut self, name: impl Into<String>) {
        self.leader = Some(name.into());
    }

    pub fn add_subscriptions(&mut self, subscriptions: impl IntoIterator<Item = Subscription>) {
        self.subscriptions.extend(subscriptions);
    }

    /// Look up a member by case-insensitive name.
    pub fn member(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.members
            .iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn members(&self) -> &[Arc<dyn Agent>] {
        &self.members
    }

    pub fn leader(&self) -> Option<Arc<dyn Agent>> {
        self.leader.as_deref().and_then(|name| self.member(name))
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    fn is_member(&self, name: &str) -> bool {
        self.members.iter().any(|a| a.name() == name)
    }

    /// Derive subscription edges from the configured mode, then de-duplicate.
    pub fn init_subscriptions(&mut self) -> Result<()> {
        match self.mode {
            SubscribeMode::Default => match self.leader.clone() {
                Some(leader) => self.build_leader_relation(&leader),
                None => self.build_all_relation(),
            },
            SubscribeMode::Leader => {
                let leader = self.leader.clone().ok_or(Error::MissingLeader)?;
                self.build_leader_relation(&leader);
            }
            SubscribeMode::All => self.build_all_relation(),
            SubscribeMode::Custom => {}
        }
        self.deduplicate();

        tracing::debug!(
            mode = ?self.mode,
            members = self.members.len(),
            subscriptions = self.subscriptions.len(),
            "Initialized team subscriptions"
        );
        Ok(())
    }

    fn build_leader_relation(&mut self, leader: &str) {
        let edges: Vec<Subscription> = self
            .members
            .iter()
            .filter(|a| a.name() != leader)
            .flat_map(|a| {
                [
                    Subscription::new(a.name(), leader),
                    Subscription::new(leader, a.name()),
                ]
            })
            .collect();
        self.subscriptions.extend(edges);
    }

    fn build_all_relation(&mut self) {
        let mut edges = Vec::new();
        for a in &self.members {
            for b in &self.members {
                if a.name() != b.name() {
                    edges.push(Subscription::new(a.name(), b.name()));
                }
            }
        }
        self.subscriptions.extend(edges);
    }

    fn deduplicate(&mut self) {
        let mut seen = HashSet::new();
        self.subscriptions.retain(|s| {
            s.subscribed != s.subscriber
                && seen.insert((s.subscriber.clone(), s.subscribed.clone(), s.condition.clone()))
        });
    }

    /// Current members subscribed to `subscribed`.
    pub fn subscribers_of(&self, subscribed: &str) -> Vec<Arc<dyn Agent>> {
        self.subscriptions
            .iter()
            .filter(|s| s.subscribed == subscribed && s.subscriber != subscribed)
            .filter_map(|s| self.members.iter().find(|m| m.name() == s.subscriber).cloned())
            .collect()
    }

    /// Names of current members that should receive `msg` via subscription.
    pub fn message_subscribers(&self, msg: &Message) -> Vec<String> {
        self.subscriptions
            .iter()
            .filter(|s| s.subscribed.eq_ignore_ascii_case(&msg.sender))
            .filter(|s| s.condition.is_empty() || s.condition == msg.condition)
            .filter(|s| self.is_member(&s.subscriber))
            .map(|s| s.subscriber.clone())
            .collect()
    }

    /// Remove members by trimmed, case-insensitive name.
    pub fn remove_members(&mut self, names: &[String]) {
        for name in names {
            let name = name.trim();
            if let Some(pos) = self
                .members
                .iter()
                .position(|a| a.name().eq_ignore_ascii_case(name))
            {
                let removed = self.members.remove(pos);
                tracing::info!(agent = %removed.name(), "Removed agent from team");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamflow_core::mocks::ScriptedAgent;

    fn agent(name: &str) -> Arc<dyn Agent> {
        Arc::new(ScriptedAgent::new(name, name))
    }

    fn team(mode: SubscribeMode, leader: Option<&str>) -> Team {
        let mut team = Team::new(mode);
        team.add_members([agent("Leader"), agent("Coder"), agent("Tester")]);
        if let Some(leader) = leader {
            team.set_leader(leader);
        }
        team
    }

    #[test]
    fn test_leader_relation_is_bidirectional() {
        let mut team = team(SubscribeMode::Default, Some("Leader"));
        team.init_subscriptions().unwrap();

        assert_eq!(team.subscriptions().len(), 4);
        let subs = team.message_subscribers(&Message::msg("Coder", "", "hi"));
        assert_eq!(subs, vec!["Leader"]);
        let subs = team.message_subscribers(&Message::msg("Leader", "", "hi"));
        assert_eq!(subs, vec!["Coder", "Tester"]);
    }

    #[test]
    fn test_default_without_leader_is_all_to_all() {
        let mut team = team(SubscribeMode::Default, None);
        team.init_subscriptions().unwrap();
        assert_eq!(team.subscriptions().len(), 6);
    }

    #[test]
    fn test_leader_mode_requires_leader() {
        let mut team = team(SubscribeMode::Leader, None);
        assert!(matches!(team.init_subscriptions(), Err(Error::MissingLeader)));
    }

    #[test]
    fn test_custom_edges_deduplicated_and_conditioned() {
        let mut team = team(SubscribeMode::Custom, Some("Leader"));
        team.add_subscriptions([
            Subscription::new("Coder", "Tester").when("review"),
            Subscription::new("Coder", "Tester").when("review"),
            Subscription::new("Coder", "Coder"),
            Subscription::new("Coder", "Leader"),
        ]);
        team.init_subscriptions().unwrap();
        assert_eq!(team.subscriptions().len(), 2);

        let plain = Message::msg("Coder", "", "done");
        assert_eq!(team.message_subscribers(&plain), vec!["Leader"]);

        let review = Message::msg("Coder", "", "done").with_condition("review");
        assert_eq!(team.message_subscribers(&review), vec!["Tester", "Leader"]);
    }

    #[test]
    fn test_removed_members_stop_receiving() {
        let mut team = team(SubscribeMode::Default, Some("Leader"));
        team.init_subscriptions().unwrap();
        team.remove_members(&[" coder ".to_string()]);

        assert!(team.member("Coder").is_none());
        let subs = team.message_subscribers(&Message::msg("Leader", "", "hi"));
        assert_eq!(subs, vec!["Tester"]);
        assert_eq!(team.subscribers_of("Leader").len(), 1);
    }
}

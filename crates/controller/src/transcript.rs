//! Prompt rendering of message history, step history and peers.

use teamflow_core::{
    traits::Peer,
    types::{Message, StepAction},
};

/// Sender name whose plain messages render as global hints.
pub const WATCHER_SENDER: &str = "Watcher";

/// Stand-in for the agent's own name in its transcript.
pub const SELF_ALIAS: &str = "me";

/// Render the conversation an agent has seen followed by its own steps.
///
/// Only plain messages are shown; management messages contribute their
/// guidance text as a hint.
pub fn render_history(name: &str, messages: &[Message], steps: &[StepAction]) -> String {
    let alias = |who: &str| -> String {
        if who.eq_ignore_ascii_case(name) {
            SELF_ALIAS.to_string()
        } else {
            who.to_string()
        }
    };

    let mut out = String::new();
    for msg in messages {
        if msg.is_creative() && !msg.content.is_empty() {
            out.push_str(&format!("(Hint from Global Watcher): {}\n", msg.content));
            continue;
        }
        if !msg.is_msg() {
            continue;
        }
        let sender = alias(&msg.sender);
        let receiver = alias(&msg.receiver);
        if !msg.condition.is_empty() {
            out.push_str(&format!(
                "({} -> {})({}): {}\n",
                sender, receiver, msg.condition, msg.content
            ));
        } else if sender == WATCHER_SENDER {
            out.push_str(&format!("(Hint from Global Watcher): {}\n", msg.content));
        } else {
            out.push_str(&format!("({} -> {}): {}\n", sender, receiver, msg.content));
        }
    }

    for step in steps {
        if step.is_feedback() {
            out.push_str(&format!(
                "({})Output: {}\nFeedback: {}\n",
                SELF_ALIAS, step.log, step.feedback
            ));
        } else {
            out.push_str(&format!(
                "({})Thought: {}\nAction: {}\nAction Input: {}\nObservation: {}\n",
                SELF_ALIAS, step.thought, step.action, step.input, step.observation
            ));
        }
    }
    out
}

/// `a, b, c`
pub fn peer_names(peers: &[Peer]) -> String {
    peers
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One `- name: description` line per peer, trimmed.
pub fn peer_descriptions(peers: &[Peer]) -> String {
    peers
        .iter()
        .map(|p| format!("- {}: {}\n", p.name, p.description))
        .collect::<String>()
        .trim()
        .to_string()
}

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// =============================================================================
// Message Types
// =============================================================================

/// Receiver sentinel that expands to the resolved subscriber set.
pub const ALL_RECEIVER: &str = "ALL";

/// Category of a message on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MessageType {
    /// Plain message addressed to one or more agents.
    #[default]
    Msg,
    /// Terminal message carrying the final answer.
    End,
    /// Replaces the environment's SOP text.
    Sop,
    /// Management message that mutates the team.
    Creative,
}

impl MessageType {
    /// Canonical upper-case tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Msg => "MSG",
            Self::End => "END",
            Self::Sop => "SOP",
            Self::Creative => "CREATIVE",
        }
    }

    /// Case-insensitive parse of a type tag.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        [Self::Msg, Self::End, Self::Sop, Self::Creative]
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(tag))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Self::parse(&tag)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown message type '{}'", tag)))
    }
}

/// Team mutation requested by a management message.
///
/// Only `remove` and `replace` are acted upon; `create` and `select` are
/// carried through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagementInfo {
    #[serde(default)]
    pub create: Vec<AgentSpec>,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
    #[serde(default)]
    pub replace: Vec<String>,
}

impl ManagementInfo {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.select.is_empty()
            && self.remove.is_empty()
            && self.replace.is_empty()
    }
}

/// Agent description inside a `create` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub prompt: String,
}

/// Unit of communication between agents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Category tag (`cate` on the wire).
    #[serde(rename = "cate", default)]
    pub kind: MessageType,
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sender: String,
    /// A single name, a delimited list, a JSON array, or `ALL`.
    #[serde(default)]
    pub receiver: String,
    /// Routing tag consulted by conditional subscriptions.
    #[serde(default)]
    pub condition: String,
    /// Tokens spent producing this message.
    #[serde(rename = "token", default)]
    pub token_cost: u64,
    /// Raw model output the message was parsed from.
    #[serde(skip)]
    pub log: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub management: Option<ManagementInfo>,
    /// Receivers computed at dispatch time.
    #[serde(skip)]
    pub resolved_receivers: Vec<String>,
}

impl Message {
    /// Create a message of the given type.
    pub fn new(
        kind: MessageType,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            sender: sender.into(),
            receiver: receiver.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Create a plain message.
    pub fn msg(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(MessageType::Msg, sender, receiver, content)
    }

    /// Create an end message.
    pub fn end(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(MessageType::End, sender, "", content)
    }

    /// Create an SOP-definition message.
    pub fn sop(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(MessageType::Sop, sender, "", content)
    }

    /// Create a management message.
    pub fn management(sender: impl Into<String>, info: ManagementInfo) -> Self {
        Self {
            management: Some(info),
            ..Self::new(MessageType::Creative, sender, "", "")
        }
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = thought.into();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn with_token_cost(mut self, tokens: u64) -> Self {
        self.token_cost = tokens;
        self
    }

    pub fn is_msg(&self) -> bool {
        self.kind == MessageType::Msg
    }

    pub fn is_end(&self) -> bool {
        self.kind == MessageType::End
    }

    pub fn is_sop(&self) -> bool {
        self.kind == MessageType::Sop
    }

    pub fn is_creative(&self) -> bool {
        self.kind == MessageType::Creative
    }

    /// Expand the receiver field into individual agent names.
    pub fn receivers(&self) -> Vec<String> {
        let receiver = self.receiver.trim();
        let names: Vec<String> = if receiver.eq_ignore_ascii_case(ALL_RECEIVER) {
            self.resolved_receivers.clone()
        } else if receiver.contains('[') {
            match serde_json::from_str::<Vec<String>>(receiver) {
                Ok(names) => names,
                Err(_) => receiver
                    .trim_matches(|c| c == '[' || c == ']')
                    .split(',')
                    .map(|part| part.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
                    .filter(|name| !name.is_empty())
                    .collect(),
            }
        } else if receiver.contains(',') {
            receiver.split(',').map(str::to_string).collect()
        } else if !receiver.is_empty() {
            vec![receiver.to_string()]
        } else {
            Vec::new()
        };

        names.into_iter().map(|name| name.trim().to_string()).collect()
    }

    /// Whether `name` is among the resolved receivers.
    pub fn is_addressed_to(&self, name: &str) -> bool {
        self.resolved_receivers.iter().any(|r| r == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_is_case_insensitive() {
        assert_eq!(MessageType::parse("end"), Some(MessageType::End));
        assert_eq!(MessageType::parse(" Msg "), Some(MessageType::Msg));
        assert_eq!(MessageType::parse("creative"), Some(MessageType::Creative));
        assert_eq!(MessageType::parse("plan"), None);
    }

    #[test]
    fn test_receivers_single_and_comma_list() {
        let msg = Message::msg("Leader", "Writer", "draft it");
        assert_eq!(msg.receivers(), vec!["Writer"]);

        let msg = Message::msg("Leader", "Writer, Reviewer ,Editor", "go");
        assert_eq!(msg.receivers(), vec!["Writer", "Reviewer", "Editor"]);
    }

    #[test]
    fn test_receivers_json_array_and_fallback() {
        let msg = Message::msg("Leader", r#"["Writer", " Reviewer"]"#, "go");
        assert_eq!(msg.receivers(), vec!["Writer", "Reviewer"]);

        let msg = Message::msg("Leader", "[Writer, 'Reviewer']", "go");
        assert_eq!(msg.receivers(), vec!["Writer", "Reviewer"]);
    }

    #[test]
    fn test_receivers_all_uses_resolved_set() {
        let mut msg = Message::msg("Leader", "all", "go");
        assert!(msg.receivers().is_empty());

        msg.resolved_receivers = vec!["Writer".into(), "Reviewer".into()];
        assert_eq!(msg.receivers(), vec!["Writer", "Reviewer"]);
    }

    #[test]
    fn test_wire_format_uses_cate_key() {
        let msg = Message::end("Writer", "FINAL ANSWER: 42").with_thought("done");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["cate"], "END");
        assert_eq!(value["content"], "FINAL ANSWER: 42");
        assert!(value.get("management").is_none());

        let back: Message = serde_json::from_value(value).unwrap();
        assert!(back.is_end());
    }
}

//! Parser module for LLM response parsing.
//!
//! Turns raw model output into tool actions and/or outbound messages. Four
//! output formats are understood, one per agent kind:
//!
//! - [`OutputFormat::Standard`]: a message array, a single action object or a
//!   single message object.
//! - [`OutputFormat::Graph`]: an action array, a single action, then a message.
//! - [`OutputFormat::Sop`]: DOT text (bare, fenced or inside a JSON `content`)
//!   that becomes an SOP-definition message.
//! - [`OutputFormat::Management`]: `{thought, content or guidance, remove, replace}` that
//!   becomes a management message.
//!
//! Native tool calls take precedence over text in every format.

use serde_json::{Map, Value};

use teamflow_core::{
    traits::{LlmResponse, ToolCall},
    types::{ManagementInfo, Message, MessageType, StepAction},
    Error, Result,
};

use crate::sop;

/// Closing marker of a leading reasoning segment.
pub const REASONING_END: &str = "</think>";

/// Which output contract an agent's model answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Standard,
    Graph,
    Sop,
    Management,
}

/// Actions to execute and/or messages to send.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    pub actions: Vec<StepAction>,
    pub messages: Vec<Message>,
}

impl ParsedOutput {
    fn actions(actions: Vec<StepAction>) -> Self {
        Self {
            actions,
            messages: Vec::new(),
        }
    }

    fn messages(messages: Vec<Message>) -> Self {
        Self {
            actions: Vec::new(),
            messages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.messages.is_empty()
    }
}

/// Keep only what follows the reasoning marker, if there is one.
pub fn strip_reasoning(text: &str) -> &str {
    match text.split_once(REASONING_END) {
        Some((_, answer)) => answer,
        None => text,
    }
}

/// Drop code fences and surrounding prose, keeping the outermost JSON span.
pub fn trim_json(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()).trim();
        if let Some(inner) = text.strip_suffix("```") {
            text = inner.trim();
        }
    }

    let start = text.find(|c: char| c == '{' || c == '[');
    let end = text.rfind(|c: char| c == '}' || c == ']');
    match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Parse one model response for the agent called `agent`.
pub fn parse_output(format: OutputFormat, agent: &str, response: &LlmResponse) -> Result<ParsedOutput> {
    if !response.tool_calls.is_empty() {
        return Ok(ParsedOutput::actions(
            response.tool_calls.iter().map(action_from_tool_call).collect(),
        ));
    }

    let content = response.content.trim();
    if content.is_empty() {
        return Err(Error::parse("content is empty"));
    }

    let mut parsed = match format {
        OutputFormat::Standard => parse_standard(agent, content)?,
        OutputFormat::Graph => parse_graph(agent, content)?,
        OutputFormat::Sop => parse_sop(agent, content)?,
        OutputFormat::Management => parse_management(agent, content)?,
    };
    for msg in &mut parsed.messages {
        msg.sender = agent.to_string();
    }
    Ok(parsed)
}

fn action_from_tool_call(call: &ToolCall) -> StepAction {
    StepAction {
        id: call.id.clone(),
        action: call.function.name.clone(),
        input: call.function.arguments.clone(),
        log: serde_json::to_string(call).unwrap_or_default(),
        ..Default::default()
    }
}

fn parse_standard(agent: &str, content: &str) -> Result<ParsedOutput> {
    let json = trim_json(content);
    if json.starts_with('[') && json.ends_with(']') {
        let Value::Array(items) = parse_json(json)? else {
            return Err(Error::parse("expected a JSON array of messages"));
        };
        let messages = messages_from_items(agent, &items)?;
        if messages.is_empty() {
            return Err(Error::parse("no valid messages found"));
        }
        return Ok(ParsedOutput::messages(messages));
    }

    let obj = parse_object(json)?;
    if let Some(action) = action_from_object(&obj, json) {
        return Ok(ParsedOutput::actions(vec![action]));
    }
    Ok(ParsedOutput::messages(vec![message_from_object(
        agent,
        &obj,
        json.to_string(),
        None,
    )?]))
}

fn parse_graph(agent: &str, content: &str) -> Result<ParsedOutput> {
    let json = trim_json(content);
    let value = parse_json(json)?;

    if let Value::Array(items) = &value {
        let actions: Option<Vec<StepAction>> = items
            .iter()
            .map(|item| item.as_object().and_then(|obj| action_from_object(obj, json)))
            .collect();
        if let Some(actions) = actions.filter(|a| !a.is_empty()) {
            return Ok(ParsedOutput::actions(actions));
        }
        let messages = messages_from_items(agent, items)?;
        if messages.is_empty() {
            return Err(Error::parse("no valid actions or messages found"));
        }
        return Ok(ParsedOutput::messages(messages));
    }

    let Value::Object(obj) = value else {
        return Err(Error::parse("expected a JSON object or array"));
    };
    if let Some(action) = action_from_object(&obj, json) {
        return Ok(ParsedOutput::actions(vec![action]));
    }
    Ok(ParsedOutput::messages(vec![message_from_object(
        agent,
        &obj,
        json.to_string(),
        None,
    )?]))
}

fn parse_sop(agent: &str, content: &str) -> Result<ParsedOutput> {
    // The graph may arrive wrapped in a JSON message.
    let wrapped = parse_object(trim_json(content))
        .ok()
        .and_then(|obj| obj.get("content").and_then(Value::as_str).map(str::to_string));
    let source = wrapped.as_deref().unwrap_or(content);

    let dot = sop::extract(source)
        .ok_or_else(|| Error::parse("no sop graph found, answer with a DOT digraph"))?;
    sop::parse(dot).map_err(|e| Error::parse(format!("invalid sop graph: {}", e)))?;

    let mut msg = Message::sop(agent, dot);
    msg.log = content.to_string();
    Ok(ParsedOutput::messages(vec![msg]))
}

fn parse_management(agent: &str, content: &str) -> Result<ParsedOutput> {
    let json = trim_json(content);
    let obj = parse_object(json)?;

    let create = match obj.get("create") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| Error::parse(format!("invalid 'create' field: {}", e)))?,
    };
    let info = ManagementInfo {
        create,
        select: names_field(&obj, "select")?,
        remove: names_field(&obj, "remove")?,
        replace: names_field(&obj, "replace")?,
    };

    let mut msg = Message::management(agent, info);
    msg.thought = text_field(obj.get("thought"));
    msg.content = text_field(obj.get("content"));
    if msg.content.is_empty() {
        msg.content = text_field(obj.get("guidance"));
    }
    msg.receiver = receiver_field(&obj, "")?;
    msg.log = json.to_string();
    Ok(ParsedOutput::messages(vec![msg]))
}

// =============================================================================
// JSON helpers
// =============================================================================

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| Error::parse(e.to_string()))
}

fn parse_object(text: &str) -> Result<Map<String, Value>> {
    match parse_json(text)? {
        Value::Object(obj) => Ok(obj),
        _ => Err(Error::parse("expected a JSON object")),
    }
}

/// Strings pass through; anything else is re-serialized.
fn text_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn receiver_field(obj: &Map<String, Value>, at: &str) -> Result<String> {
    match obj.get("receiver") {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(array @ Value::Array(_)) => Ok(array.to_string()),
        Some(_) => Err(Error::parse(format!(
            "'receiver' field must be a string or an array{}",
            at
        ))),
    }
}

/// Agent names given as an array or a comma separated string.
fn names_field(obj: &Map<String, Value>, key: &str) -> Result<Vec<String>> {
    let names: Vec<String> = match obj.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        Some(Value::Array(items)) => items.iter().map(|v| text_field(Some(v))).collect(),
        Some(_) => {
            return Err(Error::parse(format!(
                "'{}' field must be a list of agent names",
                key
            )))
        }
    };
    Ok(names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect())
}

fn action_from_object(obj: &Map<String, Value>, log: &str) -> Option<StepAction> {
    let action = obj
        .get("action")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())?;

    Some(StepAction {
        id: text_field(obj.get("id")),
        action: action.to_string(),
        thought: text_field(obj.get("thought")),
        input: text_field(obj.get("input")),
        node: text_field(obj.get("node")),
        log: log.to_string(),
        ..Default::default()
    })
}

fn messages_from_items(agent: &str, items: &[Value]) -> Result<Vec<Message>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(obj) => message_from_object(agent, obj, item.to_string(), Some(i)),
            _ => Err(Error::parse(format!("message at index {} is not an object", i))),
        })
        .collect()
}

/// Build a message from a model-written object.
///
/// `cate` is required. Tags other than MSG/END are coerced to MSG, which then
/// needs a `receiver`. Non-string `content` is re-serialized, and a receiver
/// array is kept as its JSON text.
fn message_from_object(
    agent: &str,
    obj: &Map<String, Value>,
    log: String,
    index: Option<usize>,
) -> Result<Message> {
    let at = index
        .map(|i| format!(" for message at index {}", i))
        .unwrap_or_default();

    let cate = match obj.get("cate") {
        None => {
            return Err(Error::parse(format!(
                "message content missing required 'cate' field{}",
                at
            )))
        }
        Some(Value::String(cate)) => cate,
        Some(_) => return Err(Error::parse(format!("'cate' field must be a string{}", at))),
    };
    let kind = match MessageType::parse(cate) {
        Some(kind @ (MessageType::Msg | MessageType::End)) => kind,
        _ => {
            if !obj.contains_key("receiver") {
                return Err(Error::parse(format!("field 'receiver' is required{}", at)));
            }
            MessageType::Msg
        }
    };

    Ok(Message {
        kind,
        thought: text_field(obj.get("thought")),
        content: text_field(obj.get("content")),
        sender: agent.to_string(),
        receiver: receiver_field(obj, &at)?,
        condition: text_field(obj.get("condition")),
        log,
        ..Default::default()
    })
}

//! Append-only message log with a monotonic read cursor.

use teamflow_core::types::Message;

/// Ordered message log shared by the whole team.
///
/// The cursor points at the next unread message. Per-consumer views are
/// produced by [`MessageLog::load`] with a filter that sees each message's
/// index and the current cursor.
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
    cursor: usize,
    window: usize,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log whose replays are limited to the trailing `window` messages.
    pub fn with_window(window: usize) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    pub fn save(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Replay messages accepted by `filter(index, cursor, message)`.
    pub fn load<F>(&self, filter: F) -> Vec<Message>
    where
        F: Fn(usize, usize, &Message) -> bool,
    {
        let mut msgs: Vec<Message> = self
            .messages
            .iter()
            .enumerate()
            .filter(|(i, m)| filter(*i, self.cursor, m))
            .map(|(_, m)| m.clone())
            .collect();

        if self.window > 0 && msgs.len() > self.window {
            msgs.drain(..msgs.len() - self.window);
        }
        msgs
    }

    /// Replay everything.
    pub fn load_all(&self) -> Vec<Message> {
        self.load(|_, _, _| true)
    }

    /// Take the next deliverable message.
    ///
    /// Only MSG/END/CREATIVE messages whose sender differs from their
    /// receiver are deliverable; others are skipped.
    pub fn load_next(&mut self) -> Option<Message> {
        self.load_next_if(|_| true)
    }

    /// Like [`MessageLog::load_next`], but when `filter` rejects the next
    /// deliverable message nothing is returned and the cursor stays on it.
    pub fn load_next_if<F>(&mut self, filter: F) -> Option<Message>
    where
        F: Fn(&Message) -> bool,
    {
        while self.cursor < self.messages.len() {
            let msg = &self.messages[self.cursor];
            let deliverable =
                (msg.is_msg() || msg.is_end() || msg.is_creative()) && msg.sender != msg.receiver;
            if deliverable {
                if !filter(msg) {
                    return None;
                }
                self.cursor += 1;
                return Some(self.messages[self.cursor - 1].clone());
            }
            self.cursor += 1;
        }
        None
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.cursor = 0;
    }

    /// Give the named agents a fresh start.
    ///
    /// Messages they sent are dropped. Of the messages addressed solely to one
    /// of them, only the first per agent survives, and the cursor is rewound
    /// to the earliest survivor so delivery resumes from there. Without a
    /// survivor the cursor is only clamped to the shorter log, so nothing
    /// already delivered comes back.
    pub fn remove_messages_by_agents(&mut self, agents: &[String]) {
        if agents.is_empty() {
            return;
        }

        let before = (self.messages.len(), self.cursor);
        let mut first_kept: Vec<&String> = Vec::new();
        let mut restart: Option<usize> = None;
        let mut kept: Vec<Message> = Vec::with_capacity(self.messages.len());

        for msg in self.messages.drain(..) {
            if agents.iter().any(|a| *a == msg.sender) {
                continue;
            }

            let receivers = msg.receivers();
            if receivers.len() == 1 {
                if let Some(agent) = agents.iter().find(|a| **a == receivers[0]) {
                    if first_kept.contains(&agent) {
                        continue;
                    }
                    first_kept.push(agent);
                    if restart.is_none() {
                        restart = Some(kept.len());
                    }
                }
            }
            kept.push(msg);
        }

        self.messages = kept;
        self.cursor = match restart {
            Some(index) => index,
            None => self.cursor.min(self.messages.len()),
        };

        tracing::debug!(
            agents = ?agents,
            before_len = before.0,
            before_cursor = before.1,
            after_len = self.messages.len(),
            after_cursor = self.cursor,
            "Removed messages for replaced agents"
        );
    }
}

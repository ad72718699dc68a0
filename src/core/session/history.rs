use crate::core::llm::ChatMessage;

/// Role-alternating conversation log.
///
/// Entries are only ever appended as user/assistant pairs, so the log always
/// starts with a user entry and alternates from there. Truncation drops the
/// oldest pairs.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
    max_messages: usize,
}

impl ConversationHistory {
    /// `max_messages` is rounded down to an even number, minimum 2.
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages: (max_messages - max_messages % 2).max(2),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Append one completed exchange.
    pub fn commit_turn(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.messages.push(ChatMessage::user(user));
        self.messages.push(ChatMessage::assistant(assistant));

        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }

    /// Prompt for a new turn: optional system entry, history, then `user`.
    pub fn prompt(&self, system_prompt: Option<&str>, user: &str) -> Vec<ChatMessage> {
        let mut prompt = Vec::with_capacity(self.messages.len() + 2);
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            prompt.push(ChatMessage::system(system));
        }
        prompt.extend(self.messages.iter().cloned());
        prompt.push(ChatMessage::user(user));
        prompt
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

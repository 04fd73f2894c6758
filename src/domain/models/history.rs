use serde::Serialize;

use super::message::ChatMessage;

/// The ordered message log sent upstream as the context window of every turn.
///
/// The system prompt is always the first element and survives
/// [`ConversationHistory::reset`]. Only user and assistant messages can be
/// appended after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(prompt)],
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Drop everything except the system prompt.
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    pub fn system_prompt(&self) -> &str {
        self.messages
            .first()
            .map(ChatMessage::content)
            .unwrap_or_default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::models::provider::MessageRole;

/// A single entry in the visible conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_error: bool,
}

impl ChatMessage {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            is_error: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Model, text)
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}

/// Handle to an exchange accepted by [`ChatState::begin_exchange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExchange {
    pub user_text: String,
    pub reply_id: String,
}

/// In-memory conversation shown by the UI, plus the loading flag.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    messages: Vec<ChatMessage>,
    is_loading: bool,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Records the user's message and an empty model placeholder.
    ///
    /// Returns `None` for blank input or while a reply is still loading.
    pub fn begin_exchange(&mut self, input: &str) -> Option<PendingExchange> {
        let user_text = input.trim();
        if user_text.is_empty() || self.is_loading {
            return None;
        }

        let user_message = ChatMessage::user(user_text);
        let mut placeholder = ChatMessage::model(String::new());
        // Keep the reply ordered after the question even on coarse clocks.
        if placeholder.timestamp <= user_message.timestamp {
            placeholder.timestamp = user_message.timestamp + chrono::Duration::milliseconds(1);
        }
        let reply_id = placeholder.id.clone();

        self.messages.push(user_message);
        self.messages.push(placeholder);
        self.is_loading = true;

        Some(PendingExchange {
            user_text: user_text.to_string(),
            reply_id,
        })
    }

    pub fn append_reply(&mut self, reply_id: &str, delta: &str) {
        if delta.is_empty() {
            return;
        }
        if let Some(message) = self.find_mut(reply_id) {
            message.text.push_str(delta);
        }
    }

    pub fn fail_reply(&mut self, reply_id: &str, error_text: &str) {
        if let Some(message) = self.find_mut(reply_id) {
            message.text = error_text.to_string();
            message.is_error = true;
        }
    }

    pub fn finish_exchange(&mut self) {
        self.is_loading = false;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_exchange_appends_user_and_placeholder() {
        let mut state = ChatState::new();
        let exchange = state.begin_exchange("  what is rust?  ").unwrap();

        assert_eq!(exchange.user_text, "what is rust?");
        assert!(state.is_loading());
        assert_eq!(state.messages().len(), 2);

        let user = &state.messages()[0];
        let reply = &state.messages()[1];
        assert!(user.is_user());
        assert_eq!(user.text, "what is rust?");
        assert_eq!(reply.role, MessageRole::Model);
        assert_eq!(reply.id, exchange.reply_id);
        assert!(reply.text.is_empty());
        assert!(!reply.is_error);
        assert!(reply.timestamp > user.timestamp);
    }

    #[test]
    fn test_blank_input_is_rejected() {
        let mut state = ChatState::new();
        assert!(state.begin_exchange("").is_none());
        assert!(state.begin_exchange(" \n\t ").is_none());
        assert!(state.is_empty());
        assert!(!state.is_loading());
    }

    #[test]
    fn test_input_rejected_while_loading() {
        let mut state = ChatState::new();
        state.begin_exchange("first").unwrap();
        assert!(state.begin_exchange("second").is_none());
        assert_eq!(state.messages().len(), 2);

        state.finish_exchange();
        assert!(state.begin_exchange("second").is_some());
        assert_eq!(state.messages().len(), 4);
    }

    #[test]
    fn test_deltas_reach_only_the_placeholder() {
        let mut state = ChatState::new();
        let first = state.begin_exchange("one").unwrap();
        state.append_reply(&first.reply_id, "Fir");
        state.append_reply(&first.reply_id, "");
        state.append_reply(&first.reply_id, "st");
        state.finish_exchange();

        let second = state.begin_exchange("two").unwrap();
        state.append_reply(&second.reply_id, "Second");
        state.append_reply("unknown-id", "ignored");

        let texts: Vec<&str> = state.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "First", "two", "Second"]);
    }

    #[test]
    fn test_failure_replaces_partial_text() {
        let mut state = ChatState::new();
        let exchange = state.begin_exchange("hello").unwrap();
        state.append_reply(&exchange.reply_id, "partial answ");
        state.fail_reply(&exchange.reply_id, "something broke");
        state.finish_exchange();

        let reply = state.last().unwrap();
        assert_eq!(reply.text, "something broke");
        assert!(reply.is_error);
        assert!(!state.is_loading());
    }

    #[test]
    fn test_clear_mid_stream_drops_late_deltas() {
        let mut state = ChatState::new();
        let exchange = state.begin_exchange("hello").unwrap();
        state.clear();
        state.append_reply(&exchange.reply_id, "late");
        state.fail_reply(&exchange.reply_id, "late error");

        assert!(state.is_empty());
        state.finish_exchange();
        assert!(!state.is_loading());
    }

    #[test]
    fn test_reply_ids_are_unique() {
        let mut state = ChatState::new();
        let a = state.begin_exchange("a").unwrap();
        state.finish_exchange();
        let b = state.begin_exchange("b").unwrap();
        assert_ne!(a.reply_id, b.reply_id);
    }
}

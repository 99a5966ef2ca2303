pub mod service;
pub mod types;

pub use service::{ChatService, ChatServiceConfig, ReplyEvent, ReplyStream, DEFAULT_ERROR_REPLY};
pub use types::{ChatMessage, ChatState, MessageRole, PendingExchange};

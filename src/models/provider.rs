use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse>;
    async fn stream_message(&self, request: ChatRequest) -> Result<Box<dyn ChatStream>>;
    fn supports_streaming(&self) -> bool;
    fn get_provider_name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub id: String,
    pub model: String,
    pub system_instruction: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>, model: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            model,
            system_instruction: None,
            messages,
            temperature: None,
            max_tokens: None,
            timeout: Some(Duration::from_secs(60)),
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub request_id: String,
    pub model: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
    pub thought_signature: Option<String>,
}

/// One turn of conversation history as sent to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Opaque reasoning signature returned with a model turn; sent back as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            thought_signature: None,
        }
    }

    pub fn with_thought_signature(mut self, signature: Option<String>) -> Self {
        self.thought_signature = signature;
        self
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Model, content)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "model")]
    Model,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

#[async_trait]
pub trait ChatStream: Send {
    async fn next_chunk(&mut self) -> Result<Option<StreamChunk>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    pub thought_signature: Option<String>,
}

pub mod gemini;
pub mod provider;

pub use gemini::{GeminiProvider, GeminiStream};
pub use provider::{
    ChatRequest, ChatResponse, ChatStream, Message, MessageRole, ModelProvider, StreamChunk,
    TokenUsage,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::gemini::DEFAULT_MODEL;
use crate::models::provider::{ChatRequest, ChatResponse, ChatStream, Message, ModelProvider};

pub const DEFAULT_ERROR_REPLY: &str =
    "I'm sorry, I encountered an error. Even I have limits, apparently.";

/// Configuration for the chat service
#[derive(Debug, Clone)]
pub struct ChatServiceConfig {
    pub model: String,
    pub system_instruction: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub timeout: Duration,
    /// Text shown in place of a reply whose request failed.
    pub error_reply: String,
}

impl Default for ChatServiceConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_instruction: None,
            temperature: None,
            max_output_tokens: None,
            timeout: Duration::from_secs(60),
            error_reply: DEFAULT_ERROR_REPLY.to_string(),
        }
    }
}

/// Progress of one exchange, as reported by [`ChatService::run_exchange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    Delta(String),
    Failed(String),
    Finished,
}

#[derive(Debug)]
struct ChatSession {
    id: String,
    history: Vec<Message>,
    created_at: DateTime<Utc>,
}

impl ChatSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionSlot {
    session: Option<ChatSession>,
    generation: u64,
}

/// Owns the lazily created model session and drives streamed exchanges.
pub struct ChatService {
    provider: Arc<dyn ModelProvider>,
    config: ChatServiceConfig,
    slot: Arc<Mutex<SessionSlot>>,
}

impl ChatService {
    pub fn new(provider: Arc<dyn ModelProvider>, config: ChatServiceConfig) -> Self {
        info!(
            "Chat service using provider '{}' with model {}",
            provider.get_provider_name(),
            config.model
        );

        Self {
            provider,
            config,
            slot: Arc::new(Mutex::new(SessionSlot::default())),
        }
    }

    pub fn config(&self) -> &ChatServiceConfig {
        &self.config
    }

    pub fn has_session(&self) -> bool {
        self.slot.lock().session.is_some()
    }

    /// Completed turns of the current session, oldest first.
    pub fn history(&self) -> Vec<Message> {
        self.slot
            .lock()
            .session
            .as_ref()
            .map(|session| session.history.clone())
            .unwrap_or_default()
    }

    /// Drops the current session. Streams opened before the reset will not
    /// record their turn.
    pub fn reset_session(&self) {
        let mut slot = self.slot.lock();
        if let Some(session) = slot.session.take() {
            info!(
                "Resetting chat session {} ({} turns, started {})",
                session.id,
                session.history.len(),
                session.created_at.format("%H:%M:%S")
            );
        }
        slot.generation += 1;
    }

    fn prepare_request(&self, text: &str) -> (ChatRequest, u64) {
        let mut slot = self.slot.lock();
        let generation = slot.generation;
        let session = slot.session.get_or_insert_with(|| {
            let session = ChatSession::new();
            debug!("Created chat session {}", session.id);
            session
        });

        let mut messages = session.history.clone();
        messages.push(Message::user(text));

        let mut request =
            ChatRequest::new(messages, self.config.model.clone()).with_timeout(self.config.timeout);
        if let Some(instruction) = &self.config.system_instruction {
            request = request.with_system_instruction(instruction.clone());
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.config.max_output_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        (request, generation)
    }

    /// Sends `text` on the current session and returns the streamed reply.
    pub async fn send_message_stream(&self, text: &str) -> Result<ReplyStream> {
        let (request, generation) = self.prepare_request(text);
        debug!(
            "Sending message {} with {} prior turns",
            request.id,
            request.messages.len() - 1
        );

        let inner = self.provider.stream_message(request).await?;

        Ok(ReplyStream {
            inner,
            slot: Arc::clone(&self.slot),
            generation,
            user_text: text.to_string(),
            accumulated: String::new(),
            signature: None,
            done: false,
        })
    }

    /// Sends `text` on the current session and waits for the whole reply.
    pub async fn send_message(&self, text: &str) -> Result<ChatResponse> {
        let (request, generation) = self.prepare_request(text);
        debug!("Sending non-streamed message {}", request.id);

        let response = self.provider.send_message(request).await?;
        record_turn(
            &self.slot,
            generation,
            text,
            &response.content,
            response.thought_signature.clone(),
        );
        Ok(response)
    }

    /// Streams a reply to `text`, reporting each delta to `on_event`.
    ///
    /// Any failure, including a reply that completes without text, is logged and
    /// reported as `ReplyEvent::Failed` carrying the configured error reply.
    /// `ReplyEvent::Finished` is always reported last.
    pub async fn run_exchange<F>(&self, text: &str, mut on_event: F)
    where
        F: FnMut(ReplyEvent) + Send,
    {
        match self.stream_into(text, &mut on_event).await {
            Ok(0) => {
                warn!("Reply from {} completed without text", self.provider.get_provider_name());
                on_event(ReplyEvent::Failed(self.config.error_reply.clone()));
            }
            Ok(received) => debug!("Reply complete ({} bytes)", received),
            Err(e) => {
                error!("Error sending message to {}: {}", self.provider.get_provider_name(), e);
                on_event(ReplyEvent::Failed(self.config.error_reply.clone()));
            }
        }
        on_event(ReplyEvent::Finished);
    }

    async fn stream_into<F>(&self, text: &str, on_event: &mut F) -> Result<usize>
    where
        F: FnMut(ReplyEvent) + Send,
    {
        let mut stream = self.send_message_stream(text).await?;
        let mut received = 0;
        while let Some(delta) = stream.next_delta().await? {
            received += delta.len();
            on_event(ReplyEvent::Delta(delta));
        }
        Ok(received)
    }
}

/// A reply being streamed from the provider.
///
/// The exchange is added to the session history once the stream ends cleanly.
pub struct ReplyStream {
    inner: Box<dyn ChatStream>,
    slot: Arc<Mutex<SessionSlot>>,
    generation: u64,
    user_text: String,
    accumulated: String,
    signature: Option<String>,
    done: bool,
}

impl ReplyStream {
    /// Next non-empty piece of reply text, or `None` once the reply is complete.
    pub async fn next_delta(&mut self) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }

        loop {
            match self.inner.next_chunk().await {
                Ok(Some(chunk)) => {
                    if let Some(reason) = &chunk.finish_reason {
                        debug!("Reply finished: {}", reason);
                    }
                    if chunk.thought_signature.is_some() {
                        self.signature = chunk.thought_signature;
                    }
                    if chunk.delta.is_empty() {
                        continue;
                    }
                    self.accumulated.push_str(&chunk.delta);
                    return Ok(Some(chunk.delta));
                }
                Ok(None) => {
                    self.done = true;
                    record_turn(
                        &self.slot,
                        self.generation,
                        &self.user_text,
                        &self.accumulated,
                        self.signature.take(),
                    );
                    return Ok(None);
                }
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            }
        }
    }
}

/// Adds a completed exchange to the session. Replies without text are not
/// recorded since the API rejects empty parts in later requests.
fn record_turn(
    slot: &Mutex<SessionSlot>,
    generation: u64,
    user_text: &str,
    reply: &str,
    signature: Option<String>,
) {
    if reply.is_empty() {
        debug!("Reply had no text; not recording turn");
        return;
    }
    let mut slot = slot.lock();
    if slot.generation != generation {
        debug!("Session was reset during the request; discarding turn");
        return;
    }
    if let Some(session) = slot.session.as_mut() {
        session.history.push(Message::user(user_text));
        session.history.push(Message::model(reply).with_thought_signature(signature));
    }
}

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::provider::{
    ChatRequest, ChatResponse, ChatStream, Message, ModelProvider, StreamChunk, TokenUsage,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self> {
        // No overall client timeout: it would also cut off long streamed replies.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::model_provider(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    fn build_request(&self, request: &ChatRequest) -> GeminiRequest {
        let contents = request.messages.iter().map(GeminiContent::from_message).collect();

        let system_instruction = request
            .system_instruction
            .as_ref()
            .filter(|text| !text.trim().is_empty())
            .map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart::text(text.clone())],
            });

        let generation_config = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            })
        } else {
            None
        };

        GeminiRequest {
            contents,
            system_instruction,
            generation_config,
        }
    }

    async fn check_status(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        warn!("Gemini API error: {} - {}", status, body);

        let summary = summarize_error_body(&body).unwrap_or(body);
        Err(Error::model_provider(format!("API error {}: {}", status, summary)))
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse> {
        let start_time = Instant::now();
        let body = self.build_request(&request);

        let mut builder = self
            .client
            .post(self.endpoint(&request.model, "generateContent"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::model_provider(format!("Request failed: {}", e)))?;
        let response = Self::check_status(response).await?;

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| Error::model_provider(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = gemini_response.error {
            return Err(error.into());
        }

        debug!(
            "Gemini reply received in {}ms",
            start_time.elapsed().as_millis()
        );

        Ok(ChatResponse {
            request_id: request.id,
            model: request.model,
            content: gemini_response.text(),
            created_at: Utc::now(),
            usage: gemini_response.usage(),
            finish_reason: gemini_response.finish_reason(),
            thought_signature: gemini_response.thought_signature(),
        })
    }

    async fn stream_message(&self, request: ChatRequest) -> Result<Box<dyn ChatStream>> {
        let body = self.build_request(&request);

        debug!(
            "Starting streaming request to Gemini: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        let pending = self
            .client
            .post(self.endpoint(&request.model, "streamGenerateContent"))
            .query(&[("alt", "sse")])
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send();

        // The timeout bounds the wait for response headers, not the whole reply.
        let response = match request.timeout {
            Some(limit) => tokio::time::timeout(limit, pending).await.map_err(|_| {
                Error::model_provider(format!("No response within {}s", limit.as_secs()))
            })?,
            None => pending.await,
        }
        .map_err(|e| Error::model_provider(format!("HTTP request failed: {}", e)))?;
        let response = Self::check_status(response).await?;

        Ok(Box::new(GeminiStream::from_response(response)))
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn get_provider_name(&self) -> &str {
        "gemini"
    }
}

/// Pulls the human readable `error.message` out of a Gemini error body.
fn summarize_error_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let message = value.pointer("/error/message")?.as_str()?;
    Some(message.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Splits a server-sent event byte stream into `data:` payloads.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(payload) = Self::parse_line(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flushes a final line that arrived without a trailing newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        Self::parse_line(&line)
    }

    fn parse_line(line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\n', '\r']);

        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        line.strip_prefix("data:")
            .map(|data| data.trim_start().to_string())
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

pub struct GeminiStream {
    bytes: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl GeminiStream {
    pub fn from_response(response: Response) -> Self {
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(Error::from));
        Self::new(Box::pin(bytes))
    }

    fn new(bytes: ByteStream) -> Self {
        Self {
            bytes,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn parse_payload(payload: &str) -> Result<Option<StreamChunk>> {
        let response = match serde_json::from_str::<GeminiResponse>(payload) {
            Ok(response) => response,
            Err(e) => {
                debug!("Failed to parse stream payload: {} (data: {})", e, payload);
                return Ok(None);
            }
        };

        if let Some(error) = response.error {
            return Err(error.into());
        }

        Ok(Some(StreamChunk {
            delta: response.text(),
            finish_reason: response.finish_reason(),
            usage: response.usage(),
            thought_signature: response.thought_signature(),
        }))
    }
}

#[async_trait]
impl ChatStream for GeminiStream {
    async fn next_chunk(&mut self) -> Result<Option<StreamChunk>> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                match Self::parse_payload(&payload)? {
                    Some(chunk) => return Ok(Some(chunk)),
                    None => continue,
                }
            }

            if self.finished {
                return Ok(None);
            }

            match self.bytes.next().await {
                Some(Ok(bytes)) => {
                    let payloads = self.decoder.push(&bytes);
                    self.pending.extend(payloads);
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(Error::model_provider(format!("Stream read error: {}", e)));
                }
                None => {
                    self.finished = true;
                    if let Some(payload) = self.decoder.finish() {
                        self.pending.push_back(payload);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn from_message(message: &Message) -> Self {
        Self {
            role: Some(message.role.as_str().to_string()),
            parts: vec![GeminiPart {
                thought_signature: message.thought_signature.clone(),
                ..GeminiPart::text(message.content.clone())
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            thought: None,
            thought_signature: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    error: Option<GeminiApiError>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate, skipping thought parts.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|part| part.thought != Some(true))
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Last signature attached to any part of the first candidate.
    fn thought_signature(&self) -> Option<String> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|content| {
                content
                    .parts
                    .iter()
                    .rev()
                    .find_map(|part| part.thought_signature.clone())
            })
    }

    fn finish_reason(&self) -> Option<String> {
        self.candidates.first().and_then(|c| c.finish_reason.clone())
    }

    fn usage(&self) -> Option<TokenUsage> {
        self.usage_metadata
            .as_ref()
            .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

impl From<GeminiApiError> for Error {
    fn from(error: GeminiApiError) -> Self {
        Error::model_provider(format!("API error {}: {}", error.code, error.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::provider::MessageRole;

    fn stream_of(chunks: &[&str]) -> GeminiStream {
        let items: Vec<Result<Vec<u8>>> = chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        GeminiStream::new(Box::pin(futures_util::stream::iter(items)))
    }

    async fn collect_deltas(stream: &mut GeminiStream) -> Result<Vec<String>> {
        let mut deltas = Vec::new();
        while let Some(chunk) = stream.next_chunk().await? {
            deltas.push(chunk.delta);
        }
        Ok(deltas)
    }

    #[test]
    fn test_provider_creation() {
        let provider = GeminiProvider::new("test-key".to_string()).unwrap();
        assert_eq!(provider.get_provider_name(), "gemini");
        assert!(provider.supports_streaming());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let provider =
            GeminiProvider::with_base_url("k".to_string(), "http://localhost:8080/v1beta/".to_string())
                .unwrap();
        assert_eq!(
            provider.endpoint("gemini-3-flash-preview", "streamGenerateContent"),
            "http://localhost:8080/v1beta/models/gemini-3-flash-preview:streamGenerateContent"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let provider = GeminiProvider::new("test-key".to_string()).unwrap();
        let request = ChatRequest::new(
            vec![Message::user("Hello!"), Message::model("What now?"), Message::user("Code.")],
            DEFAULT_MODEL.to_string(),
        )
        .with_system_instruction("You are sharp.")
        .with_max_tokens(256);

        let body = serde_json::to_value(provider.build_request(&request)).unwrap();

        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "What now?");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are sharp.");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert!(body["generationConfig"].get("temperature").is_none());
    }

    #[test]
    fn test_blank_system_instruction_is_omitted() {
        let provider = GeminiProvider::new("test-key".to_string()).unwrap();
        let request = ChatRequest::new(vec![Message::new(MessageRole::User, "hi")], DEFAULT_MODEL.to_string())
            .with_system_instruction("   ");

        let body = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert!(body.get("systemInstruction").is_none());
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_model_turn_sends_back_thought_signature() {
        let provider = GeminiProvider::new("test-key".to_string()).unwrap();
        let request = ChatRequest::new(
            vec![
                Message::user("Hi"),
                Message::model("Hello").with_thought_signature(Some("c2lnLTE=".to_string())),
                Message::user("Again"),
            ],
            DEFAULT_MODEL.to_string(),
        );

        let body = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert_eq!(body["contents"][1]["parts"][0]["text"], "Hello");
        assert_eq!(body["contents"][1]["parts"][0]["thoughtSignature"], "c2lnLTE=");
        assert!(body["contents"][0]["parts"][0].get("thoughtSignature").is_none());
    }

    #[test]
    fn test_decoder_handles_split_lines_and_crlf() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let payloads = decoder.push(b"1}\r\n\r\n: keep-alive\r\ndata: two\n");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string(), "two".to_string()]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_flushes_unterminated_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: last").is_empty());
        assert_eq!(decoder.finish(), Some("last".to_string()));
    }

    #[test]
    fn test_decoder_keeps_multibyte_chars_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: héllo\n".as_bytes();
        let (head, tail) = bytes.split_at(8);
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["héllo".to_string()]);
    }

    #[test]
    fn test_error_body_summary() {
        let body = r#"{"error": {"code": 400, "message": "API key not\n  valid.", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(summarize_error_body(body), Some("API key not valid.".to_string()));
        assert_eq!(summarize_error_body("<html>"), None);
    }

    #[tokio::test]
    async fn test_stream_yields_deltas_in_order() {
        let mut stream = stream_of(&[
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hel\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"lo\"},{\"text\":\"!\"}]}}]}\n",
            "\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"\"}]},\"finishReason\":\"STOP\"}],",
            "\"usageMetadata\":{\"promptTokenCount\":4,\"candidatesTokenCount\":3}}\n\n",
        ]);

        let first = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(first.delta, "Hel");
        let second = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(second.delta, "lo!");
        let last = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(last.delta, "");
        assert_eq!(last.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(last.usage, Some(TokenUsage::new(4, 3)));
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_skips_thoughts_and_malformed_payloads() {
        let mut stream = stream_of(&[
            "data: not json\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"hmm\",\"thought\":true},{\"text\":\"Answer\"}]}}]}\n",
        ]);

        let deltas = collect_deltas(&mut stream).await.unwrap();
        assert_eq!(deltas, vec!["Answer".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_carries_thought_signature() {
        let mut stream = stream_of(&[
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Answer\"}]}}]}\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"\",\"thoughtSignature\":\"c2lnLTI=\"}]},\"finishReason\":\"STOP\"}]}\n",
        ]);

        let first = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(first.thought_signature, None);
        let last = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(last.delta, "");
        assert_eq!(last.thought_signature.as_deref(), Some("c2lnLTI="));
    }

    #[tokio::test]
    async fn test_stream_error_payload_fails() {
        let mut stream = stream_of(&[
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"partial\"}]}}]}\n",
            "data: {\"error\":{\"code\":503,\"message\":\"overloaded\"}}\n",
        ]);

        assert_eq!(stream.next_chunk().await.unwrap().unwrap().delta, "partial");
        let err = stream.next_chunk().await.unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_stream_transport_error_fails() {
        let items: Vec<Result<Vec<u8>>> = vec![
            Ok(b"data: {\"candidates\":[]}\n".to_vec()),
            Err(Error::unknown("connection reset")),
        ];
        let mut stream = GeminiStream::new(Box::pin(futures_util::stream::iter(items)));

        assert_eq!(stream.next_chunk().await.unwrap().unwrap().delta, "");
        assert!(stream.next_chunk().await.is_err());
        assert!(stream.next_chunk().await.unwrap().is_none());
    }
}

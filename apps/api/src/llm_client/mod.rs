/// LLM Client: the single point of entry for all generation-backend calls.
///
/// ARCHITECTURAL RULE: No other module may call the Gemini API directly.
/// All LLM interactions MUST go through `StreamingClient`.
///
/// No retry logic lives here. Retrying is left to the user re-submitting.
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub mod sse;

use crate::llm_client::sse::SseDecoder;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
/// Chunks buffered between the HTTP reader task and the orchestrator.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid API key: {0}")]
    InvalidCredential(String),

    #[error("Quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),
}

/// Backend-reported terminal status of a generation stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Blocklist,
    ProhibitedContent,
    Spii,
    /// A prompt-level block (`promptFeedback.blockReason`).
    PromptBlocked(String),
    Other(String),
}

impl FinishReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::MaxTokens,
            "SAFETY" => FinishReason::Safety,
            "RECITATION" => FinishReason::Recitation,
            "BLOCKLIST" => FinishReason::Blocklist,
            "PROHIBITED_CONTENT" => FinishReason::ProhibitedContent,
            "SPII" => FinishReason::Spii,
            other => FinishReason::Other(other.to_string()),
        }
    }

    /// Reasons that mean the content must not be shown.
    pub fn is_content_block(&self) -> bool {
        matches!(
            self,
            FinishReason::Safety
                | FinishReason::Recitation
                | FinishReason::Blocklist
                | FinishReason::ProhibitedContent
                | FinishReason::Spii
                | FinishReason::PromptBlocked(_)
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "STOP",
            FinishReason::MaxTokens => "MAX_TOKENS",
            FinishReason::Safety => "SAFETY",
            FinishReason::Recitation => "RECITATION",
            FinishReason::Blocklist => "BLOCKLIST",
            FinishReason::ProhibitedContent => "PROHIBITED_CONTENT",
            FinishReason::Spii => "SPII",
            FinishReason::PromptBlocked(r) | FinishReason::Other(r) => r,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(rename = "promptTokenCount", default)]
    pub prompt_tokens: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    pub output_tokens: u32,
    #[serde(rename = "totalTokenCount", default)]
    pub total_tokens: u32,
}

/// One increment of generated text. The terminal chunk has `is_complete` set and carries the
/// finish reason and usage counters.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    pub text: String,
    pub is_complete: bool,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_complete: false,
            finish_reason: None,
            usage: None,
        }
    }

    pub fn terminal(
        text: impl Into<String>,
        reason: FinishReason,
        usage: Option<TokenUsage>,
    ) -> Self {
        Self {
            text: text.into(),
            is_complete: true,
            finish_reason: Some(reason),
            usage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub system_text: String,
    pub user_text: String,
    pub credential: String,
    pub params: GenerationParams,
}

/// Receiving half of a generation stream. Dropping it stops the reader task.
pub type ChunkReceiver = mpsc::Receiver<Result<StreamChunk, LlmError>>;

/// Uniform chunked-stream contract over a concrete generation backend.
///
/// Errors known before the first byte (credential, quota, rate limit) are returned directly;
/// errors after that arrive through the receiver.
#[async_trait]
pub trait StreamingClient: Send + Sync {
    async fn stream(&self, request: StreamRequest) -> Result<ChunkReceiver, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Gemini wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamEvent {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<TokenUsage>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

// ────────────────────────────────────────────────────────────────────────────
// Gemini client
// ────────────────────────────────────────────────────────────────────────────

/// Streams from Gemini's `streamGenerateContent` endpoint over server-sent events.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, model: &str, timeout: std::time::Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl StreamingClient for GeminiClient {
    async fn stream(&self, request: StreamRequest) -> Result<ChunkReceiver, LlmError> {
        let body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: &request.system_text,
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart {
                    text: &request.user_text,
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: request.params.temperature,
                max_output_tokens: request.params.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &request.credential)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("Gemini API returned {status}");
            return Err(classify_api_error(status.as_u16(), &text));
        }

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        tokio::spawn(pump_events(response, tx));
        Ok(rx)
    }
}

/// Reads SSE events off the response body and forwards them as chunks until a terminal chunk,
/// an error, or the receiver going away.
async fn pump_events(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<StreamChunk, LlmError>>,
) {
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    while let Some(next) = body.next().await {
        let bytes = match next {
            Ok(b) => b,
            Err(e) => {
                let _ = tx.send(Err(LlmError::Http(e))).await;
                return;
            }
        };

        let events = match decoder.push(&bytes) {
            Ok(events) => events,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        for data in events {
            let chunk = parse_event(&data);
            let terminal = matches!(&chunk, Ok(c) if c.is_complete) || chunk.is_err();
            if tx.send(chunk).await.is_err() {
                debug!("Chunk receiver dropped; stopping stream");
                return;
            }
            if terminal {
                return;
            }
        }
    }

    if let Some(data) = decoder.finish() {
        let _ = tx.send(parse_event(&data)).await;
    }
    // If no terminal chunk was sent, dropping `tx` closes the channel and the consumer treats
    // that as a transport failure.
}

/// Converts one SSE `data:` payload into a chunk.
pub fn parse_event(data: &str) -> Result<StreamChunk, LlmError> {
    let event: GeminiStreamEvent = serde_json::from_str(data)?;

    if let Some(reason) = event.prompt_feedback.and_then(|f| f.block_reason) {
        return Ok(StreamChunk::terminal(
            "",
            FinishReason::PromptBlocked(reason),
            event.usage_metadata,
        ));
    }

    let mut text = String::new();
    let mut finish_reason = None;
    if let Some(candidate) = event.candidates.into_iter().next() {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(t) = part.text {
                    text.push_str(&t);
                }
            }
        }
        finish_reason = candidate
            .finish_reason
            .filter(|r| r != "FINISH_REASON_UNSPECIFIED")
            .map(|r| FinishReason::parse(&r));
    }

    Ok(match finish_reason {
        Some(reason) => StreamChunk::terminal(text, reason, event.usage_metadata),
        None => StreamChunk::text(text),
    })
}

/// Maps a non-success HTTP response to a named failure.
pub fn classify_api_error(status: u16, body: &str) -> LlmError {
    let (message, api_status, details) = match serde_json::from_str::<GeminiError>(body) {
        Ok(e) => (e.error.message, e.error.status, e.error.details),
        Err(_) => (body.to_string(), String::new(), vec![]),
    };
    let lower = message.to_lowercase();
    let key_invalid = body.contains("API_KEY_INVALID")
        || details
            .iter()
            .any(|d| d.get("reason").and_then(|r| r.as_str()) == Some("API_KEY_INVALID"));

    match status {
        401 | 403 => LlmError::InvalidCredential(message),
        400 if key_invalid || lower.contains("api key") => LlmError::InvalidCredential(message),
        429 if lower.contains("quota") => LlmError::QuotaExceeded(message),
        429 => LlmError::RateLimited(message),
        _ if api_status == "RESOURCE_EXHAUSTED" => LlmError::QuotaExceeded(message),
        _ => LlmError::Api { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_event() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}],"role":"model"}}]}"#;
        assert_eq!(parse_event(data).unwrap(), StreamChunk::text("Hello"));
    }

    #[test]
    fn test_parse_terminal_event_with_usage() {
        let data = r#"{
            "candidates":[{"content":{"parts":[{"text":" world"}]},"finishReason":"STOP"}],
            "usageMetadata":{"promptTokenCount":120,"candidatesTokenCount":2,"totalTokenCount":122}
        }"#;
        let chunk = parse_event(data).unwrap();
        assert!(chunk.is_complete);
        assert_eq!(chunk.text, " world");
        assert_eq!(chunk.finish_reason, Some(FinishReason::Stop));
        let usage = chunk.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 120);
        assert_eq!(usage.output_tokens, 2);
        assert_eq!(usage.total_tokens, 122);
    }

    #[test]
    fn test_parse_safety_stop_without_content() {
        let data = r#"{"candidates":[{"finishReason":"SAFETY","safetyRatings":[]}]}"#;
        let chunk = parse_event(data).unwrap();
        assert_eq!(chunk.finish_reason, Some(FinishReason::Safety));
        assert!(chunk.finish_reason.unwrap().is_content_block());
    }

    #[test]
    fn test_parse_prompt_block() {
        let data = r#"{"promptFeedback":{"blockReason":"OTHER"}}"#;
        let chunk = parse_event(data).unwrap();
        assert!(chunk.is_complete);
        assert_eq!(
            chunk.finish_reason,
            Some(FinishReason::PromptBlocked("OTHER".to_string()))
        );
    }

    #[test]
    fn test_unspecified_finish_reason_is_not_terminal() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"x"}]},"finishReason":"FINISH_REASON_UNSPECIFIED"}]}"#;
        assert!(!parse_event(data).unwrap().is_complete);
    }

    #[test]
    fn test_parse_malformed_event() {
        assert!(matches!(parse_event("{not json"), Err(LlmError::Parse(_))));
    }

    #[test]
    fn test_finish_reason_parse() {
        assert_eq!(FinishReason::parse("MAX_TOKENS"), FinishReason::MaxTokens);
        assert_eq!(FinishReason::parse("RECITATION"), FinishReason::Recitation);
        assert_eq!(
            FinishReason::parse("LANGUAGE"),
            FinishReason::Other("LANGUAGE".to_string())
        );
        assert!(!FinishReason::MaxTokens.is_content_block());
        assert!(!FinishReason::Other("LANGUAGE".into()).is_content_block());
    }

    #[test]
    fn test_classify_invalid_key() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"API_KEY_INVALID"}]}}"#;
        assert!(matches!(
            classify_api_error(400, body),
            LlmError::InvalidCredential(_)
        ));
        assert!(matches!(
            classify_api_error(403, "forbidden"),
            LlmError::InvalidCredential(_)
        ));
    }

    #[test]
    fn test_classify_quota_vs_rate_limit() {
        let quota = r#"{"error":{"code":429,"message":"You exceeded your current quota, please check your plan and billing details.","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            classify_api_error(429, quota),
            LlmError::QuotaExceeded(_)
        ));

        let rate = r#"{"error":{"code":429,"message":"Too many requests, please slow down.","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            classify_api_error(429, rate),
            LlmError::RateLimited(_)
        ));
    }

    #[test]
    fn test_classify_other_errors() {
        let body = r#"{"error":{"code":500,"message":"Internal error","status":"INTERNAL"}}"#;
        match classify_api_error(500, body) {
            LlmError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Internal error");
            }
            other => panic!("unexpected {other:?}"),
        }
        // a 400 unrelated to the key stays generic
        let bad = r#"{"error":{"code":400,"message":"Request contains an invalid argument.","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            classify_api_error(400, bad),
            LlmError::Api { status: 400, .. }
        ));
    }

    #[test]
    fn test_endpoint_uses_sse() {
        let client = GeminiClient::new(
            "http://localhost:9999/",
            "gemini-test",
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-test:streamGenerateContent?alt=sse"
        );
    }
}

// Test doubles for the orchestrator and route tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::analysis::models::{AnalysisConfig, Depth, Domain, ExperienceLevel};
use crate::analysis::session::{Credential, Session};
use crate::analysis::verification::{BotVerifier, VerificationError};
use crate::document::models::DocumentInput;
use crate::document::normalize;
use crate::llm_client::{ChunkReceiver, LlmError, StreamChunk, StreamRequest, StreamingClient};

type ChunkSender = mpsc::Sender<Result<StreamChunk, LlmError>>;

/// Channel-driven stand-in for the generation backend. Each `stream` call opens a new channel
/// the test feeds through `send`.
#[derive(Default)]
pub struct FakeClient {
    calls: AtomicUsize,
    next_error: Mutex<Option<LlmError>>,
    streams: Mutex<Vec<Option<ChunkSender>>>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl FakeClient {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The next `stream` call fails before opening.
    pub fn fail_next(&self, error: LlmError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    pub fn last_request(&self) -> Option<StreamRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Sends on the stream opened by the `index`-th successful call.
    pub async fn send(&self, index: usize, chunk: Result<StreamChunk, LlmError>) {
        let tx = self.streams.lock().unwrap()[index]
            .clone()
            .expect("stream already closed");
        tx.send(chunk).await.expect("consumer is gone");
    }

    /// Ends the stream without a terminal chunk.
    pub fn close(&self, index: usize) {
        self.streams.lock().unwrap()[index] = None;
    }
}

#[async_trait]
impl StreamingClient for FakeClient {
    async fn stream(&self, request: StreamRequest) -> Result<ChunkReceiver, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.next_error.lock().unwrap().take() {
            return Err(e);
        }
        self.requests.lock().unwrap().push(request);
        let (tx, rx) = mpsc::channel(16);
        self.streams.lock().unwrap().push(Some(tx));
        Ok(rx)
    }
}

/// Always hands out a token and counts how often it was asked.
#[derive(Default)]
pub struct CountingVerifier {
    calls: AtomicUsize,
}

impl CountingVerifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BotVerifier for CountingVerifier {
    async fn get_token(&self, _action: &str) -> Result<String, VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("test-token".to_string())
    }
}

pub fn sample_config() -> AnalysisConfig {
    AnalysisConfig {
        depth: Depth::Compact,
        domain: Domain::Technical,
        target_role: "Backend Engineer".to_string(),
        target_company: "Acme".to_string(),
        experience_level: ExperienceLevel::Mid,
        geographic_focus: None,
        special_focus: None,
        memo: None,
    }
}

pub fn sample_resume() -> String {
    let mut text = String::from("Jane Doe\nBackend Engineer\n\nExperience\n");
    for i in 0..40 {
        text.push_str(&format!("- Built service {i} in Rust handling requests\n"));
    }
    text
}

/// A session with a document, a config and a credential: ready to submit.
pub fn ready_session() -> Arc<Session> {
    let session = Arc::new(Session::new());
    let doc = normalize(DocumentInput::Pasted(sample_resume())).expect("sample résumé normalizes");
    let ticket = session.begin_normalization();
    session.replace_document_if_latest(ticket, doc);
    session.set_config(sample_config());
    session.set_credential(Credential {
        api_key: "test-key".to_string(),
        remember: false,
    });
    session
}

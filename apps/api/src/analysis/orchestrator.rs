//! Analysis Orchestrator: the submission state machine.
//!
//! ```text
//! Idle → Validating → AwaitingBotToken → Streaming → Completed → CooldownActive → Idle
//!                                                  ↘ Failed
//! ```
//!
//! `submit` runs everything up to and including opening the stream, so request-time failures
//! (busy, cooldown, validation, token, credential, quota) reach the caller directly. Chunk
//! consumption then moves to a spawned task that owns the submission slot until the stream ends.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, OwnedMutexGuard};
#[cfg(test)]
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::analysis::hydrator::hydrate;
use crate::analysis::models::{
    AnalysisError, AnalysisResult, Phase, PromptPair, ValidationError,
};
use crate::analysis::prompts::TRUNCATION_NOTICE;
use crate::analysis::session::Session;
use crate::analysis::verification::BotVerifier;
use crate::llm_client::{
    ChunkReceiver, FinishReason, GenerationParams, LlmError, StreamRequest, StreamingClient,
    TokenUsage,
};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub cooldown_secs: u64,
    /// Action name bot-verification tokens are scoped to.
    pub bot_action: String,
    pub params: GenerationParams,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: 60,
            bot_action: "analyze_resume".to_string(),
            params: GenerationParams::default(),
        }
    }
}

/// What observers of one submission see, in order: snapshots, then exactly one terminal event.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    Snapshot(AnalysisResult),
    Completed(AnalysisResult),
    Failed(AnalysisError),
}

/// A submission whose stream is open.
pub struct Submission {
    pub events: mpsc::UnboundedReceiver<AnalysisEvent>,
    /// Consumption task; outside tests it runs detached.
    #[cfg(test)]
    pub task: JoinHandle<Result<AnalysisResult, AnalysisError>>,
}

#[derive(Clone)]
pub struct Orchestrator {
    session: Arc<Session>,
    llm: Arc<dyn StreamingClient>,
    settings: Arc<OrchestratorSettings>,
}

impl From<LlmError> for AnalysisError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::InvalidCredential(m) => AnalysisError::InvalidCredential(m),
            LlmError::QuotaExceeded(m) => AnalysisError::QuotaExceeded(m),
            LlmError::RateLimited(m) => AnalysisError::RateLimited(m),
            LlmError::Api { status, message } => {
                AnalysisError::Transport(format!("status {status}: {message}"))
            }
            LlmError::Http(e) => AnalysisError::Transport(e.to_string()),
            LlmError::Parse(e) => AnalysisError::Transport(format!("malformed response: {e}")),
            LlmError::Stream(m) => AnalysisError::Transport(m),
        }
    }
}

impl Orchestrator {
    pub fn new(
        session: Arc<Session>,
        llm: Arc<dyn StreamingClient>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            session,
            llm,
            settings: Arc::new(settings),
        }
    }

    pub async fn submit(&self, verifier: &dyn BotVerifier) -> Result<Submission, AnalysisError> {
        // Guards: no state change, no network.
        let slot = self
            .session
            .try_begin_submission()
            .ok_or(AnalysisError::StreamInProgress)?;
        let remaining = self.session.cooldown().remaining();
        if remaining > 0 {
            return Err(AnalysisError::CooldownActive {
                remaining_seconds: remaining,
            });
        }

        self.session.set_phase(Phase::Validating);
        let (prompts, api_key) = self.prepare().map_err(|e| self.fail(e))?;

        self.session.set_phase(Phase::AwaitingBotToken);
        // The token is single-use and only proves the browser passed the challenge.
        verifier
            .get_token(&self.settings.bot_action)
            .await
            .map_err(|e| self.fail(AnalysisError::BotVerification(e.to_string())))?;

        self.session.set_phase(Phase::Streaming);
        let request = StreamRequest {
            system_text: prompts.system_text,
            user_text: prompts.user_text,
            credential: api_key,
            params: self.settings.params,
        };
        let chunks = self
            .llm
            .stream(request)
            .await
            .map_err(|e| self.fail(e.into()))?;

        let result = AnalysisResult::started();
        let id = result.id;
        self.session.set_result(Some(result.clone()));

        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.session.install_cancel(cancel_tx);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let resets = self.session.reset_count();
        info!("Analysis {id} streaming");

        let this = self.clone();
        let _task = tokio::spawn(async move {
            this.consume(result, chunks, cancel_rx, events_tx, slot, resets)
                .await
        });

        Ok(Submission {
            events: events_rx,
            #[cfg(test)]
            task: _task,
        })
    }

    /// Stops chunk consumption of the in-flight stream, if any.
    pub fn cancel(&self) -> bool {
        self.session.cancel_stream()
    }

    /// Ordered checks, then a fresh prompt pair. The first failing check wins.
    fn prepare(&self) -> Result<(PromptPair, String), AnalysisError> {
        let document = self
            .session
            .document()
            .ok_or(ValidationError::MissingDocument)?;
        let config = self.session.config().ok_or(ValidationError::MissingConfig)?;
        if let Some(field) = config.first_missing_field() {
            return Err(ValidationError::MissingField(field).into());
        }
        let api_key = self
            .session
            .credential()
            .map(|c| c.api_key)
            .filter(|k| !k.trim().is_empty())
            .ok_or(ValidationError::MissingCredential)?;

        let prompts =
            hydrate(&config, &document.text).map_err(|e| AnalysisError::Template(e.to_string()))?;
        Ok((prompts, api_key))
    }

    async fn consume(
        self,
        mut result: AnalysisResult,
        mut chunks: ChunkReceiver,
        mut cancel: oneshot::Receiver<()>,
        events: mpsc::UnboundedSender<AnalysisEvent>,
        _slot: OwnedMutexGuard<()>,
        resets: u64,
    ) -> Result<AnalysisResult, AnalysisError> {
        // a finished oneshot must not be polled again
        let mut cancel_open = true;
        let outcome = loop {
            tokio::select! {
                signal = &mut cancel, if cancel_open => match signal {
                    Ok(()) => break Err(AnalysisError::Cancelled),
                    Err(_) => cancel_open = false,
                },
                next = chunks.recv() => match next {
                    None => {
                        break Err(AnalysisError::Transport(
                            "the stream ended before the response was complete".to_string(),
                        ))
                    }
                    Some(Err(e)) => break Err(e.into()),
                    Some(Ok(chunk)) => {
                        if let Some(reason) = chunk.finish_reason.as_ref().filter(|r| r.is_content_block()) {
                            break Err(AnalysisError::ContentPolicy {
                                reason: reason.as_str().to_string(),
                            });
                        }
                        if !chunk.text.is_empty() {
                            result.content.push_str(&chunk.text);
                            self.session.set_result(Some(result.clone()));
                            let _ = events.send(AnalysisEvent::Snapshot(result.clone()));
                        }
                        if chunk.is_complete {
                            let reason = chunk.finish_reason.unwrap_or(FinishReason::Stop);
                            break Ok((reason, chunk.usage));
                        }
                    }
                },
            }
        };
        // the stream is finished either way; a late cancel has nothing to stop
        self.session.clear_cancel();

        match outcome {
            Ok((reason, usage)) => {
                let result = self.finalize(result, reason, usage);
                let _ = events.send(AnalysisEvent::Completed(result.clone()));
                Ok(result)
            }
            Err(e) => {
                // the partial accumulator never outlives its stream
                self.session.set_result(None);
                let e = self.fail(e);
                if self.session.reset_count() != resets {
                    // cancelled by a session reset: nothing is left to report on
                    self.session.set_phase(Phase::Idle);
                }
                let _ = events.send(AnalysisEvent::Failed(e.clone()));
                Err(e)
            }
        }
    }

    fn finalize(
        &self,
        mut result: AnalysisResult,
        reason: FinishReason,
        usage: Option<TokenUsage>,
    ) -> AnalysisResult {
        match &reason {
            FinishReason::MaxTokens => result.content.push_str(TRUNCATION_NOTICE),
            FinishReason::Other(raw) => {
                warn!("Unknown finish reason '{raw}', treating as a normal stop")
            }
            _ => {}
        }
        result.is_streaming = false;
        result.finish_reason = Some(reason);
        result.usage = usage;

        let tokens = usage.unwrap_or_default();
        info!(
            "Analysis {} completed ({}): {} chars, tokens prompt={} output={} total={}",
            result.id,
            result.finish_reason.as_ref().map_or("STOP", |r| r.as_str()),
            result.content.len(),
            tokens.prompt_tokens,
            tokens.output_tokens,
            tokens.total_tokens
        );

        self.session.set_result(Some(result.clone()));
        self.session.set_phase(Phase::Completed);

        // phase first: a zero-length cooldown fires its callback immediately
        self.session.set_phase(Phase::CooldownActive);
        let session = self.session.clone();
        self.session
            .cooldown()
            .start(self.settings.cooldown_secs, move || session.finish_cooldown());
        result
    }

    /// Records the failure. Never starts a cooldown. The result slot is left alone: before the
    /// stream opens it still holds the previous completed analysis.
    fn fail(&self, err: AnalysisError) -> AnalysisError {
        self.session.set_phase(Phase::Failed {
            code: err.code().to_string(),
            message: err.to_string(),
        });
        warn!("Analysis failed [{}]: {err}", err.code());
        err
    }
}

use std::convert::Infallible;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::analysis::models::{AnalysisConfig, AnalysisResult, Phase};
use crate::analysis::orchestrator::AnalysisEvent;
use crate::analysis::session::Credential;
use crate::analysis::verification::ClientToken;
use crate::errors::AppError;
use crate::state::AppState;

/// Header carrying the browser's bot-verification token.
pub const BOT_TOKEN_HEADER: &str = "x-bot-token";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatusResponse {
    #[serde(flatten)]
    pub phase: Phase,
    pub result: Option<AnalysisResult>,
    pub remaining_seconds: u64,
    pub can_submit: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    pub api_key: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Serialize)]
pub struct CredentialStatus {
    pub present: bool,
    pub remember: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownResponse {
    pub remaining_seconds: u64,
}

/// POST /api/v1/analysis
/// Request-time failures come back as JSON errors; otherwise the response is an SSE stream of
/// `snapshot` events followed by one `complete` or `error` event.
pub async fn handle_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let token = headers
        .get(BOT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let submission = state
        .orchestrator
        .submit(&ClientToken::new(token))
        .await?;

    // Dropping the stream (client went away) does not stop the analysis; the final result
    // stays readable through GET /api/v1/analysis.
    let stream = futures::stream::unfold(submission.events, |mut events| async move {
        let event = events.recv().await?;
        Some((Ok(to_sse(event)), events))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: AnalysisEvent) -> Event {
    let (name, payload) = match event {
        AnalysisEvent::Snapshot(r) => (
            "snapshot",
            json!({ "content": r.content, "isStreaming": r.is_streaming }),
        ),
        AnalysisEvent::Completed(r) => ("complete", serde_json::to_value(r).unwrap_or(Value::Null)),
        AnalysisEvent::Failed(e) => (
            "error",
            json!({ "code": e.code(), "message": e.to_string() }),
        ),
    };
    Event::default().event(name).data(payload.to_string())
}

/// GET /api/v1/analysis
pub async fn handle_get_analysis(State(state): State<AppState>) -> Json<AnalysisStatusResponse> {
    let session = &state.session;
    let phase = session.phase();
    let can_submit =
        phase.accepts_submission() && !session.is_busy() && !session.cooldown().is_active();
    Json(AnalysisStatusResponse {
        phase,
        result: session.result(),
        remaining_seconds: session.cooldown().remaining(),
        can_submit,
    })
}

/// DELETE /api/v1/analysis
pub async fn handle_cancel_analysis(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    if state.orchestrator.cancel() {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(AppError::NotFound("No analysis is streaming".to_string()))
    }
}

/// PUT /api/v1/config
pub async fn handle_put_config(
    State(state): State<AppState>,
    Json(config): Json<AnalysisConfig>,
) -> Json<AnalysisConfig> {
    state.session.set_config(config.clone());
    Json(config)
}

/// GET /api/v1/config
pub async fn handle_get_config(
    State(state): State<AppState>,
) -> Result<Json<AnalysisConfig>, AppError> {
    state
        .session
        .config()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No analysis settings have been saved".to_string()))
}

/// PUT /api/v1/credential
pub async fn handle_put_credential(
    State(state): State<AppState>,
    Json(req): Json<CredentialRequest>,
) -> Result<Json<CredentialStatus>, AppError> {
    let api_key = req.api_key.trim();
    if api_key.is_empty() {
        return Err(AppError::Validation("apiKey must not be empty".to_string()));
    }
    state.session.set_credential(Credential {
        api_key: api_key.to_string(),
        remember: req.remember,
    });
    Ok(Json(CredentialStatus {
        present: true,
        remember: req.remember,
    }))
}

/// GET /api/v1/credential
/// Never echoes the key itself.
pub async fn handle_get_credential(State(state): State<AppState>) -> Json<CredentialStatus> {
    let credential = state.session.credential();
    Json(CredentialStatus {
        present: credential.is_some(),
        remember: credential.is_some_and(|c| c.remember),
    })
}

/// DELETE /api/v1/credential
pub async fn handle_delete_credential(State(state): State<AppState>) -> StatusCode {
    state.session.clear_credential();
    StatusCode::NO_CONTENT
}

/// POST /api/v1/session/reset
pub async fn handle_reset_session(State(state): State<AppState>) -> StatusCode {
    state.session.reset();
    StatusCode::NO_CONTENT
}

/// GET /api/v1/cooldown
pub async fn handle_get_cooldown(State(state): State<AppState>) -> Json<CooldownResponse> {
    Json(CooldownResponse {
        remaining_seconds: state.session.cooldown().remaining(),
    })
}

/// GET /api/v1/cooldown/events
/// One `cooldown` event now and one per tick; the stream ends after the event carrying zero.
pub async fn handle_cooldown_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.session.cooldown().subscribe();
    let stream = futures::stream::unfold((Some(rx), true), |(rx, first)| async move {
        let mut rx = rx?;
        if !first {
            rx.changed().await.ok()?;
        }
        let remaining = rx.borrow_and_update().remaining_seconds;
        let event = Event::default()
            .event("cooldown")
            .data(json!({ "remainingSeconds": remaining }).to_string());
        let next = (remaining > 0).then_some(rx);
        Some((Ok(event), (next, false)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

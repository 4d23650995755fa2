use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::document::models::{DocumentInput, NormalizedDocument, RawDocument};
use crate::document::normalize_async;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PastedTextRequest {
    pub text: String,
}

/// POST /api/v1/document
/// Multipart body with a `file` part, or a `text` part holding pasted text.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<NormalizedDocument>, AppError> {
    let mut input = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {}", e.body_text())))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let mime = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    AppError::Validation(format!("Could not read the uploaded file: {}", e.body_text()))
                })?;
                input = Some(DocumentInput::File(RawDocument::new(bytes, mime, filename)));
            }
            Some("text") => {
                let text = field.text().await.map_err(|e| {
                    AppError::Validation(format!("Could not read the pasted text: {}", e.body_text()))
                })?;
                input = Some(DocumentInput::Pasted(text));
            }
            _ => {}
        }
    }

    let input =
        input.ok_or_else(|| AppError::Validation("Expected a 'file' or 'text' part".to_string()))?;
    install(&state, input).await
}

/// POST /api/v1/document/text
pub async fn handle_paste(
    State(state): State<AppState>,
    Json(req): Json<PastedTextRequest>,
) -> Result<Json<NormalizedDocument>, AppError> {
    install(&state, DocumentInput::Pasted(req.text)).await
}

/// GET /api/v1/document
pub async fn handle_get_document(
    State(state): State<AppState>,
) -> Result<Json<NormalizedDocument>, AppError> {
    let doc = state
        .session
        .document()
        .ok_or_else(|| AppError::NotFound("No document has been uploaded".to_string()))?;
    Ok(Json(doc.as_ref().clone()))
}

/// DELETE /api/v1/document
pub async fn handle_delete_document(State(state): State<AppState>) -> StatusCode {
    state.session.clear_document();
    StatusCode::NO_CONTENT
}

/// Normalizes off the executor, then installs the result unless a newer upload started meanwhile.
async fn install(state: &AppState, input: DocumentInput) -> Result<Json<NormalizedDocument>, AppError> {
    let ticket = state.session.begin_normalization();
    let doc = normalize_async(input).await?;
    if !state.session.replace_document_if_latest(ticket, doc.clone()) {
        info!("Normalization {ticket} superseded by a newer upload; result not installed");
    }
    Ok(Json(doc))
}

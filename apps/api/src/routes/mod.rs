pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::analysis::handlers as analysis;
use crate::document::handlers as document;
use crate::document::models::MAX_DOCUMENT_BYTES;
use crate::state::AppState;

/// Room for multipart framing on top of the largest accepted document, so oversize files are
/// rejected by the normalizer with TOO_LARGE rather than by the transport.
const BODY_LIMIT_BYTES: usize = MAX_DOCUMENT_BYTES * 2;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Document Normalizer
        .route(
            "/api/v1/document",
            post(document::handle_upload)
                .get(document::handle_get_document)
                .delete(document::handle_delete_document),
        )
        .route("/api/v1/document/text", post(document::handle_paste))
        // Session inputs
        .route(
            "/api/v1/config",
            get(analysis::handle_get_config).put(analysis::handle_put_config),
        )
        .route(
            "/api/v1/credential",
            get(analysis::handle_get_credential)
                .put(analysis::handle_put_credential)
                .delete(analysis::handle_delete_credential),
        )
        .route("/api/v1/session/reset", post(analysis::handle_reset_session))
        // Analysis
        .route(
            "/api/v1/analysis",
            post(analysis::handle_submit)
                .get(analysis::handle_get_analysis)
                .delete(analysis::handle_cancel_analysis),
        )
        .route("/api/v1/cooldown", get(analysis::handle_get_cooldown))
        .route("/api/v1/cooldown/events", get(analysis::handle_cooldown_events))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state)
}

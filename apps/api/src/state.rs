use std::sync::Arc;

use crate::analysis::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::analysis::session::Session;
use crate::config::Config;
use crate::llm_client::{GenerationParams, StreamingClient};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// The single user session: document, config, credential, result, phase, cooldown.
    pub session: Arc<Session>,
    /// Owns the generation client. All analysis goes through here.
    pub orchestrator: Orchestrator,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, llm: Arc<dyn StreamingClient>) -> Self {
        let session = Arc::new(Session::new());
        let settings = OrchestratorSettings {
            cooldown_secs: config.cooldown_secs,
            bot_action: config.bot_action.clone(),
            params: GenerationParams {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            },
        };
        let orchestrator = Orchestrator::new(session.clone(), llm, settings);
        Self {
            session,
            orchestrator,
            config,
        }
    }
}

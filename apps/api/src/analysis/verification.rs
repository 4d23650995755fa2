// Bot-verification collaborator.
// The challenge itself runs in the browser; the server only receives the token it produced.
// Tokens are single-use and never logged.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("no verification token was provided")]
    MissingToken,
}

/// Produces one single-use token per submission attempt, scoped to `action`.
///
/// Carried into the orchestrator as `&dyn BotVerifier`.
#[async_trait]
pub trait BotVerifier: Send + Sync {
    async fn get_token(&self, action: &str) -> Result<String, VerificationError>;
}

/// Token the browser attached to the submit request (`x-bot-token`).
pub struct ClientToken(Option<String>);

impl ClientToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

#[async_trait]
impl BotVerifier for ClientToken {
    async fn get_token(&self, _action: &str) -> Result<String, VerificationError> {
        self.0
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or(VerificationError::MissingToken)
    }
}

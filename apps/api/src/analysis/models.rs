use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::llm_client::{FinishReason, TokenUsage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Depth {
    Compact,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Domain {
    Universal,
    Technical,
    NonTechnical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperienceLevel {
    Entry,
    Mid,
    Senior,
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExperienceLevel::Entry => "Entry",
            ExperienceLevel::Mid => "Mid",
            ExperienceLevel::Senior => "Senior",
        })
    }
}

/// User-selected analysis parameters. Never mutated by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    pub depth: Depth,
    pub domain: Domain,
    pub target_role: String,
    pub target_company: String,
    pub experience_level: ExperienceLevel,
    #[serde(default)]
    pub geographic_focus: Option<String>,
    #[serde(default)]
    pub special_focus: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
}

impl AnalysisConfig {
    /// First required field that is blank, in form order.
    pub fn first_missing_field(&self) -> Option<&'static str> {
        if self.target_role.trim().is_empty() {
            return Some("targetRole");
        }
        if self.target_company.trim().is_empty() {
            return Some("targetCompany");
        }
        None
    }
}

/// Fully rendered prompts. Contain no template syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system_text: String,
    pub user_text: String,
}

/// The streamed analysis. `content` only ever grows while `is_streaming` is true.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_streaming: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl AnalysisResult {
    pub fn started() -> Self {
        Self {
            id: Uuid::new_v4(),
            content: String::new(),
            timestamp: Utc::now(),
            is_streaming: true,
            finish_reason: None,
            usage: None,
        }
    }
}

/// Orchestrator phases, as published to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Validating,
    AwaitingBotToken,
    Streaming,
    Completed,
    CooldownActive,
    Failed { code: String, message: String },
}

impl Phase {
    /// Submission is allowed from these phases; cooldown is checked separately.
    pub fn accepts_submission(&self) -> bool {
        matches!(self, Phase::Idle | Phase::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Upload or paste your résumé before requesting an analysis")]
    MissingDocument,

    #[error("Fill in the analysis settings before requesting an analysis")]
    MissingConfig,

    #[error("The '{0}' field is required")]
    MissingField(&'static str),

    #[error("Add your API key before requesting an analysis")]
    MissingCredential,
}

/// Every failure the orchestrator can surface. Each maps to exactly one user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("An analysis is already running; wait for it to finish")]
    StreamInProgress,

    #[error("Please wait {remaining_seconds} seconds before requesting another analysis")]
    CooldownActive { remaining_seconds: u64 },

    #[error("Bot verification failed: {0}. Please try again")]
    BotVerification(String),

    #[error("The API key was rejected: {0}")]
    InvalidCredential(String),

    #[error("The API quota for this key is exhausted: {0}. Try again later or use another key")]
    QuotaExceeded(String),

    #[error("Too many requests: {0}. Wait a moment and try again")]
    RateLimited(String),

    #[error("The response was blocked by the model's content policy ({reason})")]
    ContentPolicy { reason: String },

    #[error("Connection to the AI service failed: {0}")]
    Transport(String),

    #[error("Prompt template error: {0}")]
    Template(String),

    #[error("The analysis was cancelled")]
    Cancelled,
}

impl AnalysisError {
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::Validation(_) => "VALIDATION_ERROR",
            AnalysisError::StreamInProgress => "STREAM_IN_PROGRESS",
            AnalysisError::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            AnalysisError::BotVerification(_) => "BOT_VERIFICATION_FAILED",
            AnalysisError::InvalidCredential(_) => "INVALID_CREDENTIAL",
            AnalysisError::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            AnalysisError::RateLimited(_) => "RATE_LIMITED",
            AnalysisError::ContentPolicy { .. } => "CONTENT_POLICY",
            AnalysisError::Transport(_) => "BACKEND_ERROR",
            AnalysisError::Template(_) => "TEMPLATE_ERROR",
            AnalysisError::Cancelled => "CANCELLED",
        }
    }
}

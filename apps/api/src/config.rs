use std::str::FromStr;

use anyhow::{Context, Result};

use crate::llm_client;

/// Application configuration loaded from environment variables.
/// Nothing is required: every variable has a default, and a missing API key just means the
/// user must supply one through the credential endpoint.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
    pub cooldown_secs: u64,
    pub bot_action: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = Config::default();
        Ok(Config {
            port: parse_env("PORT", defaults.port)?,
            rust_log: env_or("RUST_LOG", &defaults.rust_log),
            gemini_api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            gemini_model: env_or("GEMINI_MODEL", &defaults.gemini_model),
            gemini_base_url: env_or("GEMINI_BASE_URL", &defaults.gemini_base_url),
            temperature: parse_env("GEMINI_TEMPERATURE", defaults.temperature)?,
            max_output_tokens: parse_env("MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            cooldown_secs: parse_env("COOLDOWN_SECS", defaults.cooldown_secs)?,
            bot_action: env_or("BOT_ACTION", &defaults.bot_action),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            rust_log: "info".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            gemini_base_url: llm_client::DEFAULT_BASE_URL.to_string(),
            temperature: 0.7,
            max_output_tokens: 8192,
            request_timeout_secs: 300,
            cooldown_secs: 60,
            bot_action: "analyze_resume".to_string(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_default_and_invalid() {
        // unique names so parallel tests never race on the same variable
        assert_eq!(parse_env::<u64>("REVIEW_API_TEST_UNSET", 60).unwrap(), 60);

        std::env::set_var("REVIEW_API_TEST_COOLDOWN", " 15 ");
        assert_eq!(parse_env::<u64>("REVIEW_API_TEST_COOLDOWN", 60).unwrap(), 15);

        std::env::set_var("REVIEW_API_TEST_PORT", "eighty");
        let err = parse_env::<u16>("REVIEW_API_TEST_PORT", 8080).unwrap_err();
        assert!(err.to_string().contains("REVIEW_API_TEST_PORT"));
    }
}

//! Template Hydrator: renders the system/user prompt pair for a submission.
//!
//! Two passes over each template string:
//! 1. conditional regions: `{{#if NAME}}…{{/if}}` keeps its body when NAME has a non-empty value,
//!    otherwise the whole region (markers and body) is deleted.
//! 2. substitution: `{{NAME}}` is replaced by its value; unbound names are deleted.
//!
//! Nested conditional regions are not supported: the first `{{/if}}` closes the region.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::analysis::models::{AnalysisConfig, Depth, Domain, PromptPair};
use crate::analysis::prompts::find_template;

static CONDITIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{\{#if\s+([A-Z_]+)\s*\}\}(.*?)\{\{/if\}\}").expect("valid regex")
});
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Z_]+)\s*\}\}").expect("valid regex"));
/// Anything still shaped like a marker after both passes (orphan `{{#if X}}`, `{{/if}}`, …).
static LEFTOVER_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{[^{}]*\}\}").expect("valid regex"));
static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HydrateError {
    #[error("No prompt template for depth {depth:?} and domain {domain:?}")]
    TemplateNotFound { depth: Depth, domain: Domain },
}

/// Builds a fresh prompt pair. Pure and deterministic for a given config and text.
pub fn hydrate(config: &AnalysisConfig, document_text: &str) -> Result<PromptPair, HydrateError> {
    let template =
        find_template(config.depth, config.domain).ok_or(HydrateError::TemplateNotFound {
            depth: config.depth,
            domain: config.domain,
        })?;

    let values = bind_values(config, document_text);
    Ok(PromptPair {
        system_text: render(template.system, &values),
        user_text: render(template.user, &values),
    })
}

fn bind_values(config: &AnalysisConfig, document_text: &str) -> HashMap<&'static str, String> {
    let mut values = HashMap::new();
    values.insert("RESUME_TEXT", sanitize(document_text));
    values.insert("TARGET_ROLE", sanitize(&config.target_role));
    values.insert("TARGET_COMPANY", sanitize(&config.target_company));
    values.insert("EXPERIENCE_LEVEL", config.experience_level.to_string());

    let optional = [
        ("GEOGRAPHIC_FOCUS", &config.geographic_focus),
        ("SPECIAL_FOCUS", &config.special_focus),
        ("MEMO", &config.memo),
    ];
    for (name, value) in optional {
        // empty and absent are the same thing
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            values.insert(name, sanitize(v));
        }
    }
    values
}

/// User text must never introduce marker syntax of its own.
fn sanitize(value: &str) -> String {
    let mut out = value.trim().to_string();
    while out.contains("{{") || out.contains("}}") {
        out = out.replace("{{", "{").replace("}}", "}");
    }
    out
}

pub fn render(template: &str, values: &HashMap<&'static str, String>) -> String {
    let pass1 = CONDITIONAL.replace_all(template, |caps: &Captures| {
        if values.contains_key(&caps[1]) {
            caps[2].to_string()
        } else {
            String::new()
        }
    });

    let pass2 = PLACEHOLDER.replace_all(&pass1, |caps: &Captures| {
        values.get(&caps[1]).cloned().unwrap_or_default()
    });

    let cleaned = LEFTOVER_MARKER.replace_all(&pass2, "");
    EXCESS_NEWLINES
        .replace_all(&cleaned, "\n\n")
        .trim()
        .to_string()
}

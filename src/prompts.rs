//! Per-language prompt content and greeting template rendering.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::normalize::RecipientProfile;

pub const NAME_TOKEN: &str = "{{name}}";
pub const SESSIONS_COMPLETED_TOKEN: &str = "{{sessions_completed}}";
pub const LAST_SESSION_DATE_TOKEN: &str = "{{last_session_date}}";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*[^{}]*?\s*\}\}").unwrap());

/// System prompt and greeting template for one language.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptContent {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub first_message: Option<String>,
}

impl PromptContent {
    pub fn is_empty(&self) -> bool {
        !has_text(self.system_prompt.as_deref()) && !has_text(self.first_message.as_deref())
    }
}

/// Prompt content keyed by lower-cased language code.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptCatalog {
    /// Language whose content is used when a language has none of its own.
    #[serde(default)]
    pub fallback_language: Option<String>,
    #[serde(default)]
    pub languages: BTreeMap<String, PromptContent>,
}

impl PromptCatalog {
    /// Content for `language`, falling back to `fallback_language`. Entries with
    /// neither a prompt nor a greeting count as absent.
    pub fn resolve(&self, language: &str) -> Option<&PromptContent> {
        let own = self
            .languages
            .get(&language.to_lowercase())
            .filter(|c| !c.is_empty());
        own.or_else(|| {
            let fallback = self.fallback_language.as_deref()?.to_lowercase();
            self.languages.get(&fallback).filter(|c| !c.is_empty())
        })
    }

    /// Replace the system prompt for one language for this run only.
    pub fn set_system_prompt(&mut self, language: &str, prompt: String) {
        self.languages
            .entry(language.trim().to_lowercase())
            .or_default()
            .system_prompt = Some(prompt);
    }

    /// Replace the first-message template for one language for this run only.
    pub fn set_first_message(&mut self, language: &str, template: String) {
        self.languages
            .entry(language.trim().to_lowercase())
            .or_default()
            .first_message = Some(template);
    }
}

/// Substitute the three recipient tokens by literal replacement.
///
/// No escaping and no nested expansion: a substituted value that itself contains
/// a token is left as-is because each token is replaced in a single pass.
pub fn render_template(template: &str, profile: &RecipientProfile) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }
    let sessions = profile.sessions_completed.to_string();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let (value, token_len) = if tail.starts_with(NAME_TOKEN) {
            (profile.name.as_str(), NAME_TOKEN.len())
        } else if tail.starts_with(SESSIONS_COMPLETED_TOKEN) {
            (sessions.as_str(), SESSIONS_COMPLETED_TOKEN.len())
        } else if tail.starts_with(LAST_SESSION_DATE_TOKEN) {
            (profile.last_session_date.as_str(), LAST_SESSION_DATE_TOKEN.len())
        } else {
            ("{{", 2)
        };
        out.push_str(value);
        rest = &tail[token_len..];
    }
    out.push_str(rest);
    out
}

/// Tokens still present in a template after the known ones are substituted.
pub fn unknown_placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER
        .find_iter(template)
        .map(|m| m.as_str().to_string())
        .filter(|t| t != NAME_TOKEN && t != SESSIONS_COMPLETED_TOKEN && t != LAST_SESSION_DATE_TOKEN)
        .collect()
}

fn has_text(value: Option<&str>) -> bool {
    value.map(|v| !v.trim().is_empty()).unwrap_or(false)
}

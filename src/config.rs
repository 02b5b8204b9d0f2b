//! Configuration loader and validator for the batch caller.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::normalize::SessionCountPolicy;
use crate::prompts::PromptCatalog;

pub const API_KEY_ENV: &str = "XI_API_KEY";
pub const PHONE_NUMBER_ID_ENV: &str = "XI_PHONE_NUMBER_ID";

const MAX_BACKDATE_SECONDS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub api: Api,
    /// Language code to remote agent id. Languages missing here are skipped.
    #[serde(default)]
    pub agents: BTreeMap<String, String>,
    #[serde(default)]
    pub batch: Batch,
    #[serde(default)]
    pub recipients: Recipients,
    #[serde(default)]
    pub prompts: PromptCatalog,
    #[serde(default)]
    pub simulation: Simulation,
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// How call names and schedule times are derived for each batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    #[serde(default = "default_call_name_prefix")]
    pub call_name_prefix: String,
    #[serde(default)]
    pub call_name_suffix: CallNameSuffix,
    /// Seconds subtracted from "now" for `scheduled_time_unix`.
    #[serde(default)]
    pub schedule_backdate_seconds: u64,
}

/// Appended to `{prefix}-{language}-{timestamp}` so that two submissions in the
/// same second get distinct call names.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallNameSuffix {
    #[default]
    None,
    Counter,
    Random,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipients {
    #[serde(default)]
    pub sessions_completed: SessionCountPolicy,
}

/// Settings for the simulated-conversation path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Simulation {
    #[serde(default = "default_llm")]
    pub llm: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// What the simulated user says first, per language.
    #[serde(default)]
    pub user_first_messages: BTreeMap<String, String>,
}

impl Default for Batch {
    fn default() -> Self {
        Self {
            call_name_prefix: default_call_name_prefix(),
            call_name_suffix: CallNameSuffix::default(),
            schedule_backdate_seconds: 0,
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            llm: default_llm(),
            temperature: default_temperature(),
            user_first_messages: BTreeMap::new(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.elevenlabs.io/".into()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_call_name_prefix() -> String {
    "meditation".into()
}

fn default_llm() -> String {
    "gemini-2.0-flash-lite".into()
}

fn default_temperature() -> f32 {
    0.5
}

impl Config {
    /// Agent id for a language; an empty id counts as not configured.
    pub fn agent_for(&self, language: &str) -> Option<&str> {
        self.agents
            .get(&language.to_lowercase())
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
    }

    /// Opening line of the simulated user for a language.
    pub fn simulated_user_first_message(&self, language: &str) -> &str {
        self.simulation
            .user_first_messages
            .get(language)
            .map(String::as_str)
            .unwrap_or("hello")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api.api_key = key;
            }
        }
        if let Ok(id) = std::env::var(PHONE_NUMBER_ID_ENV) {
            if !id.trim().is_empty() {
                self.api.phone_number_id = id;
            }
        }
    }

    fn normalize_keys(&mut self) {
        self.agents = std::mem::take(&mut self.agents)
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
        self.prompts.languages = std::mem::take(&mut self.prompts.languages)
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
        self.simulation.user_first_messages = std::mem::take(&mut self.simulation.user_first_messages)
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
    }
}

/// Load configuration from a YAML file, apply environment overrides and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides();
    cfg.normalize_keys();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if Url::parse(&cfg.api.base_url).is_err() {
        return Err(ConfigError::Invalid("api.base_url must be a valid URL"));
    }
    if cfg.api.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("api.api_key must be non-empty"));
    }
    if cfg.api.phone_number_id.trim().is_empty() {
        return Err(ConfigError::Invalid("api.phone_number_id must be non-empty"));
    }
    if cfg.api.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("api.timeout_seconds must be > 0"));
    }

    if cfg.agents.keys().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Invalid("agents keys must be non-empty language codes"));
    }

    if cfg.batch.call_name_prefix.trim().is_empty() {
        return Err(ConfigError::Invalid("batch.call_name_prefix must be non-empty"));
    }
    if cfg.batch.schedule_backdate_seconds > MAX_BACKDATE_SECONDS {
        return Err(ConfigError::Invalid("batch.schedule_backdate_seconds must be <= 3600"));
    }

    if let Some(fallback) = &cfg.prompts.fallback_language {
        if !cfg.prompts.languages.contains_key(&fallback.to_lowercase()) {
            return Err(ConfigError::Invalid(
                "prompts.fallback_language must name a configured language",
            ));
        }
    }

    if cfg.simulation.llm.trim().is_empty() {
        return Err(ConfigError::Invalid("simulation.llm must be non-empty"));
    }
    if !(0.0..=2.0).contains(&cfg.simulation.temperature) {
        return Err(ConfigError::Invalid("simulation.temperature must be within 0.0..=2.0"));
    }

    Ok(())
}

/// Returns the documented example YAML.
pub fn example() -> &'static str {
    r#"api:
  base_url: "https://api.elevenlabs.io/"
  api_key: "YOUR_API_KEY"
  phone_number_id: "YOUR_PHONE_NUMBER_ID"
  timeout_seconds: 30

agents:
  en: "AGENT_EN_ID"
  hi: "AGENT_HI_ID"

batch:
  call_name_prefix: "meditation"
  # none | counter | random
  call_name_suffix: none
  schedule_backdate_seconds: 0

recipients:
  # parse_or_default | strict
  sessions_completed: parse_or_default

prompts:
  fallback_language: "en"
  languages:
    en:
      system_prompt: |
        You are Shakti, a calm and compassionate meditation reminder assistant.
        Gently remind the user that it is time to meditate. Keep every reply brief and soothing.
      first_message: "Hi {{name}}, it has been {{last_session_date}} since your last session. You have completed {{sessions_completed}} sessions so far."
    hi:
      system_prompt: |
        You are Shakti, a calm and compassionate meditation reminder assistant.
        Reply in two or three calm Hindi sentences at most.
      first_message: "नमस्ते {{name}}! आपने अब तक {{sessions_completed}} सत्र पूरे किए हैं।"

simulation:
  llm: "gemini-2.0-flash-lite"
  temperature: 0.5
  user_first_messages:
    en: "hello"
    hi: "नमस्ते"
"#
}

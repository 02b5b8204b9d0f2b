//! Recipient normalization: raw roster row to `(language, fragment)`.
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::model::{
    AgentOverride, ClientData, ConfigOverride, DynamicVariables, PromptOverride, RawRow,
    RecipientFragment, TtsOverride, CLIENT_DATA_TYPE,
};
use crate::prompts::{render_template, unknown_placeholders, PromptCatalog};

pub const DEFAULT_NAME: &str = "friend";
pub const DEFAULT_LAST_SESSION_DATE: &str = "a while ago";
pub const DEFAULT_SESSIONS_COMPLETED: u64 = 0;
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("missing required field `{0}`")]
    MissingRequiredField(&'static str),
    #[error("invalid value {value:?} for field `{field}`")]
    InvalidField { field: &'static str, value: String },
}

/// How a malformed `sessions_completed` cell is treated.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionCountPolicy {
    /// Empty or unparsable values become `0`.
    #[default]
    ParseOrDefault,
    /// Empty values become `0`; unparsable values reject the row.
    Strict,
}

impl SessionCountPolicy {
    pub fn apply(self, raw: Option<&str>) -> Result<u64, NormalizeError> {
        let value = raw.map(str::trim).unwrap_or_default();
        if value.is_empty() {
            return Ok(DEFAULT_SESSIONS_COMPLETED);
        }
        match (value.parse::<u64>(), self) {
            (Ok(n), _) => Ok(n),
            (Err(_), SessionCountPolicy::ParseOrDefault) => Ok(DEFAULT_SESSIONS_COMPLETED),
            (Err(_), SessionCountPolicy::Strict) => Err(NormalizeError::InvalidField {
                field: "sessions_completed",
                value: value.to_string(),
            }),
        }
    }
}

/// Every recipient attribute except the phone number, with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientProfile {
    pub name: String,
    pub last_session_date: String,
    pub sessions_completed: u64,
    /// Lower-cased; doubles as the group key.
    pub language: String,
    pub voice_id: Option<String>,
}

impl RecipientProfile {
    pub fn from_row(row: &RawRow, policy: SessionCountPolicy) -> Result<Self, NormalizeError> {
        Ok(Self {
            name: text_or(row, "name", DEFAULT_NAME),
            last_session_date: text_or(row, "last_session_date", DEFAULT_LAST_SESSION_DATE),
            sessions_completed: policy.apply(row.get("sessions_completed").map(String::as_str))?,
            language: text_or(row, "language", DEFAULT_LANGUAGE).to_lowercase(),
            voice_id: row
                .get("voice_id")
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        })
    }

    pub fn dynamic_variables(&self) -> DynamicVariables {
        DynamicVariables {
            name: self.name.clone(),
            last_session_date: self.last_session_date.clone(),
            sessions_completed: self.sessions_completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub phone_number: String,
    pub profile: RecipientProfile,
}

impl Recipient {
    /// The phone number is taken verbatim; only its presence is checked.
    pub fn from_row(row: &RawRow, policy: SessionCountPolicy) -> Result<Self, NormalizeError> {
        let phone_number = row
            .get("phone_number")
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or(NormalizeError::MissingRequiredField("phone_number"))?;
        let profile = RecipientProfile::from_row(row, policy)?;
        Ok(Self {
            phone_number,
            profile,
        })
    }
}

/// Turns raw rows into payload fragments using the prompt content of this run.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    prompts: &'a PromptCatalog,
    policy: SessionCountPolicy,
}

impl<'a> Normalizer<'a> {
    pub fn new(prompts: &'a PromptCatalog, policy: SessionCountPolicy) -> Self {
        Self { prompts, policy }
    }

    pub fn normalize(&self, row: &RawRow) -> Result<(String, RecipientFragment), NormalizeError> {
        let recipient = Recipient::from_row(row, self.policy)?;
        let fragment = self.fragment(&recipient);
        Ok((recipient.profile.language, fragment))
    }

    pub fn fragment(&self, recipient: &Recipient) -> RecipientFragment {
        let profile = &recipient.profile;
        RecipientFragment {
            phone_number: recipient.phone_number.clone(),
            conversation_initiation_client_data: ClientData {
                kind: CLIENT_DATA_TYPE.to_string(),
                dynamic_variables: profile.dynamic_variables(),
                conversation_config_override: self.config_override(profile),
            },
        }
    }

    fn config_override(&self, profile: &RecipientProfile) -> Option<ConfigOverride> {
        let content = self.prompts.resolve(&profile.language)?;
        let prompt = content
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| PromptOverride {
                prompt: p.to_string(),
            });
        let first_message = content
            .first_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .map(|template| {
                let rendered = render_template(template, profile);
                let leftover = unknown_placeholders(&rendered);
                if !leftover.is_empty() {
                    warn!(language = %profile.language, ?leftover, "unresolved placeholders in first message");
                }
                rendered
            });
        Some(ConfigOverride {
            agent: AgentOverride {
                prompt,
                first_message,
                language: profile.language.clone(),
            },
            tts: profile.voice_id.clone().map(|voice_id| TtsOverride { voice_id }),
        })
    }
}

fn text_or(row: &RawRow, key: &str, default: &str) -> String {
    row.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

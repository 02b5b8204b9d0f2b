use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One roster row as read from the input surface: column name to raw cell text.
pub type RawRow = HashMap<String, String>;

pub const CLIENT_DATA_TYPE: &str = "conversation_initiation_client_data";

/// Per-person payload nested inside a batch request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientFragment {
    pub phone_number: String,
    pub conversation_initiation_client_data: ClientData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientData {
    #[serde(rename = "type")]
    pub kind: String,
    pub dynamic_variables: DynamicVariables,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_config_override: Option<ConfigOverride>,
}

/// Substitution values forwarded to the remote agent for a single recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DynamicVariables {
    pub name: String,
    pub last_session_date: String,
    pub sessions_completed: u64,
}

/// Per-submission customization of the remote agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigOverride {
    pub agent: AgentOverride,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts: Option<TtsOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_message: Option<String>,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptOverride {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TtsOverride {
    pub voice_id: String,
}

/// Recipients sharing one lower-cased language key, in roster order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageGroup {
    pub language: String,
    pub recipients: Vec<RecipientFragment>,
}

/// Body of one batch-calling submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchRequest {
    pub call_name: String,
    pub agent_id: String,
    pub agent_phone_number_id: String,
    pub scheduled_time_unix: i64,
    pub recipients: Vec<RecipientFragment>,
}

/// Body of a simulate-conversation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationRequest {
    pub simulation_specification: SimulationSpecification,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationSpecification {
    pub simulated_user_config: SimulatedUserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulatedUserConfig {
    pub first_message: String,
    pub language: String,
    pub prompt: SimulatedPrompt,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulatedPrompt {
    pub prompt: String,
    pub llm: String,
    pub temperature: f32,
}

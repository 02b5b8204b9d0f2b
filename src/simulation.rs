//! Simulated conversation requests for trying out an agent's prompt without
//! placing a call.
use thiserror::Error;

use crate::config::Config;
use crate::model::{
    RawRow, SimulatedPrompt, SimulatedUserConfig, SimulationRequest, SimulationSpecification,
};
use crate::normalize::{NormalizeError, RecipientProfile};
use crate::prompts::{render_template, PromptCatalog};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("no agent configured for language `{0}`")]
    UnsupportedLanguage(String),
    #[error("no system prompt configured for language `{0}`")]
    MissingPrompt(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPlan {
    pub agent_id: String,
    pub profile: RecipientProfile,
    pub request: SimulationRequest,
}

/// Build the simulate-conversation request for one recipient row. The phone
/// number is not needed here and is ignored when present.
pub fn build_simulation(
    row: &RawRow,
    cfg: &Config,
    prompts: &PromptCatalog,
) -> Result<SimulationPlan, SimulationError> {
    let profile = RecipientProfile::from_row(row, cfg.recipients.sessions_completed)?;
    let agent_id = cfg
        .agent_for(&profile.language)
        .ok_or_else(|| SimulationError::UnsupportedLanguage(profile.language.clone()))?
        .to_string();
    let template = prompts
        .resolve(&profile.language)
        .and_then(|c| c.system_prompt.as_deref())
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| SimulationError::MissingPrompt(profile.language.clone()))?;

    let request = SimulationRequest {
        simulation_specification: SimulationSpecification {
            simulated_user_config: SimulatedUserConfig {
                first_message: cfg.simulated_user_first_message(&profile.language).to_string(),
                language: profile.language.clone(),
                prompt: SimulatedPrompt {
                    prompt: render_template(template, &profile),
                    llm: cfg.simulation.llm.clone(),
                    temperature: cfg.simulation.temperature,
                },
            },
        },
    };
    Ok(SimulationPlan {
        agent_id,
        profile,
        request,
    })
}

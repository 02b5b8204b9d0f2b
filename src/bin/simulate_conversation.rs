use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use meditation_caller::calling::BatchCallingClient;
use meditation_caller::config;
use meditation_caller::model::RawRow;
use meditation_caller::simulation::build_simulation;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run a simulated conversation against the agent for one recipient"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[arg(long, default_value = "")]
    name: String,

    #[arg(long, default_value = "")]
    language: String,

    #[arg(long, default_value = "")]
    last_session_date: String,

    /// Raw session count; malformed values follow the configured policy
    #[arg(long, default_value = "")]
    sessions_completed: String,

    /// Use this file as the system prompt instead of the configured one
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Print the request body instead of sending it
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let row: RawRow = [
        ("name", args.name),
        ("language", args.language),
        ("last_session_date", args.last_session_date),
        ("sessions_completed", args.sessions_completed),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let mut prompts = cfg.prompts.clone();
    if let Some(path) = &args.prompt_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read prompt file {}", path.display()))?;
        let language = row
            .get("language")
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .unwrap_or(meditation_caller::normalize::DEFAULT_LANGUAGE)
            .to_string();
        prompts.set_system_prompt(&language, text);
    }

    let plan = build_simulation(&row, &cfg, &prompts)?;
    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&plan.request)?);
        return Ok(());
    }

    let client = BatchCallingClient::from_config(&cfg)?;
    info!(agent_id = %plan.agent_id, language = %plan.profile.language, "starting simulated conversation");
    let response = client
        .simulate_conversation(&plan.agent_id, &plan.request)
        .await
        .context("simulated conversation failed")?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

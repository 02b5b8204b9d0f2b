use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use meditation_caller::calling::BatchCallingClient;
use meditation_caller::config;
use meditation_caller::grouping::group_by_language;
use meditation_caller::normalize::Normalizer;
use meditation_caller::roster;
use meditation_caller::submitter::{BatchSubmitter, PlannedBatch};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Submit one batch call per recipient language"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Roster file (CSV with a header row, or JSON)
    #[arg(long, required_unless_present_any = ["print_sample_roster", "print_example_config"])]
    roster: Option<PathBuf>,

    /// Replace a language's system prompt for this run, e.g. `--prompt en=prompts/en.md`
    #[arg(long = "prompt", value_name = "LANG=FILE", value_parser = parse_assignment)]
    prompts: Vec<(String, String)>,

    /// Replace a language's first-message template for this run, e.g. `--first-message "en=Hi {{name}}"`
    #[arg(long = "first-message", value_name = "LANG=TEXT", value_parser = parse_assignment)]
    first_messages: Vec<(String, String)>,

    /// Print the batch requests instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Print a header-only roster CSV and exit
    #[arg(long)]
    print_sample_roster: bool,

    /// Print an example config file and exit
    #[arg(long)]
    print_example_config: bool,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (lang, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected LANG=VALUE, got {raw:?}"))?;
    let lang = lang.trim();
    if lang.is_empty() {
        return Err("language must be non-empty".into());
    }
    Ok((lang.to_lowercase(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.print_sample_roster {
        print!("{}", roster::SAMPLE_ROSTER);
        return Ok(());
    }
    if args.print_example_config {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;

    let mut prompts = cfg.prompts.clone();
    for (lang, path) in &args.prompts {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read prompt file {path} for {lang}"))?;
        prompts.set_system_prompt(lang, text);
    }
    for (lang, template) in &args.first_messages {
        prompts.set_first_message(lang, template.clone());
    }

    let Some(roster_path) = args.roster.as_deref() else {
        bail!("--roster is required");
    };
    let rows = roster::load(roster_path)
        .with_context(|| format!("failed to read roster {}", roster_path.display()))?;
    info!(rows = rows.len(), path = %roster_path.display(), "roster loaded");

    let normalizer = Normalizer::new(&prompts, cfg.recipients.sessions_completed);
    let grouped = group_by_language(&rows, &normalizer);
    for rejected in &grouped.rejected {
        println!("{rejected}");
    }
    if grouped.groups.is_empty() {
        warn!("no valid recipients in roster");
        return Ok(());
    }

    let client = BatchCallingClient::from_config(&cfg)?;
    let submitter = BatchSubmitter::new(&cfg, &client);

    if args.dry_run {
        for planned in submitter.plan(&grouped.groups, Utc::now()) {
            match planned {
                PlannedBatch::Ready { request, .. } => {
                    println!("{}", serde_json::to_string_pretty(&request)?);
                }
                PlannedBatch::Skipped { language } => {
                    println!("{} → skipped: no agent configured for language", language.to_uppercase());
                }
            }
        }
        return Ok(());
    }

    let outcomes = submitter.submit_all(&grouped.groups).await;
    for outcome in &outcomes {
        println!("{outcome}");
        if let Some(request) = outcome.failed_request() {
            println!("{} request body:\n{request}", outcome.language().to_uppercase());
        }
    }

    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    if failed > 0 {
        bail!("{failed} of {} language group(s) failed to submit", outcomes.len());
    }
    Ok(())
}

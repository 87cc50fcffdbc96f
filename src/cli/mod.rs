//! Command-line interface for fitplan.
//!
//! Provides commands for running the pipeline, inspecting stage schemas,
//! checking raw model output against a schema, and showing configuration.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::{LocalCalendar, ModelBackend, OpenAiBackend, ScriptedBackend};
use crate::config::{self, ResolvedConfig};
use crate::core::Orchestrator;
use crate::domain::events;
use crate::domain::state::StageName;
use crate::schema::catalog;

/// fitplan - Safety-gated workout planning pipeline
#[derive(Parser, Debug)]
#[command(name = "fitplan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline for a user profile
    Run {
        /// Profile file (YAML or JSON)
        #[arg(short, long)]
        profile: PathBuf,

        /// Create calendar events for the schedule
        #[arg(long)]
        confirm: bool,

        /// Replay model replies from a YAML script instead of calling the API
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Run the evaluation stage after scheduling
        #[arg(long)]
        evaluate: bool,

        /// Override the attempt bound per stage
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Write the run's events as JSONL to this file
        #[arg(long)]
        events: Option<PathBuf>,
    },

    /// Print the JSON schema a stage's output must match
    Schema {
        /// Stage name (e.g. medical_safety, workout_planning, scheduling)
        stage: StageName,
    },

    /// Validate a raw model response against a stage schema
    Validate {
        /// Stage name
        stage: StageName,

        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                profile,
                confirm,
                replay,
                evaluate,
                max_attempts,
                events,
            } => {
                let mut cfg = config::config()?.clone();
                if let Some(max_attempts) = max_attempts {
                    cfg.retry.max_attempts = max_attempts;
                }
                if evaluate {
                    cfg.evaluation_enabled = true;
                }
                run_pipeline(&cfg, &profile, confirm, replay.as_deref(), events.as_deref()).await
            }
            Commands::Schema { stage } => show_schema(stage),
            Commands::Validate { stage, input } => validate_output(stage, input.as_deref()),
            Commands::Config => show_config(),
        }
    }
}

/// Run the pipeline and print the run record
async fn run_pipeline(
    cfg: &ResolvedConfig,
    profile_path: &Path,
    confirm: bool,
    replay: Option<&Path>,
    events_path: Option<&Path>,
) -> Result<()> {
    let profile = load_profile(profile_path)?;
    let backend = build_backend(cfg, replay)?;
    let orchestrator = Orchestrator::from_config(cfg, backend, Arc::new(LocalCalendar::new()))?;

    // Ctrl-C stops the run at the next await point
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let run = orchestrator
        .run_with_cancel(&profile, confirm, cancel)
        .await
        .context("Profile rejected")?;

    if let Some(path) = events_path {
        let jsonl = events::to_jsonl(&run.events)?;
        std::fs::write(path, jsonl)
            .with_context(|| format!("Failed to write events: {}", path.display()))?;
        info!(path = %path.display(), "Events written");
    }

    println!("{}", serde_json::to_string_pretty(&run)?);

    match run.failure() {
        None => {
            eprintln!("\n[Run {} completed in {}ms]", run.id, run.duration_ms());
            Ok(())
        }
        Some(failure) => {
            eprintln!("\n[Run {} failed: {}]", run.id, failure);
            std::process::exit(1);
        }
    }
}

/// Model backend: a replay script if given, otherwise the configured API
fn build_backend(cfg: &ResolvedConfig, replay: Option<&Path>) -> Result<Arc<dyn ModelBackend>> {
    if let Some(path) = replay {
        return Ok(Arc::new(ScriptedBackend::from_file(path)?));
    }

    let api_key = cfg.api_key().with_context(|| {
        format!(
            "No API key found. Set {} or use --replay <file>",
            cfg.model.api_key_env
        )
    })?;

    let backend = OpenAiBackend::new(api_key, cfg.model.name.clone())
        .with_base_url(cfg.model.base_url.clone())
        .with_temperature(cfg.model.temperature);
    info!(model = backend.model(), "Using OpenAI-compatible backend");

    Ok(Arc::new(backend))
}

/// Read a profile file; YAML parsing also accepts JSON
fn load_profile(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse profile: {}", path.display()))
}

fn show_schema(stage: StageName) -> Result<()> {
    let schema = catalog::for_stage(stage)
        .with_context(|| format!("Stage '{}' does not call the model and has no schema", stage))?;

    println!("{}", serde_json::to_string_pretty(&schema.json_schema())?);
    Ok(())
}

/// Validate raw output from a file or stdin and list the issues
fn validate_output(stage: StageName, input: Option<&Path>) -> Result<()> {
    let schema = catalog::for_stage(stage)
        .with_context(|| format!("Stage '{}' does not call the model and has no schema", stage))?;

    let raw = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?,
        None => {
            if io::stdin().is_terminal() {
                anyhow::bail!("No input provided. Use --input <file> or pipe to stdin");
            }
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read from stdin")?;
            buffer
        }
    };

    match schema.validate(&raw) {
        Ok(_) => {
            println!("valid {}", schema.name());
            Ok(())
        }
        Err(err) => {
            println!("invalid {} ({} issue(s)):", schema.name(), err.issues.len());
            for issue in &err.issues {
                println!("  - {}", issue);
            }
            std::process::exit(1);
        }
    }
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!(
        "API key ({}): {}",
        cfg.model.api_key_env,
        if cfg.api_key().is_some() { "set" } else { "not set" }
    );
    println!();
    print!("{}", serde_yaml::to_string(cfg)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const REPLAY: &str = r#"replies:
  - text: '{"risk_level": "low", "contraindicated_exercises": [], "recommended_focus_areas": [], "warnings": []}'
  - text: |
      Here is the plan:
      ```json
      {"plan_type": "cardio", "weekly_sessions": 1, "session_templates": [
        {"name": "Walk", "duration_minutes": 30, "exercise_categories": ["walking"], "intensity": "low"}
      ]}
      ```
  - text: '{"scheduled_sessions": [{"date": "2026-03-02", "start_time": "07:00", "duration_minutes": 30, "session_name": "Walk"}]}'
"#;

    const PROFILE: &str = r#"medical_history: []
short_term_goals: ["walk more"]
long_term_goals: []
availability:
  - date: "2026-03-02"
    start_time: "07:00"
    end_time: "08:00"
"#;

    #[tokio::test]
    async fn test_replay_file_drives_full_run() {
        let temp = TempDir::new().unwrap();
        let replay = temp.path().join("replies.yaml");
        let profile_path = temp.path().join("profile.yaml");
        std::fs::write(&replay, REPLAY).unwrap();
        std::fs::write(&profile_path, PROFILE).unwrap();

        let cfg = ResolvedConfig::default();
        let backend = build_backend(&cfg, Some(&replay)).unwrap();
        let profile = load_profile(&profile_path).unwrap();
        let orchestrator =
            Orchestrator::from_config(&cfg, backend, Arc::new(LocalCalendar::new())).unwrap();

        let run = orchestrator.run(&profile, true).await.unwrap();

        assert!(run.is_done(), "run failed: {:?}", run.failure());
        let entries = run.state.calendar_events().unwrap();
        assert_eq!(entries[0].event_id(), Some("evt_2026-03-02_0700"));
    }

    #[test]
    fn test_missing_replay_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.yaml");

        let err = build_backend(&ResolvedConfig::default(), Some(&missing)).err().unwrap();
        assert!(err.to_string().contains("Failed to read replay script"));
    }
}

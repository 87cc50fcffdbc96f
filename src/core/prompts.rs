//! Prompt renderers for the model-backed stages.
//!
//! Rendering is pure: identical stage input and feedback always produce the
//! identical prompt, so retries are reproducible. Instructions and the schema
//! go in the system part; the stage input and any correction in the user part.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use super::retry::Feedback;
use crate::adapters::Prompt;
use crate::domain::state::StageName;
use crate::schema::Schema;

const MEDICAL_SAFETY: &str = "\
You are the Medical Safety Agent for a personal training system.
Analyze the medical history conservatively and identify exercise constraints.
Do NOT provide a medical diagnosis.
List every exercise category the user must avoid, each with a short rationale.
If risk_level is high, include a warning recommending professional consultation.";

const WORKOUT_PLANNING: &str = "\
You are the Workout Planning Agent.
Design a safe, realistic workout plan aligned with the user's goals and medical constraints.
Never use an exercise category listed in contraindicated_exercises.
Progression must be realistic; avoid extreme routines.";

const SCHEDULING: &str = "\
You are the Scheduling Agent.
Fit the workout plan's sessions into the user's availability, preserving rest days when possible.
Every session must start and end inside one availability window; windows given by weekday
recur weekly. Sessions must not overlap. session_name must be the name of a plan template.";

const EVALUATION: &str = "\
You are an evaluator that judges the quality of a workout plan and schedule.
Score each category from 1 to 5 (5 is best).
Be strict about safety, goal alignment, realism, schedule fit, and clarity.
If risks or major issues exist, set verdict to review or fail and list the issues.";

/// System instructions per stage
#[derive(Debug, Clone)]
pub struct PromptSet {
    instructions: HashMap<StageName, String>,
}

impl Default for PromptSet {
    fn default() -> Self {
        let instructions = [
            (StageName::MedicalSafety, MEDICAL_SAFETY),
            (StageName::WorkoutPlanning, WORKOUT_PLANNING),
            (StageName::Scheduling, SCHEDULING),
            (StageName::Evaluation, EVALUATION),
        ]
        .into_iter()
        .map(|(stage, text)| (stage, text.to_string()))
        .collect();

        Self { instructions }
    }
}

impl PromptSet {
    /// Defaults, overridden by any `<stage>.md` file found in `dir`
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut prompts = Self::default();

        for stage in StageName::ALL {
            let path = dir.join(format!("{}.md", stage));
            if !path.is_file() {
                continue;
            }
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt override: {}", path.display()))?;
            prompts.instructions.insert(stage, text.trim().to_string());
        }

        Ok(prompts)
    }

    pub fn instructions(&self, stage: StageName) -> &str {
        self.instructions
            .get(&stage)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Render the prompt for one attempt
    pub fn render(
        &self,
        stage: StageName,
        schema: &Schema,
        input: &Value,
        feedback: Option<&Feedback>,
    ) -> Prompt {
        let system = format!(
            "{}\n\n{}\n\nReturn ONLY JSON that matches the schema.",
            self.instructions(stage),
            schema.format_instructions(),
        );

        let mut user = serde_json::to_string_pretty(input).unwrap_or_default();
        if let Some(feedback) = feedback {
            user.push_str("\n\n## Correction\n\n");
            user.push_str(&feedback.render());
        }

        Prompt::new(system, user)
    }
}

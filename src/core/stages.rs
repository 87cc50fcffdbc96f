//! Stage agents.
//!
//! Each model-backed stage declares its schema, the slice of state it reads
//! and the semantic checks its typed output must pass. Semantic issues are
//! fed back through the same corrective retry as schema issues.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::context::RunContext;
use super::error::StageError;
use super::invoker::ModelInvoker;
use super::prompts::PromptSet;
use super::retry::{RetryLoop, RetryPolicy, Validated};
use crate::adapters::CalendarTool;
use crate::domain::calendar::{CalendarEntry, CalendarEventRecord, CalendarFailure};
use crate::domain::events::EventType;
use crate::domain::plan::{Evaluation, Level, MedicalConstraints, Schedule, WorkoutPlan};
use crate::domain::state::{PipelineState, StageName, StageOutput, StateError};
use crate::schema::{catalog, Schema, ValidationError, ValidationIssue};

/// Contract of a model-backed stage
pub trait ModelStage {
    type Output: DeserializeOwned;

    const NAME: StageName;

    fn schema() -> &'static Schema;

    /// The state subset rendered into the prompt
    fn project(state: &PipelineState) -> Result<Value, StateError>;

    /// Checks that need the typed output or upstream state
    fn check(_output: &Self::Output, _state: &PipelineState) -> Vec<ValidationIssue> {
        Vec::new()
    }

    fn merge(output: Self::Output) -> StageOutput;
}

/// Run one model-backed stage to a validated state delta
pub async fn run_model_stage<S: ModelStage>(
    state: &PipelineState,
    ctx: &mut RunContext,
    invoker: &ModelInvoker,
    policy: &RetryPolicy,
    prompts: &PromptSet,
) -> Result<Validated<StageOutput>, StageError> {
    let input = S::project(state)?;
    let schema = S::schema();

    let validated = RetryLoop::new(invoker, policy)
        .run(
            S::NAME,
            ctx,
            |feedback| prompts.render(S::NAME, schema, &input, feedback),
            |raw| {
                let output: S::Output = schema.validate_as(raw)?;
                let issues = S::check(&output, state);
                if issues.is_empty() {
                    Ok(output)
                } else {
                    Err(ValidationError::new(issues))
                }
            },
        )
        .await?;

    Ok(Validated {
        value: S::merge(validated.value),
        attempts: validated.attempts,
    })
}

/// Derives exercise restrictions from the medical history
pub struct MedicalSafetyAgent;

impl ModelStage for MedicalSafetyAgent {
    type Output = MedicalConstraints;

    const NAME: StageName = StageName::MedicalSafety;

    fn schema() -> &'static Schema {
        catalog::medical_safety()
    }

    fn project(state: &PipelineState) -> Result<Value, StateError> {
        let profile = state.user_profile();
        Ok(json!({
            "medical_history": profile.medical_history,
            "short_term_goals": profile.short_term_goals,
            "long_term_goals": profile.long_term_goals,
        }))
    }

    fn check(output: &MedicalConstraints, _state: &PipelineState) -> Vec<ValidationIssue> {
        if output.risk_level == Level::High && output.warnings.is_empty() {
            return vec![ValidationIssue::new(
                "warnings",
                "must contain at least one warning when risk_level is high",
            )];
        }
        Vec::new()
    }

    fn merge(output: MedicalConstraints) -> StageOutput {
        StageOutput::MedicalConstraints(output)
    }
}

/// Builds a plan that honors the medical constraints
pub struct WorkoutPlanningAgent;

impl ModelStage for WorkoutPlanningAgent {
    type Output = WorkoutPlan;

    const NAME: StageName = StageName::WorkoutPlanning;

    fn schema() -> &'static Schema {
        catalog::workout_plan()
    }

    fn project(state: &PipelineState) -> Result<Value, StateError> {
        let constraints = state.require_medical_constraints()?;
        let profile = state.user_profile();
        Ok(json!({
            "user_profile": {
                "medical_history": profile.medical_history,
                "short_term_goals": profile.short_term_goals,
                "long_term_goals": profile.long_term_goals,
            },
            "medical_constraints": constraints,
        }))
    }

    fn check(plan: &WorkoutPlan, state: &PipelineState) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if plan.session_templates.is_empty() {
            issues.push(ValidationIssue::new(
                "session_templates",
                "must contain at least one template",
            ));
        }

        let mut seen = HashSet::new();
        for (i, template) in plan.session_templates.iter().enumerate() {
            if !seen.insert(template.name.as_str()) {
                issues.push(ValidationIssue::new(
                    format!("session_templates[{}].name", i),
                    format!("duplicate template name \"{}\"", template.name),
                ));
            }
        }

        // Without constraints there is nothing to contradict
        let Some(constraints) = state.medical_constraints() else {
            return issues;
        };

        for (i, template) in plan.session_templates.iter().enumerate() {
            for (j, category) in template.exercise_categories.iter().enumerate() {
                if constraints.restricts(category) {
                    issues.push(ValidationIssue::new(
                        format!("session_templates[{}].exercise_categories[{}]", i, j),
                        format!(
                            "\"{}\" is listed in medical_constraints.contraindicated_exercises",
                            category
                        ),
                    ));
                }
            }
        }

        issues
    }

    fn merge(output: WorkoutPlan) -> StageOutput {
        StageOutput::WorkoutPlan(output)
    }
}

/// Maps plan sessions onto the user's availability
pub struct SchedulingAgent;

impl ModelStage for SchedulingAgent {
    type Output = Schedule;

    const NAME: StageName = StageName::Scheduling;

    fn schema() -> &'static Schema {
        catalog::schedule()
    }

    fn project(state: &PipelineState) -> Result<Value, StateError> {
        let plan = state.require_workout_plan()?;
        Ok(json!({
            "workout_plan": plan,
            "availability": state.user_profile().availability,
        }))
    }

    fn check(schedule: &Schedule, state: &PipelineState) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let availability = &state.user_profile().availability;
        let plan = state.workout_plan();

        if schedule.scheduled_sessions.is_empty() {
            issues.push(ValidationIssue::new(
                "scheduled_sessions",
                "must contain at least one session",
            ));
        }

        let mut placed = Vec::new();
        for (i, session) in schedule.scheduled_sessions.iter().enumerate() {
            let path = format!("scheduled_sessions[{}]", i);

            if let Some(plan) = plan {
                if plan.template(&session.session_name).is_none() {
                    issues.push(ValidationIssue::new(
                        format!("{}.session_name", path),
                        format!(
                            "\"{}\" is not a template in workout_plan.session_templates",
                            session.session_name
                        ),
                    ));
                }
            }

            let Some(slot) = session.slot() else {
                issues.push(ValidationIssue::new(
                    format!("{}.duration_minutes", path),
                    "session must end on the day it starts",
                ));
                continue;
            };

            if !availability.iter().any(|window| window.contains(&slot)) {
                issues.push(ValidationIssue::new(
                    path.clone(),
                    format!(
                        "{} {}-{} is outside every availability window",
                        slot.date.format("%Y-%m-%d"),
                        slot.start.format("%H:%M"),
                        slot.end.format("%H:%M")
                    ),
                ));
            }

            if let Some((j, _)) = placed.iter().find(|(_, other)| slot.overlaps(other)) {
                issues.push(ValidationIssue::new(
                    format!("{}.start_time", path),
                    format!("overlaps scheduled_sessions[{}]", j),
                ));
            }
            placed.push((i, slot));
        }

        issues
    }

    fn merge(output: Schedule) -> StageOutput {
        StageOutput::Schedule(output)
    }
}

/// Scores the plan and schedule; advisory only
pub struct EvaluationAgent;

impl ModelStage for EvaluationAgent {
    type Output = Evaluation;

    const NAME: StageName = StageName::Evaluation;

    fn schema() -> &'static Schema {
        catalog::evaluation()
    }

    fn project(state: &PipelineState) -> Result<Value, StateError> {
        let profile = state.user_profile();
        Ok(json!({
            "goals": {
                "short_term": profile.short_term_goals,
                "long_term": profile.long_term_goals,
            },
            "medical_constraints": state.require_medical_constraints()?,
            "workout_plan": state.require_workout_plan()?,
            "schedule": state.require_schedule()?,
        }))
    }

    fn merge(output: Evaluation) -> StageOutput {
        StageOutput::Evaluation(output)
    }
}

/// Creates one calendar event per scheduled session.
///
/// A failed session is recorded and the remaining sessions still run.
pub struct CalendarIntegrationAgent {
    tool: Arc<dyn CalendarTool>,
}

impl CalendarIntegrationAgent {
    pub fn new(tool: Arc<dyn CalendarTool>) -> Self {
        Self { tool }
    }

    pub async fn run(
        &self,
        state: &PipelineState,
        ctx: &mut RunContext,
    ) -> Result<StageOutput, StageError> {
        let stage = StageName::CalendarIntegration;
        let schedule = state.require_schedule()?;
        let mut entries = Vec::with_capacity(schedule.scheduled_sessions.len());

        for (index, session) in schedule.scheduled_sessions.iter().enumerate() {
            let started = Instant::now();
            let result = ctx.guard(self.tool.create_event(session)).await?;
            let duration_ms = started.elapsed().as_millis() as u64;

            let entry = match result {
                Ok(created) => {
                    info!(tool = self.tool.name(), index, event_id = %created.event_id, "Calendar event created");
                    let event = ctx
                        .log
                        .event(
                            Some(stage),
                            EventType::CalendarEventCreated,
                            format!("Created event {} for session {}", created.event_id, index),
                        )
                        .with_duration(duration_ms);
                    ctx.log.append(event);

                    CalendarEntry::Created(CalendarEventRecord {
                        session_index: index,
                        session_name: session.session_name.clone(),
                        event_id: created.event_id,
                        payload: created.payload,
                    })
                }
                Err(error) => {
                    warn!(tool = self.tool.name(), index, %error, "Calendar event failed");
                    let event = ctx
                        .log
                        .event(
                            Some(stage),
                            EventType::CalendarEventFailed,
                            format!("Failed to create event for session {}", index),
                        )
                        .with_duration(duration_ms)
                        .with_error(error.to_string());
                    ctx.log.append(event);

                    CalendarEntry::Failed(CalendarFailure {
                        session_index: index,
                        session_name: session.session_name.clone(),
                        error: error.message,
                    })
                }
            };
            entries.push(entry);
        }

        Ok(StageOutput::CalendarEvents(entries))
    }
}

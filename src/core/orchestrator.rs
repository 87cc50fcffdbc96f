//! Main orchestrator for pipeline execution.
//!
//! Runs the fixed stage sequence as an explicit state machine, threads the
//! shared state through it, and records every transition in the run's event
//! log. The only decision node is the consent branch after Scheduling (or
//! after Evaluation when that stage is enabled).

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::context::RunContext;
use super::error::{ProfileError, StageError, StageFailure};
use super::invoker::ModelInvoker;
use super::prompts::PromptSet;
use super::retry::RetryPolicy;
use super::safety::SafetyLimits;
use super::stages::{
    run_model_stage, CalendarIntegrationAgent, EvaluationAgent, MedicalSafetyAgent, ModelStage,
    SchedulingAgent, WorkoutPlanningAgent,
};
use crate::adapters::{CalendarTool, ModelBackend};
use crate::config::ResolvedConfig;
use crate::domain::events::{EventLog, EventType};
use crate::domain::profile::UserProfile;
use crate::domain::run::{Run, RunOutcome};
use crate::domain::state::{PipelineState, StageName, StageOutput};
use crate::schema::{catalog, ValidationError, ValidationIssue};

/// Position of a run in the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Stage(StageName),
    Done,
}

impl Phase {
    /// Transition taken after the current phase succeeds
    pub fn next(self, evaluation_enabled: bool, confirmed: bool) -> Phase {
        let consent = if confirmed {
            Phase::Stage(StageName::CalendarIntegration)
        } else {
            Phase::Done
        };

        match self {
            Phase::Start => Phase::Stage(StageName::MedicalSafety),
            Phase::Stage(StageName::MedicalSafety) => Phase::Stage(StageName::WorkoutPlanning),
            Phase::Stage(StageName::WorkoutPlanning) => Phase::Stage(StageName::Scheduling),
            Phase::Stage(StageName::Scheduling) if evaluation_enabled => {
                Phase::Stage(StageName::Evaluation)
            }
            Phase::Stage(StageName::Scheduling) | Phase::Stage(StageName::Evaluation) => consent,
            Phase::Stage(StageName::CalendarIntegration) | Phase::Done => Phase::Done,
        }
    }
}

/// Main pipeline orchestrator
pub struct Orchestrator {
    invoker: ModelInvoker,
    calendar: Arc<dyn CalendarTool>,
    prompts: PromptSet,
    retry_policy: RetryPolicy,
    limits: SafetyLimits,
    evaluation_enabled: bool,
}

impl Orchestrator {
    /// Create an orchestrator with default policy and limits
    pub fn new(backend: Arc<dyn ModelBackend>, calendar: Arc<dyn CalendarTool>) -> Self {
        let limits = SafetyLimits::default();
        Self {
            invoker: ModelInvoker::new(backend).with_max_response_bytes(limits.max_response_bytes),
            calendar,
            prompts: PromptSet::default(),
            retry_policy: RetryPolicy::default(),
            limits,
            evaluation_enabled: false,
        }
    }

    /// Create an orchestrator from resolved configuration
    pub fn from_config(
        config: &ResolvedConfig,
        backend: Arc<dyn ModelBackend>,
        calendar: Arc<dyn CalendarTool>,
    ) -> Result<Self> {
        let prompts = match &config.prompts_dir {
            Some(dir) => PromptSet::from_dir(dir)?,
            None => PromptSet::default(),
        };

        Ok(Self::new(backend, calendar)
            .with_retry_policy(config.retry.clone())
            .with_limits(config.safety.clone())
            .with_model_timeout(config.model_timeout())
            .with_prompts(prompts)
            .with_evaluation(config.evaluation_enabled))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_limits(mut self, limits: SafetyLimits) -> Self {
        self.invoker = self
            .invoker
            .with_max_response_bytes(limits.max_response_bytes);
        self.limits = limits;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.invoker = self.invoker.with_timeout(timeout);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_evaluation(mut self, enabled: bool) -> Self {
        self.evaluation_enabled = enabled;
        self
    }

    /// Validate caller input into a profile.
    ///
    /// Applies the size limit, the profile schema and the window checks.
    pub fn parse_profile(&self, raw: &Value) -> Result<UserProfile, ProfileError> {
        self.limits.validate_profile(&raw.to_string())?;

        let schema = catalog::user_profile();
        schema.check(raw)?;
        let profile: UserProfile = schema.convert(raw.clone())?;

        let issues = availability_issues(&profile);
        if !issues.is_empty() {
            return Err(ValidationError::new(issues).into());
        }

        Ok(profile)
    }

    /// Execute the pipeline for one profile
    pub async fn run(&self, profile: &Value, confirmation: bool) -> Result<Run, ProfileError> {
        self.run_with_cancel(profile, confirmation, CancellationToken::new())
            .await
    }

    /// Execute the pipeline, stopping early if `cancel` fires
    #[instrument(
        skip_all,
        fields(confirmation = confirmation, evaluation = self.evaluation_enabled, run_id = tracing::field::Empty)
    )]
    pub async fn run_with_cancel(
        &self,
        profile: &Value,
        confirmation: bool,
        cancel: CancellationToken,
    ) -> Result<Run, ProfileError> {
        let profile = self.parse_profile(profile)?;

        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        info!(backend = self.invoker.backend_name(), "Starting pipeline run");

        let started_at = Utc::now();
        let mut ctx = RunContext::new(EventLog::new(run_id), self.limits.clone(), cancel);
        let mut state = PipelineState::new(profile, confirmation);

        let event = ctx.log.event(
            None,
            EventType::RunStarted,
            format!(
                "Pipeline run started (backend: {}, confirmation: {}, evaluation: {})",
                self.invoker.backend_name(),
                state.user_confirmation(),
                self.evaluation_enabled
            ),
        );
        ctx.log.append(event);

        let mut phase = Phase::Start.next(self.evaluation_enabled, state.user_confirmation());

        while let Phase::Stage(stage) = phase {
            let event = ctx.log.event(
                Some(stage),
                EventType::StageStarted,
                format!("Stage '{}' started", stage),
            );
            ctx.log.append(event);
            info!(%stage, "Stage started");

            let started = Instant::now();
            let result = self
                .execute(stage, &state, &mut ctx)
                .await
                .and_then(|(output, attempts)| Ok((state.with(output)?, attempts)));
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok((next, attempts)) => {
                    state = next;

                    let mut event = ctx
                        .log
                        .event(
                            Some(stage),
                            EventType::StageCompleted,
                            format!("Stage '{}' completed in {}ms", stage, duration_ms),
                        )
                        .with_duration(duration_ms);
                    if let Some(attempts) = attempts {
                        event = event.with_attempt(attempts);
                    }
                    ctx.log.append(event);
                    info!(%stage, duration_ms, ?attempts, "Stage completed");
                }
                Err(error) => {
                    return Ok(self.fail(ctx, state, started_at, stage, error, duration_ms));
                }
            }

            phase = phase.next(self.evaluation_enabled, state.user_confirmation());

            if phase == Phase::Done && stage != StageName::CalendarIntegration {
                let event = ctx.log.event(
                    Some(StageName::CalendarIntegration),
                    EventType::StageSkipped,
                    "Calendar integration skipped: user did not confirm".to_string(),
                );
                ctx.log.append(event);
                info!("Calendar integration skipped without confirmation");
            }
        }

        let event = ctx.log.event(
            None,
            EventType::RunCompleted,
            format!(
                "Pipeline run completed after {} model call(s)",
                ctx.tracker.model_calls
            ),
        );
        ctx.log.append(event);
        info!(model_calls = ctx.tracker.model_calls, "Pipeline run completed");

        Ok(Run {
            id: run_id,
            started_at,
            completed_at: Utc::now(),
            outcome: RunOutcome::Done,
            state,
            events: ctx.log.into_events(),
        })
    }

    /// Run one stage; attempts are reported for model-backed stages only
    async fn execute(
        &self,
        stage: StageName,
        state: &PipelineState,
        ctx: &mut RunContext,
    ) -> Result<(StageOutput, Option<u32>), StageError> {
        match stage {
            StageName::MedicalSafety => self.model_stage::<MedicalSafetyAgent>(state, ctx).await,
            StageName::WorkoutPlanning => {
                self.model_stage::<WorkoutPlanningAgent>(state, ctx).await
            }
            StageName::Scheduling => self.model_stage::<SchedulingAgent>(state, ctx).await,
            StageName::Evaluation => self.model_stage::<EvaluationAgent>(state, ctx).await,
            StageName::CalendarIntegration => {
                let output = CalendarIntegrationAgent::new(self.calendar.clone())
                    .run(state, ctx)
                    .await?;
                Ok((output, None))
            }
        }
    }

    async fn model_stage<S: ModelStage>(
        &self,
        state: &PipelineState,
        ctx: &mut RunContext,
    ) -> Result<(StageOutput, Option<u32>), StageError> {
        let validated =
            run_model_stage::<S>(state, ctx, &self.invoker, &self.retry_policy, &self.prompts)
                .await?;
        Ok((validated.value, Some(validated.attempts)))
    }

    /// Close a run at a failed stage; the state keeps only completed stages
    fn fail(
        &self,
        mut ctx: RunContext,
        state: PipelineState,
        started_at: chrono::DateTime<Utc>,
        stage: StageName,
        error: StageError,
        duration_ms: u64,
    ) -> Run {
        error!(%stage, %error, "Stage failed");

        let event = ctx
            .log
            .event(
                Some(stage),
                EventType::StageFailed,
                format!("Stage '{}' failed after {}ms", stage, duration_ms),
            )
            .with_duration(duration_ms)
            .with_error(error.to_string());
        ctx.log.append(event);

        let failure = StageFailure { stage, error };
        let event = ctx
            .log
            .event(None, EventType::RunFailed, format!("Pipeline run failed at stage '{}'", stage))
            .with_error(failure.to_string());
        ctx.log.append(event);

        Run {
            id: ctx.log.run_id(),
            started_at,
            completed_at: Utc::now(),
            outcome: RunOutcome::Failed { failure },
            state,
            events: ctx.log.into_events(),
        }
    }
}

/// Window checks the schema cannot express
fn availability_issues(profile: &UserProfile) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for (i, window) in profile.availability.iter().enumerate() {
        let path = format!("availability[{}]", i);

        match (window.date, window.day) {
            (Some(_), Some(_)) => issues.push(ValidationIssue::new(
                path.clone(),
                "must set exactly one of date or day (found both)",
            )),
            (None, None) => issues.push(ValidationIssue::new(
                path.clone(),
                "must set exactly one of date or day (found neither)",
            )),
            _ => {}
        }

        if window.end_time <= window.start_time {
            issues.push(ValidationIssue::new(
                format!("{}.end_time", path),
                "must be later than start_time",
            ));
        }
    }

    issues
}

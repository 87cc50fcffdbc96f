//! Shared pipeline state threaded through every stage of a run.
//!
//! The state is append-only: each stage hands back a `StageOutput` which is
//! merged into a new state value. A field is present iff its producing stage
//! completed, and a present field can never be replaced.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::calendar::CalendarEntry;
use super::plan::{Evaluation, MedicalConstraints, Schedule, WorkoutPlan};
use super::profile::UserProfile;

/// Stages of the pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    MedicalSafety,
    WorkoutPlanning,
    Scheduling,
    Evaluation,
    CalendarIntegration,
}

impl StageName {
    pub const ALL: [StageName; 5] = [
        Self::MedicalSafety,
        Self::WorkoutPlanning,
        Self::Scheduling,
        Self::Evaluation,
        Self::CalendarIntegration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MedicalSafety => "medical_safety",
            Self::WorkoutPlanning => "workout_planning",
            Self::Scheduling => "scheduling",
            Self::Evaluation => "evaluation",
            Self::CalendarIntegration => "calendar_integration",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{}'", s))
    }
}

/// Stage-produced fields of the shared state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    MedicalConstraints,
    WorkoutPlan,
    Schedule,
    Evaluation,
    CalendarEvents,
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MedicalConstraints => "medical_constraints",
            Self::WorkoutPlan => "workout_plan",
            Self::Schedule => "schedule",
            Self::Evaluation => "evaluation",
            Self::CalendarEvents => "calendar_events",
        };
        f.write_str(name)
    }
}

/// Misuse of the append-only state
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateError {
    #[error("state field '{0}' is required but has not been produced yet")]
    MissingField(StateField),

    #[error("state field '{0}' is already set and cannot be overwritten")]
    AlreadySet(StateField),
}

/// Delta a stage contributes to the state
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    MedicalConstraints(MedicalConstraints),
    WorkoutPlan(WorkoutPlan),
    Schedule(Schedule),
    Evaluation(Evaluation),
    CalendarEvents(Vec<CalendarEntry>),
}

impl StageOutput {
    pub fn field(&self) -> StateField {
        match self {
            Self::MedicalConstraints(_) => StateField::MedicalConstraints,
            Self::WorkoutPlan(_) => StateField::WorkoutPlan,
            Self::Schedule(_) => StateField::Schedule,
            Self::Evaluation(_) => StateField::Evaluation,
            Self::CalendarEvents(_) => StateField::CalendarEvents,
        }
    }
}

/// Accumulating record for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineState {
    user_profile: UserProfile,
    user_confirmation: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    medical_constraints: Option<MedicalConstraints>,

    #[serde(skip_serializing_if = "Option::is_none")]
    workout_plan: Option<WorkoutPlan>,

    #[serde(skip_serializing_if = "Option::is_none")]
    schedule: Option<Schedule>,

    #[serde(skip_serializing_if = "Option::is_none")]
    evaluation: Option<Evaluation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    calendar_events: Option<Vec<CalendarEntry>>,
}

impl PipelineState {
    /// Fresh state holding only the caller's input
    pub fn new(user_profile: UserProfile, user_confirmation: bool) -> Self {
        Self {
            user_profile,
            user_confirmation,
            medical_constraints: None,
            workout_plan: None,
            schedule: None,
            evaluation: None,
            calendar_events: None,
        }
    }

    /// Merge a stage's output, producing the next state.
    ///
    /// Fails without touching `self` if the field is already present.
    pub fn with(&self, output: StageOutput) -> Result<Self, StateError> {
        if self.has(output.field()) {
            return Err(StateError::AlreadySet(output.field()));
        }

        let mut next = self.clone();
        match output {
            StageOutput::MedicalConstraints(v) => next.medical_constraints = Some(v),
            StageOutput::WorkoutPlan(v) => next.workout_plan = Some(v),
            StageOutput::Schedule(v) => next.schedule = Some(v),
            StageOutput::Evaluation(v) => next.evaluation = Some(v),
            StageOutput::CalendarEvents(v) => next.calendar_events = Some(v),
        }
        Ok(next)
    }

    /// Check whether a stage field has been produced
    pub fn has(&self, field: StateField) -> bool {
        match field {
            StateField::MedicalConstraints => self.medical_constraints.is_some(),
            StateField::WorkoutPlan => self.workout_plan.is_some(),
            StateField::Schedule => self.schedule.is_some(),
            StateField::Evaluation => self.evaluation.is_some(),
            StateField::CalendarEvents => self.calendar_events.is_some(),
        }
    }

    pub fn user_profile(&self) -> &UserProfile {
        &self.user_profile
    }

    pub fn user_confirmation(&self) -> bool {
        self.user_confirmation
    }

    pub fn medical_constraints(&self) -> Option<&MedicalConstraints> {
        self.medical_constraints.as_ref()
    }

    pub fn workout_plan(&self) -> Option<&WorkoutPlan> {
        self.workout_plan.as_ref()
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    pub fn calendar_events(&self) -> Option<&[CalendarEntry]> {
        self.calendar_events.as_deref()
    }

    pub fn require_medical_constraints(&self) -> Result<&MedicalConstraints, StateError> {
        self.medical_constraints
            .as_ref()
            .ok_or(StateError::MissingField(StateField::MedicalConstraints))
    }

    pub fn require_workout_plan(&self) -> Result<&WorkoutPlan, StateError> {
        self.workout_plan
            .as_ref()
            .ok_or(StateError::MissingField(StateField::WorkoutPlan))
    }

    pub fn require_schedule(&self) -> Result<&Schedule, StateError> {
        self.schedule
            .as_ref()
            .ok_or(StateError::MissingField(StateField::Schedule))
    }
}

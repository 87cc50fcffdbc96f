//! Stage and run failure types.

use serde::Serialize;
use thiserror::Error;

use super::safety::SafetyViolation;
use crate::adapters::BackendError;
use crate::domain::state::{StageName, StateError};
use crate::schema::{ValidationError, ValidationIssue};

/// Why a stage stopped before producing output
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StageError {
    /// Backend call could not be completed; never retried
    #[error("model backend failed: {error}")]
    Backend {
        #[source]
        error: BackendError,
    },

    /// Every attempt produced invalid output
    #[error("output still invalid after {attempts} attempt(s): {}", render(.last_errors))]
    ValidationExhausted {
        attempts: u32,
        last_errors: Vec<ValidationIssue>,
    },

    #[error("run cancelled: {reason}")]
    Cancelled { reason: CancelReason },

    #[error("safety limit reached: {violation}")]
    SafetyLimit {
        #[source]
        violation: SafetyViolation,
    },

    /// Upstream field missing or overwrite attempted
    #[error("pipeline state error: {error}")]
    State {
        #[source]
        error: StateError,
    },
}

impl From<BackendError> for StageError {
    fn from(error: BackendError) -> Self {
        Self::Backend { error }
    }
}

impl From<StateError> for StageError {
    fn from(error: StateError) -> Self {
        Self::State { error }
    }
}

fn render(issues: &[ValidationIssue]) -> String {
    ValidationError::new(issues.to_vec()).to_string()
}

/// Source of a cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum CancelReason {
    #[error("cancellation requested by caller")]
    Requested,

    #[error("run deadline of {limit_seconds}s exceeded")]
    DeadlineExceeded { limit_seconds: u64 },
}

/// Terminal failure of a run: which stage failed and why
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("stage '{stage}' failed: {error}")]
pub struct StageFailure {
    pub stage: StageName,
    pub error: StageError,
}

/// Caller input rejected before the run starts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("invalid user profile: {0}")]
    Invalid(#[from] ValidationError),

    #[error("user profile rejected: {0}")]
    Limit(#[from] SafetyViolation),
}

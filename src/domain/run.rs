//! Run record returned to the caller.
//!
//! A Run is one execution of the pipeline: its terminal outcome, the final
//! shared state and the event log it produced.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::events::Event;
use super::state::PipelineState;
use crate::core::error::StageFailure;

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunOutcome {
    /// All required stages completed; calendar events only if confirmed
    Done,

    /// A stage failed; later stages never ran
    Failed { failure: StageFailure },
}

/// A completed pipeline execution
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    pub outcome: RunOutcome,

    /// State as of the last successful stage
    pub state: PipelineState,

    /// Events recorded during the run, in order
    pub events: Vec<Event>,
}

impl Run {
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, RunOutcome::Done)
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        match &self.outcome {
            RunOutcome::Done => None,
            RunOutcome::Failed { failure } => Some(failure),
        }
    }

    /// Final state on success, the failure otherwise
    pub fn into_result(self) -> Result<PipelineState, StageFailure> {
        match self.outcome {
            RunOutcome::Done => Ok(self.state),
            RunOutcome::Failed { failure } => Err(failure),
        }
    }

    /// Total run time in milliseconds
    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

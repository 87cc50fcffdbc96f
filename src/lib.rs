//! fitplan - Safety-gated fitness planning pipeline
//!
//! Turns a user's medical history, goals and availability into a workout
//! plan and schedule by chaining generative-model stages, each validated
//! against a strict schema with corrective retries.
//!
//! # Architecture
//!
//! A run moves through a fixed state machine:
//! Medical Safety -> Workout Planning -> Scheduling -> (Evaluation) ->
//! Calendar Integration, the last stage only with explicit user consent.
//! - Every stage output is validated; rejected output is retried with
//!   feedback describing each issue
//! - Shared state is append-only: a stage can never overwrite an earlier result
//! - Every transition is recorded in the run's event log
//!
//! # Modules
//!
//! - `adapters`: Model backends and calendar tools
//! - `core`: Invoker, retry loop, stage agents, orchestrator
//! - `domain`: Data structures (UserProfile, PipelineState, Run, Event)
//! - `schema`: Declarative schemas and the validator
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Plan without touching the calendar
//! fitplan run --profile profile.yaml
//!
//! # Plan and create calendar events
//! fitplan run --profile profile.yaml --confirm
//!
//! # Offline run from recorded replies
//! fitplan run --profile profile.yaml --replay replies.yaml
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod schema;

// Re-export main types at crate root for convenience
pub use crate::core::{Orchestrator, StageError, StageFailure};
pub use crate::domain::{Event, EventType, PipelineState, Run, RunOutcome, StageName, UserProfile};
pub use crate::schema::{Schema, ValidationError, ValidationIssue};

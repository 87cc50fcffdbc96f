//! Domain types for the fitplan pipeline.
//!
//! This module contains the core data structures:
//! - Profile: caller input (medical history, goals, availability)
//! - Plan: typed stage outputs
//! - State: the append-only shared pipeline state
//! - Events: in-memory run event log
//! - Run: terminal outcome of one execution

pub mod calendar;
pub mod clock;
pub mod events;
pub mod plan;
pub mod profile;
pub mod run;
pub mod state;

// Re-export commonly used types
pub use calendar::{CalendarEntry, CalendarEventRecord, CalendarFailure, CreatedEvent};
pub use clock::{Day, Slot};
pub use events::{Event, EventLog, EventType};
pub use plan::{
    Contraindication, Evaluation, EvaluationScores, Level, MedicalConstraints, PlanType, Schedule,
    ScheduledSession, SessionTemplate, Verdict, WorkoutPlan,
};
pub use profile::{AvailabilityWindow, UserProfile};
pub use run::{Run, RunOutcome};
pub use state::{PipelineState, StageName, StageOutput, StateError, StateField};

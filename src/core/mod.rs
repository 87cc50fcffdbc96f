//! Core orchestration logic.
//!
//! This module contains:
//! - Invoker: one prompt, one backend call
//! - Retry: the retry-validate loop and its policy
//! - Stages: the stage agents
//! - Safety: limits on profile size, responses, model calls and run time
//! - Orchestrator: the pipeline state machine

pub mod context;
pub mod error;
pub mod invoker;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod safety;
pub mod stages;

// Re-export commonly used types
pub use context::RunContext;
pub use error::{CancelReason, ProfileError, StageError, StageFailure};
pub use invoker::{prompt_digest, ModelInvoker};
pub use orchestrator::{Orchestrator, Phase};
pub use prompts::PromptSet;
pub use retry::{Feedback, RetryLoop, RetryPolicy, Validated};
pub use safety::{SafetyLimits, SafetyTracker, SafetyViolation};
pub use stages::{
    run_model_stage, CalendarIntegrationAgent, EvaluationAgent, MedicalSafetyAgent, ModelStage,
    SchedulingAgent, WorkoutPlanningAgent,
};

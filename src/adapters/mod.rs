//! Adapter interfaces for external collaborators.
//!
//! Adapters put the generative-model backend and the calendar provider
//! behind traits so the pipeline core never depends on a concrete service.

pub mod calendar;
pub mod openai;
pub mod scripted;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::calendar::CreatedEvent;
use crate::domain::plan::ScheduledSession;

pub use calendar::LocalCalendar;
pub use openai::OpenAiBackend;
pub use scripted::{ScriptedBackend, ScriptedReply};

/// The backend call itself could not be completed.
///
/// Distinct from a validation failure: never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BackendError {
    #[error("backend rejected credentials: {detail}")]
    Unauthorized { detail: String },

    #[error("backend rate limit or quota exceeded: {detail}")]
    RateLimited { detail: String },

    #[error("backend unavailable: {detail}")]
    Unavailable { detail: String },

    #[error("backend call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("malformed backend response: {detail}")]
    InvalidResponse { detail: String },

    #[error("backend response of {actual} bytes exceeds limit of {limit} bytes")]
    ResponseTooLarge { actual: u64, limit: u64 },
}

impl BackendError {
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::Unavailable {
            detail: detail.into(),
        }
    }
}

/// One rendered model request.
///
/// `system` carries the stage instructions and format rules, `user` the
/// stage input and any correction. Chat backends send them as separate
/// messages; `Display` joins them for backends that take plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Prompt without system instructions
    pub fn user(user: impl Into<String>) -> Self {
        Self::new(String::new(), user)
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.system.is_empty() {
            f.write_str(&self.user)
        } else {
            write!(f, "{}\n\n{}", self.system, self.user)
        }
    }
}

/// Generative model backend: prompt in, raw text out
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Complete a single prompt
    async fn complete(&self, prompt: &Prompt) -> Result<String, BackendError>;
}

/// Calendar event creation failed for one session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("calendar tool failed: {message}")]
pub struct ToolError {
    pub message: String,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Calendar provider used by the Calendar Integration stage
#[async_trait]
pub trait CalendarTool: Send + Sync {
    fn name(&self) -> &str;

    /// Create one event for one scheduled session
    async fn create_event(&self, session: &ScheduledSession) -> Result<CreatedEvent, ToolError>;
}

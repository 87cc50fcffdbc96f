//! Retry-validate loop.
//!
//! Wraps the model invoker and a validator. A rejected response is retried
//! with a corrective prompt built from its validation issues, up to the
//! policy's attempt bound. Backend failures abort immediately.

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::context::RunContext;
use super::error::StageError;
use super::invoker::ModelInvoker;
use crate::adapters::Prompt;
use crate::domain::events::EventType;
use crate::domain::state::StageName;
use crate::schema::{Schema, ValidationError, ValidationIssue};

/// Attempt bound and pacing for corrective retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    100
}
fn default_max_delay() -> u64 {
    2000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given attempt bound and no delay between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            ..Default::default()
        }
    }

    /// Effective attempt bound; zero is treated as one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after a rejected attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if another attempt is allowed after `attempt`
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.attempts()
    }
}

/// Why the previous attempt was rejected; rendered into the next prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    /// The rejected attempt
    pub attempt: u32,
    pub issues: Vec<ValidationIssue>,
}

impl Feedback {
    pub fn new(attempt: u32, issues: Vec<ValidationIssue>) -> Self {
        Self { attempt, issues }
    }

    /// Corrective block appended to the prompt
    pub fn render(&self) -> String {
        let mut out = format!(
            "Your previous response (attempt {}) was rejected because:\n",
            self.attempt
        );
        for issue in &self.issues {
            out.push_str(&format!("- {}\n", issue));
        }
        out.push_str(
            "Regenerate the complete response, strictly adhering to the schema. \
             Return ONLY valid JSON.",
        );
        out
    }
}

/// A validated value and how many attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Validated<T> {
    pub value: T,
    pub attempts: u32,
}

/// Invoke-validate-retry driver for one stage
pub struct RetryLoop<'a> {
    invoker: &'a ModelInvoker,
    policy: &'a RetryPolicy,
}

impl<'a> RetryLoop<'a> {
    pub fn new(invoker: &'a ModelInvoker, policy: &'a RetryPolicy) -> Self {
        Self { invoker, policy }
    }

    /// Run the loop with a custom validator.
    ///
    /// `render` receives the feedback of the immediately preceding attempt
    /// (`None` on the first). `validate` turns raw text into a value or an
    /// ordered issue list.
    pub async fn run<T, R, V>(
        &self,
        stage: StageName,
        ctx: &mut RunContext,
        render: R,
        validate: V,
    ) -> Result<Validated<T>, StageError>
    where
        R: Fn(Option<&Feedback>) -> Prompt,
        V: Fn(&str) -> Result<T, ValidationError>,
    {
        let max_attempts = self.policy.attempts();
        let mut feedback: Option<Feedback> = None;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            ctx.ensure_can_call()?;

            let prompt = render(feedback.as_ref());
            let started = Instant::now();

            let raw = match ctx.guard(self.invoker.invoke(&prompt)).await? {
                Ok(raw) => raw,
                Err(error) => {
                    ctx.tracker.record_call();
                    warn!(%stage, attempt, %error, "Backend call failed");
                    return Err(StageError::Backend { error });
                }
            };
            ctx.tracker.record_call();
            let duration_ms = started.elapsed().as_millis() as u64;

            let err = match validate(&raw) {
                Ok(value) => {
                    debug!(%stage, attempt, duration_ms, "Response accepted");
                    return Ok(Validated {
                        value,
                        attempts: attempt,
                    });
                }
                Err(err) => err,
            };

            warn!(
                %stage,
                attempt,
                max_attempts,
                issues = err.issues.len(),
                "Response rejected by validation"
            );
            let event = ctx
                .log
                .event(
                    Some(stage),
                    EventType::AttemptRejected,
                    format!(
                        "Stage '{}' attempt {}/{} rejected with {} issue(s)",
                        stage,
                        attempt,
                        max_attempts,
                        err.issues.len()
                    ),
                )
                .with_attempt(attempt)
                .with_duration(duration_ms)
                .with_error(err.to_string());
            ctx.log.append(event);

            if !self.policy.should_retry(attempt) {
                return Err(StageError::ValidationExhausted {
                    attempts: attempt,
                    last_errors: err.issues,
                });
            }

            feedback = Some(Feedback::new(attempt, err.issues));

            let delay = self.policy.delay_for_attempt(attempt);
            if !delay.is_zero() {
                ctx.guard(tokio::time::sleep(delay)).await?;
            }
        }
    }

    /// Run the loop validating against a schema
    pub async fn run_schema<T, R>(
        &self,
        stage: StageName,
        ctx: &mut RunContext,
        render: R,
        schema: &Schema,
    ) -> Result<Validated<T>, StageError>
    where
        T: DeserializeOwned,
        R: Fn(Option<&Feedback>) -> Prompt,
    {
        self.run(stage, ctx, render, |raw| schema.validate_as::<T>(raw))
            .await
    }
}

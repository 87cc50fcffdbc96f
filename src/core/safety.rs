//! Safety limits and enforcement for pipeline runs.
//!
//! Bounds the cost of a run through configurable limits on:
//! - Profile size (it is embedded in every prompt)
//! - Response size (enforced by the model invoker)
//! - Total model calls across all stages and retries
//! - Run wall-clock time

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Safety limits for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Maximum serialized profile size in bytes (default: 64KB)
    #[serde(default = "default_max_profile_bytes")]
    pub max_profile_bytes: u64,

    /// Maximum model response size in bytes (default: 1MB)
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,

    /// Maximum model calls per run, retries included (default: 24)
    #[serde(default = "default_max_model_calls")]
    pub max_model_calls: u32,

    /// Total run deadline in seconds (default: 600 = 10 min)
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,
}

fn default_max_profile_bytes() -> u64 {
    64 * 1024
}
fn default_max_response_bytes() -> u64 {
    1024 * 1024
}
fn default_max_model_calls() -> u32 {
    24
}
fn default_run_timeout() -> u64 {
    600
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_profile_bytes: default_max_profile_bytes(),
            max_response_bytes: default_max_response_bytes(),
            max_model_calls: default_max_model_calls(),
            run_timeout_seconds: default_run_timeout(),
        }
    }
}

impl SafetyLimits {
    /// Validate the serialized profile against the size limit
    pub fn validate_profile(&self, serialized: &str) -> Result<(), SafetyViolation> {
        let size = serialized.len() as u64;
        if size > self.max_profile_bytes {
            return Err(SafetyViolation::MaxProfileBytes {
                actual: size,
                limit: self.max_profile_bytes,
            });
        }
        Ok(())
    }

    /// Check tracker state before another model call
    pub fn check(&self, tracker: &SafetyTracker) -> Result<(), SafetyViolation> {
        if tracker.model_calls >= self.max_model_calls {
            return Err(SafetyViolation::MaxModelCalls {
                actual: tracker.model_calls,
                limit: self.max_model_calls,
            });
        }

        let elapsed = tracker.started_at.elapsed().as_secs();
        if tracker.started_at.elapsed() >= self.run_timeout() {
            return Err(SafetyViolation::RunTimeout {
                elapsed_seconds: elapsed,
                limit_seconds: self.run_timeout_seconds,
            });
        }

        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }
}

/// Tracks resource usage during a run
#[derive(Debug, Clone)]
pub struct SafetyTracker {
    /// Model calls made, retries included
    pub model_calls: u32,

    /// When the run started
    pub started_at: Instant,
}

impl Default for SafetyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyTracker {
    pub fn new() -> Self {
        Self {
            model_calls: 0,
            started_at: Instant::now(),
        }
    }

    /// Record one model call
    pub fn record_call(&mut self) {
        self.model_calls += 1;
    }

    /// Get elapsed time in seconds
    pub fn elapsed_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Safety violation errors
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case", tag = "violation")]
pub enum SafetyViolation {
    #[error("Maximum profile bytes exceeded: {actual} > {limit}")]
    MaxProfileBytes { actual: u64, limit: u64 },

    #[error("Maximum model calls reached: {actual} >= {limit}")]
    MaxModelCalls { actual: u32, limit: u32 },

    #[error("Run timeout: {elapsed_seconds}s >= {limit_seconds}s")]
    RunTimeout {
        elapsed_seconds: u64,
        limit_seconds: u64,
    },
}

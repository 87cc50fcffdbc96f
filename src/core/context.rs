//! Per-run execution context: event log, resource tracker and cancellation.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::error::{CancelReason, StageError};
use super::safety::{SafetyLimits, SafetyTracker, SafetyViolation};
use crate::domain::events::EventLog;

/// Everything a run owns besides its pipeline state
pub struct RunContext {
    pub log: EventLog,
    pub tracker: SafetyTracker,
    limits: SafetyLimits,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(log: EventLog, limits: SafetyLimits, cancel: CancellationToken) -> Self {
        Self {
            log,
            tracker: SafetyTracker::new(),
            limits,
            cancel,
        }
    }

    /// Gate checked before every model call
    pub fn ensure_can_call(&self) -> Result<(), StageError> {
        if self.cancel.is_cancelled() {
            return Err(StageError::Cancelled {
                reason: CancelReason::Requested,
            });
        }

        self.limits.check(&self.tracker).map_err(|violation| match violation {
            SafetyViolation::RunTimeout { limit_seconds, .. } => StageError::Cancelled {
                reason: CancelReason::DeadlineExceeded { limit_seconds },
            },
            violation => StageError::SafetyLimit { violation },
        })
    }

    /// Drive a future unless the caller cancels or the run deadline passes first
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, StageError> {
        let remaining = self
            .limits
            .run_timeout()
            .saturating_sub(self.tracker.started_at.elapsed());

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StageError::Cancelled {
                reason: CancelReason::Requested,
            }),
            _ = tokio::time::sleep(remaining) => Err(StageError::Cancelled {
                reason: CancelReason::DeadlineExceeded {
                    limit_seconds: self.limits.run_timeout_seconds,
                },
            }),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn context(limits: SafetyLimits, cancel: CancellationToken) -> RunContext {
        RunContext::new(EventLog::new(Uuid::new_v4()), limits, cancel)
    }

    #[test]
    fn test_cancelled_token_blocks_calls() {
        let cancel = CancellationToken::new();
        let ctx = context(SafetyLimits::default(), cancel.clone());
        assert!(ctx.ensure_can_call().is_ok());

        cancel.cancel();
        assert_eq!(
            ctx.ensure_can_call(),
            Err(StageError::Cancelled {
                reason: CancelReason::Requested
            })
        );
    }

    #[test]
    fn test_call_budget_is_safety_limit() {
        let limits = SafetyLimits {
            max_model_calls: 1,
            ..Default::default()
        };
        let mut ctx = context(limits, CancellationToken::new());
        ctx.tracker.record_call();

        assert!(matches!(
            ctx.ensure_can_call(),
            Err(StageError::SafetyLimit {
                violation: SafetyViolation::MaxModelCalls { .. }
            })
        ));
    }

    #[tokio::test]
    async fn test_guard_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let ctx = context(SafetyLimits::default(), cancel.clone());
        cancel.cancel();

        let result = ctx.guard(tokio::time::sleep(Duration::from_secs(5))).await;
        assert!(matches!(result, Err(StageError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_guard_passes_output() {
        let ctx = context(SafetyLimits::default(), CancellationToken::new());
        assert_eq!(ctx.guard(async { 7 }).await, Ok(7));
    }
}

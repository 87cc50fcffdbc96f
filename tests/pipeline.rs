//! Pipeline Integration Tests
//!
//! End-to-end runs through the orchestrator with scripted model replies.

use std::sync::Arc;

use async_trait::async_trait;
use fitplan::adapters::{
    BackendError, CalendarTool, LocalCalendar, ScriptedBackend, ScriptedReply, ToolError,
};
use fitplan::core::{CancelReason, Orchestrator, RetryPolicy, StageError};
use fitplan::domain::calendar::{CalendarEntry, CreatedEvent};
use fitplan::domain::events::EventType;
use fitplan::domain::plan::{ScheduledSession, Verdict};
use fitplan::domain::state::StageName;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

const CONSTRAINTS: &str = r#"{
    "risk_level": "medium",
    "contraindicated_exercises": [
        {"category": "high-impact jumping", "rationale": "aggravates the knee injury"}
    ],
    "recommended_focus_areas": ["knee stability"],
    "warnings": []
}"#;

const PLAN: &str = r#"{
    "plan_type": "strength",
    "weekly_sessions": 2,
    "session_templates": [
        {"name": "Upper Body", "duration_minutes": 45, "exercise_categories": ["upper body strength"], "intensity": "medium"},
        {"name": "Knee Rehab", "duration_minutes": 40, "exercise_categories": ["knee stability"], "intensity": "low"}
    ]
}"#;

const PLAN_WITH_JUMPS: &str = r#"{
    "plan_type": "strength",
    "weekly_sessions": 2,
    "session_templates": [
        {"name": "Upper Body", "duration_minutes": 45, "exercise_categories": ["upper body strength"], "intensity": "medium"},
        {"name": "Power", "duration_minutes": 40, "exercise_categories": ["High Impact Jumping"], "intensity": "high"}
    ]
}"#;

// 2026-02-09 is a Monday, 2026-02-11 a Wednesday
const SCHEDULE: &str = r#"{
    "scheduled_sessions": [
        {"date": "2026-02-09", "start_time": "18:00", "duration_minutes": 45, "session_name": "Upper Body"},
        {"date": "2026-02-11", "start_time": "18:00", "duration_minutes": 40, "session_name": "Knee Rehab"}
    ]
}"#;

const EVALUATION: &str = r#"{
    "scores": {"safety": 5, "goal_alignment": 4, "realism": 4, "schedule_fit": 5, "clarity": 4},
    "issues": [],
    "verdict": "pass"
}"#;

fn profile() -> Value {
    json!({
        "medical_history": ["knee injury (2024)"],
        "short_term_goals": ["build upper body strength"],
        "long_term_goals": ["return to running"],
        "availability": [
            { "day": "mon", "start_time": "18:00", "end_time": "19:00" },
            { "day": "wed", "start_time": "18:00", "end_time": "19:00" }
        ]
    })
}

fn orchestrator(backend: Arc<ScriptedBackend>, calendar: Arc<dyn CalendarTool>) -> Orchestrator {
    Orchestrator::new(backend, calendar).with_retry_policy(RetryPolicy::immediate(3))
}

/// Calendar that fails for one named session
struct FlakyCalendar {
    inner: LocalCalendar,
    fail_on: &'static str,
}

#[async_trait]
impl CalendarTool for FlakyCalendar {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn create_event(&self, session: &ScheduledSession) -> Result<CreatedEvent, ToolError> {
        if session.session_name == self.fail_on {
            return Err(ToolError::new("calendar quota exceeded"));
        }
        self.inner.create_event(session).await
    }
}

#[tokio::test]
async fn test_confirmed_run_creates_events() {
    let backend = Arc::new(ScriptedBackend::with_texts([CONSTRAINTS, PLAN, SCHEDULE]));
    let calendar = Arc::new(LocalCalendar::new());

    let run = orchestrator(backend.clone(), calendar.clone())
        .run(&profile(), true)
        .await
        .unwrap();

    assert!(run.is_done(), "run failed: {:?}", run.failure());
    assert_eq!(backend.calls(), 3);

    let state = &run.state;
    assert!(state.medical_constraints().is_some());
    assert_eq!(state.workout_plan().unwrap().session_templates.len(), 2);
    assert_eq!(state.schedule().unwrap().scheduled_sessions.len(), 2);

    let entries = state.calendar_events().unwrap();
    let ids: Vec<_> = entries.iter().filter_map(CalendarEntry::event_id).collect();
    assert_eq!(ids, vec!["evt_2026-02-09_1800", "evt_2026-02-11_1800"]);
    assert_eq!(calendar.created().len(), 2);

    assert_eq!(run.events.first().unwrap().event_type, EventType::RunStarted);
    assert_eq!(run.events.last().unwrap().event_type, EventType::RunCompleted);
}

#[tokio::test]
async fn test_unconfirmed_run_skips_calendar() {
    let backend = Arc::new(ScriptedBackend::with_texts([CONSTRAINTS, PLAN, SCHEDULE]));
    let calendar = Arc::new(LocalCalendar::new());

    let run = orchestrator(backend, calendar.clone())
        .run(&profile(), false)
        .await
        .unwrap();

    assert!(run.is_done());
    assert!(run.state.schedule().is_some());
    assert!(run.state.calendar_events().is_none());
    assert!(calendar.created().is_empty());

    let skipped: Vec<_> = run
        .events
        .iter()
        .filter(|e| e.event_type == EventType::StageSkipped)
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].stage, Some(StageName::CalendarIntegration));

    let json = serde_json::to_value(&run).unwrap();
    assert!(json["state"].get("calendar_events").is_none());
}

#[tokio::test]
async fn test_failing_stage_halts_pipeline() {
    let backend = Arc::new(ScriptedBackend::with_texts([
        CONSTRAINTS,
        r#"{"plan_type": "yoga"}"#,
        r#"{"plan_type": "yoga"}"#,
        SCHEDULE,
    ]));
    let calendar = Arc::new(LocalCalendar::new());

    let run = Orchestrator::new(backend.clone(), calendar.clone())
        .with_retry_policy(RetryPolicy::immediate(2))
        .run(&profile(), true)
        .await
        .unwrap();

    let failure = run.failure().expect("run should fail");
    assert_eq!(failure.stage, StageName::WorkoutPlanning);
    assert!(matches!(
        failure.error,
        StageError::ValidationExhausted { attempts: 2, .. }
    ));

    // Only completed stages are in the state; nothing downstream ran
    assert!(run.state.medical_constraints().is_some());
    assert!(run.state.workout_plan().is_none());
    assert!(run.state.schedule().is_none());
    assert!(run.state.calendar_events().is_none());
    assert_eq!(backend.calls(), 3);
    assert!(calendar.created().is_empty());
    assert_eq!(run.events.last().unwrap().event_type, EventType::RunFailed);
}

#[tokio::test]
async fn test_contraindicated_plan_is_corrected() {
    let backend = Arc::new(ScriptedBackend::with_texts([
        CONSTRAINTS,
        PLAN_WITH_JUMPS,
        PLAN,
        SCHEDULE,
    ]));

    let run = orchestrator(backend.clone(), Arc::new(LocalCalendar::new()))
        .run(&profile(), false)
        .await
        .unwrap();

    assert!(run.is_done());
    assert_eq!(backend.calls(), 4);

    let retry_prompt = &backend.prompts()[2];
    assert!(retry_prompt.contains("session_templates[1].exercise_categories[0]"));
    assert!(retry_prompt.contains("contraindicated_exercises"));

    let completed = run
        .events
        .iter()
        .find(|e| {
            e.event_type == EventType::StageCompleted
                && e.stage == Some(StageName::WorkoutPlanning)
        })
        .unwrap();
    assert_eq!(completed.attempt, Some(2));
}

#[tokio::test]
async fn test_calendar_failure_is_recorded_per_session() {
    let backend = Arc::new(ScriptedBackend::with_texts([CONSTRAINTS, PLAN, SCHEDULE]));
    let calendar = Arc::new(FlakyCalendar {
        inner: LocalCalendar::new(),
        fail_on: "Upper Body",
    });

    let run = orchestrator(backend, calendar.clone())
        .run(&profile(), true)
        .await
        .unwrap();

    assert!(run.is_done());
    let entries = run.state.calendar_events().unwrap();
    assert_eq!(entries.len(), 2);

    match &entries[0] {
        CalendarEntry::Failed(failure) => {
            assert_eq!(failure.session_index, 0);
            assert_eq!(failure.error, "calendar quota exceeded");
        }
        other => panic!("Expected failure, got {:?}", other),
    }
    assert_eq!(entries[1].event_id(), Some("evt_2026-02-11_1800"));
    assert_eq!(calendar.inner.created().len(), 1);
}

#[tokio::test]
async fn test_backend_failure_fails_run() {
    let backend = Arc::new(ScriptedBackend::new([ScriptedReply::Error(
        BackendError::Unauthorized {
            detail: "bad key".to_string(),
        },
    )]));

    let run = orchestrator(backend.clone(), Arc::new(LocalCalendar::new()))
        .run(&profile(), true)
        .await
        .unwrap();

    let failure = run.failure().unwrap();
    assert_eq!(failure.stage, StageName::MedicalSafety);
    assert!(matches!(failure.error, StageError::Backend { .. }));
    assert_eq!(backend.calls(), 1);
    assert!(run.state.medical_constraints().is_none());
}

#[tokio::test]
async fn test_evaluation_stage_when_enabled() {
    let backend = Arc::new(ScriptedBackend::with_texts([
        CONSTRAINTS,
        PLAN,
        SCHEDULE,
        EVALUATION,
    ]));

    let run = orchestrator(backend.clone(), Arc::new(LocalCalendar::new()))
        .with_evaluation(true)
        .run(&profile(), true)
        .await
        .unwrap();

    assert!(run.is_done());
    assert_eq!(backend.calls(), 4);
    assert_eq!(run.state.evaluation().unwrap().verdict, Verdict::Pass);
    assert_eq!(run.state.calendar_events().unwrap().len(), 2);
}

#[tokio::test]
async fn test_cancelled_run_makes_no_calls() {
    let backend = Arc::new(ScriptedBackend::with_texts([CONSTRAINTS, PLAN, SCHEDULE]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let run = orchestrator(backend.clone(), Arc::new(LocalCalendar::new()))
        .run_with_cancel(&profile(), true, cancel)
        .await
        .unwrap();

    let failure = run.failure().unwrap();
    assert_eq!(failure.stage, StageName::MedicalSafety);
    assert_eq!(
        failure.error,
        StageError::Cancelled {
            reason: CancelReason::Requested
        }
    );
    assert_eq!(backend.calls(), 0);
}

#[test]
fn test_orchestrator_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Orchestrator>();
}

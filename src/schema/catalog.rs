//! Schemas for the pipeline input and every model-backed stage.

use std::sync::OnceLock;

use super::{Field, Kind, Schema};
use crate::domain::plan::{Level, PlanType, Verdict};
use crate::domain::state::StageName;

/// Longest single session we accept, in minutes
const MAX_SESSION_MINUTES: i64 = 240;

/// Schema for the caller-supplied user profile
pub fn user_profile() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new(
            "UserProfile",
            vec![
                Field::new("medical_history", Kind::list(Kind::non_empty_text())),
                Field::new("short_term_goals", Kind::list(Kind::non_empty_text())),
                Field::new("long_term_goals", Kind::list(Kind::non_empty_text())),
                Field::new(
                    "availability",
                    Kind::list(Kind::Object(vec![
                        Field::new("date", Kind::Date).optional(),
                        Field::new("day", Kind::Weekday).optional(),
                        Field::new("start_time", Kind::Time),
                        Field::new("end_time", Kind::Time),
                    ])),
                ),
            ],
        )
    })
}

/// Schema for the Medical Safety stage output
pub fn medical_safety() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new(
            "MedicalSafetyOutput",
            vec![
                Field::new("risk_level", Kind::OneOf(Level::NAMES))
                    .describe("Overall exercise risk given the medical history"),
                Field::new(
                    "contraindicated_exercises",
                    Kind::list(Kind::Object(vec![
                        Field::new("category", Kind::non_empty_text())
                            .describe("Exercise category to avoid, e.g. plyometrics"),
                        Field::new("rationale", Kind::non_empty_text()),
                    ])),
                ),
                Field::new("recommended_focus_areas", Kind::list(Kind::non_empty_text())),
                Field::new("warnings", Kind::list(Kind::non_empty_text()))
                    .describe("Required when risk_level is high"),
            ],
        )
    })
}

/// Schema for the Workout Planning stage output
pub fn workout_plan() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new(
            "WorkoutPlanOutput",
            vec![
                Field::new("plan_type", Kind::OneOf(PlanType::NAMES)),
                Field::new("weekly_sessions", Kind::integer(1, 14)),
                Field::new(
                    "session_templates",
                    Kind::list(Kind::Object(vec![
                        Field::new("name", Kind::non_empty_text()),
                        Field::new("duration_minutes", Kind::integer(1, MAX_SESSION_MINUTES)),
                        Field::new("exercise_categories", Kind::list(Kind::non_empty_text()))
                            .describe("Must not contain any contraindicated category"),
                        Field::new("intensity", Kind::OneOf(Level::NAMES)),
                    ])),
                ),
            ],
        )
    })
}

/// Schema for the Scheduling stage output
pub fn schedule() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new(
            "SchedulingOutput",
            vec![Field::new(
                "scheduled_sessions",
                Kind::list(Kind::Object(vec![
                    Field::new("date", Kind::Date),
                    Field::new("start_time", Kind::Time),
                    Field::new("duration_minutes", Kind::integer(1, MAX_SESSION_MINUTES)),
                    Field::new("session_name", Kind::non_empty_text())
                        .describe("Name of a session template from the workout plan"),
                ])),
            )],
        )
    })
}

/// Schema for the Evaluation stage output
pub fn evaluation() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let score = || Kind::integer(1, 5);
        Schema::new(
            "EvaluationOutput",
            vec![
                Field::new(
                    "scores",
                    Kind::Object(vec![
                        Field::new("safety", score()),
                        Field::new("goal_alignment", score()),
                        Field::new("realism", score()),
                        Field::new("schedule_fit", score()),
                        Field::new("clarity", score()),
                    ]),
                ),
                Field::new("issues", Kind::list(Kind::non_empty_text())),
                Field::new("verdict", Kind::OneOf(Verdict::NAMES)),
            ],
        )
    })
}

/// Output schema for a stage; `None` for the tool-backed calendar stage
pub fn for_stage(stage: StageName) -> Option<&'static Schema> {
    match stage {
        StageName::MedicalSafety => Some(medical_safety()),
        StageName::WorkoutPlanning => Some(workout_plan()),
        StageName::Scheduling => Some(schedule()),
        StageName::Evaluation => Some(evaluation()),
        StageName::CalendarIntegration => None,
    }
}

//! Typed outputs of the model-backed stages.
//!
//! Each type mirrors the schema the stage validates against in
//! `schema::catalog`; unknown fields are rejected on both sides.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::clock::{hhmm, Slot};

/// Coarse risk classification shared by medical assessment and session intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    pub const NAMES: &'static [&'static str] = &["low", "medium", "high"];
}

/// Output of the Medical Safety stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MedicalConstraints {
    pub risk_level: Level,

    /// Exercise categories the plan must not contain
    pub contraindicated_exercises: Vec<Contraindication>,

    pub recommended_focus_areas: Vec<String>,

    pub warnings: Vec<String>,
}

/// A restricted exercise category and why it is restricted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contraindication {
    pub category: String,
    pub rationale: String,
}

impl MedicalConstraints {
    /// Check whether an exercise category is restricted
    pub fn restricts(&self, category: &str) -> bool {
        let wanted = normalize_category(category);
        self.contraindicated_exercises
            .iter()
            .any(|c| normalize_category(&c.category) == wanted)
    }
}

/// Canonical form used to compare exercise categories across stages.
///
/// `"High-Impact  Knee_Load"` and `"high impact knee load"` compare equal.
pub fn normalize_category(category: &str) -> String {
    category
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Kind of training programme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Strength,
    Cardio,
    Hybrid,
    Rehab,
}

impl PlanType {
    pub const NAMES: &'static [&'static str] = &["strength", "cardio", "hybrid", "rehab"];
}

/// Output of the Workout Planning stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkoutPlan {
    pub plan_type: PlanType,
    pub weekly_sessions: u32,
    pub session_templates: Vec<SessionTemplate>,
}

impl WorkoutPlan {
    /// Look up a template by name
    pub fn template(&self, name: &str) -> Option<&SessionTemplate> {
        self.session_templates.iter().find(|t| t.name == name)
    }
}

/// One reusable session shape within a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionTemplate {
    pub name: String,
    pub duration_minutes: u32,
    pub exercise_categories: Vec<String>,
    pub intensity: Level,
}

/// Output of the Scheduling stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schedule {
    pub scheduled_sessions: Vec<ScheduledSession>,
}

/// A plan session pinned to a concrete time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduledSession {
    pub date: NaiveDate,

    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,

    pub duration_minutes: u32,

    /// Name of the `SessionTemplate` this session instantiates
    pub session_name: String,
}

impl ScheduledSession {
    /// Time slot occupied by this session, if it fits within the day
    pub fn slot(&self) -> Option<Slot> {
        Slot::starting_at(self.date, self.start_time, self.duration_minutes)
    }
}

/// Output of the optional Evaluation stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Evaluation {
    pub scores: EvaluationScores,
    pub issues: Vec<String>,
    pub verdict: Verdict,
}

/// Per-dimension scores, 1 (worst) to 5 (best)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationScores {
    pub safety: u8,
    pub goal_alignment: u8,
    pub realism: u8,
    pub schedule_fit: u8,
    pub clarity: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Review,
    Fail,
}

impl Verdict {
    pub const NAMES: &'static [&'static str] = &["pass", "review", "fail"];
}

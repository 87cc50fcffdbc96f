//! User profile: the caller-supplied input to a pipeline run.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::clock::{hhmm, Day, Slot};

/// Medical history, goals and availability for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserProfile {
    /// Free-text medical history entries (conditions, injuries, surgeries)
    pub medical_history: Vec<String>,

    pub short_term_goals: Vec<String>,

    pub long_term_goals: Vec<String>,

    /// Windows in which sessions may be scheduled
    pub availability: Vec<AvailabilityWindow>,
}

/// A time window the user can train in.
///
/// Either pinned to a calendar `date` or recurring on a weekly `day`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AvailabilityWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<Day>,

    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,

    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

impl AvailabilityWindow {
    /// Window on a specific date
    pub fn on_date(date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            date: Some(date),
            day: None,
            start_time,
            end_time,
        }
    }

    /// Window recurring every week on `day`
    pub fn weekly(day: Day, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            date: None,
            day: Some(day),
            start_time,
            end_time,
        }
    }

    /// Whether this window applies on the given date
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        match (self.date, self.day) {
            (Some(d), _) => d == date,
            (None, Some(day)) => Day::of(date) == day,
            (None, None) => false,
        }
    }

    /// Whether a slot lies entirely inside this window
    pub fn contains(&self, slot: &Slot) -> bool {
        self.applies_on(slot.date) && self.start_time <= slot.start && slot.end <= self.end_time
    }
}

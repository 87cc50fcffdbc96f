//! Records produced by the Calendar Integration stage.

use serde::{Deserialize, Serialize};

/// What a calendar tool returns for one created event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedEvent {
    /// Provider-assigned identifier
    pub event_id: String,

    /// Payload sent to the provider
    pub payload: serde_json::Value,
}

/// A calendar event created for one scheduled session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEventRecord {
    /// Index of the session in `schedule.scheduled_sessions`
    pub session_index: usize,
    pub session_name: String,
    pub event_id: String,
    pub payload: serde_json::Value,
}

/// A session whose event could not be created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarFailure {
    pub session_index: usize,
    pub session_name: String,
    pub error: String,
}

/// Outcome for one scheduled session; one entry per session, in schedule order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum CalendarEntry {
    Created(CalendarEventRecord),
    Failed(CalendarFailure),
}

impl CalendarEntry {
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Created(record) => Some(&record.event_id),
            Self::Failed(_) => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

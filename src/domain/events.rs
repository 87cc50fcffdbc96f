//! Run events.
//!
//! Every state change of a run is recorded as an immutable event in an
//! in-memory, append-only log that travels with the run record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::StageName;

/// A single event in a run's log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Stage the event concerns (if any)
    pub stage: Option<StageName>,

    /// Type of event
    pub event_type: EventType,

    /// Human-readable summary (NO medical data, NO prompt bodies)
    pub summary: String,

    /// Attempt number within the stage's retry loop
    pub attempt: Option<u32>,

    /// Time taken in milliseconds
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        stage: Option<StageName>,
        event_type: EventType,
        summary: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            stage,
            event_type,
            summary,
            attempt: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Types of events that can occur during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new run has started
    RunStarted,

    /// A stage was entered
    StageStarted,

    /// A model response failed validation and will be retried (or exhausted)
    AttemptRejected,

    /// A stage merged its output into the state
    StageCompleted,

    /// A stage failed; the run halts
    StageFailed,

    /// A stage was bypassed by the consent branch
    StageSkipped,

    /// One calendar event was created
    CalendarEventCreated,

    /// One calendar event could not be created
    CalendarEventFailed,

    /// The run reached `Done`
    RunCompleted,

    /// The run reached `Failed`
    RunFailed,
}

/// Append-only event log for one run
#[derive(Debug, Clone)]
pub struct EventLog {
    run_id: Uuid,
    events: Vec<Event>,
}

impl EventLog {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            events: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Start building an event for this run
    pub fn event(&self, stage: Option<StageName>, event_type: EventType, summary: String) -> Event {
        Event::new(self.run_id, stage, event_type, summary)
    }

    pub fn append(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Count events of one type
    pub fn count(&self, event_type: EventType) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Render the log as newline-delimited JSON
    pub fn to_jsonl(&self) -> serde_json::Result<String> {
        to_jsonl(&self.events)
    }
}

/// One JSON object per line, in order
pub fn to_jsonl(events: &[Event]) -> serde_json::Result<String> {
    let mut out = String::new();
    for event in events {
        out.push_str(&serde_json::to_string(event)?);
        out.push('\n');
    }
    Ok(out)
}

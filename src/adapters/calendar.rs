//! Local calendar stub.
//!
//! Stands in for a real calendar provider: derives a deterministic event id
//! from the session's slot and keeps every created event in memory.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use super::{CalendarTool, ToolError};
use crate::domain::calendar::CreatedEvent;
use crate::domain::plan::ScheduledSession;

/// In-memory calendar provider
#[derive(Debug, Default)]
pub struct LocalCalendar {
    created: Mutex<Vec<CreatedEvent>>,
}

impl LocalCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events created so far, in creation order
    pub fn created(&self) -> Vec<CreatedEvent> {
        self.created
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CalendarTool for LocalCalendar {
    fn name(&self) -> &str {
        "local"
    }

    async fn create_event(&self, session: &ScheduledSession) -> Result<CreatedEvent, ToolError> {
        if session.duration_minutes == 0 {
            return Err(ToolError::new(
                "duration_minutes is required to create a calendar event",
            ));
        }

        let event = CreatedEvent {
            event_id: format!(
                "evt_{}_{}",
                session.date.format("%Y-%m-%d"),
                session.start_time.format("%H%M")
            ),
            payload: json!({
                "title": session.session_name,
                "date": session.date.format("%Y-%m-%d").to_string(),
                "start_time": session.start_time.format("%H:%M").to_string(),
                "duration_minutes": session.duration_minutes,
            }),
        };

        self.created
            .lock()
            .map_err(|_| ToolError::new("calendar store poisoned"))?
            .push(event.clone());

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::{parse_clock, parse_date};

    fn session(duration_minutes: u32) -> ScheduledSession {
        ScheduledSession {
            date: parse_date("2026-02-11").unwrap(),
            start_time: parse_clock("18:00").unwrap(),
            duration_minutes,
            session_name: "Upper body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_event_id_and_payload() {
        let calendar = LocalCalendar::new();
        let event = calendar.create_event(&session(45)).await.unwrap();

        assert_eq!(event.event_id, "evt_2026-02-11_1800");
        assert_eq!(event.payload["title"], "Upper body");
        assert_eq!(event.payload["duration_minutes"], 45);
        assert_eq!(calendar.created().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_duration_rejected() {
        let calendar = LocalCalendar::new();
        assert!(calendar.create_event(&session(0)).await.is_err());
        assert!(calendar.created().is_empty());
    }
}

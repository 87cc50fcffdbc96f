//! Calendar and wall-clock primitives shared by the profile and stage outputs.
//!
//! Models speak `YYYY-MM-DD` dates and `HH:MM` times, which chrono's default
//! serde formats don't accept, so the helpers here own the wire format.

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Regex handed to the model for clock times; `parse_clock` accepts exactly this
pub const CLOCK_PATTERN: &str = "^([01][0-9]|2[0-3]):[0-5][0-9]$";

/// Parse a zero-padded 24-hour `HH:MM` clock time
pub fn parse_clock(value: &str) -> Option<NaiveTime> {
    // chrono alone would also take "7:30"
    if value.len() != 5 || value.as_bytes()[2] != b':' {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Serde adapter for `HH:MM` times
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_clock(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid clock time '{}', expected HH:MM", raw)))
    }
}

/// Day of the week for recurring availability windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Day {
    /// Wire names, Monday first
    pub const NAMES: &'static [&'static str] = &["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

    /// Day the given date falls on
    pub fn of(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Mon => Self::Mon,
            Weekday::Tue => Self::Tue,
            Weekday::Wed => Self::Wed,
            Weekday::Thu => Self::Thu,
            Weekday::Fri => Self::Fri,
            Weekday::Sat => Self::Sat,
            Weekday::Sun => Self::Sun,
        }
    }
}

/// Half-open minute interval `[start, end)` within one day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Slot {
    /// Build a slot from a start time and a duration.
    ///
    /// Returns `None` when the session would run past midnight.
    pub fn starting_at(date: NaiveDate, start: NaiveTime, duration_minutes: u32) -> Option<Self> {
        let (end, wrapped) =
            start.overflowing_add_signed(chrono::Duration::minutes(i64::from(duration_minutes)));
        if wrapped != 0 || (duration_minutes > 0 && end <= start) {
            return None;
        }
        Some(Self { date, start, end })
    }

    /// Check whether two slots share any minute
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.date == other.date && self.start < other.end && other.start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clock_formats() {
        assert_eq!(parse_clock("18:00"), NaiveTime::from_hms_opt(18, 0, 0));
        assert_eq!(parse_clock("07:30"), NaiveTime::from_hms_opt(7, 30, 0));
        assert_eq!(parse_clock("23:59"), NaiveTime::from_hms_opt(23, 59, 0));
        assert!(parse_clock("07:30:00").is_none());
        assert!(parse_clock("7:30").is_none());
        assert!(parse_clock("24:00").is_none());
        assert!(parse_clock("25:00").is_none());
        assert!(parse_clock("6pm").is_none());
    }

    #[test]
    fn test_day_of_date() {
        // 2026-02-09 is a Monday
        let monday = parse_date("2026-02-09").unwrap();
        assert_eq!(Day::of(monday), Day::Mon);
        assert_eq!(Day::of(monday.succ_opt().unwrap().succ_opt().unwrap()), Day::Wed);
    }

    #[test]
    fn test_slot_overlap() {
        let date = parse_date("2026-02-10").unwrap();
        let a = Slot::starting_at(date, parse_clock("18:00").unwrap(), 60).unwrap();
        let b = Slot::starting_at(date, parse_clock("18:30").unwrap(), 30).unwrap();
        let c = Slot::starting_at(date, parse_clock("19:00").unwrap(), 30).unwrap();

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // back-to-back is fine
    }

    #[test]
    fn test_slot_past_midnight() {
        let date = parse_date("2026-02-10").unwrap();
        assert!(Slot::starting_at(date, parse_clock("23:30").unwrap(), 60).is_none());
    }
}

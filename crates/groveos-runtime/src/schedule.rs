//! Wall-clock irrigation schedule.
//!
//! Entries fire at most once per calendar day: the last-triggered tag is a
//! date, not an interval, so ticking every second within the matching
//! minute fires once, and a new day always re-arms. Stamps live in memory
//! only; they reset on process restart.

use chrono::{DateTime, Local, NaiveDate};
use tracing::warn;

/// One schedule entry: local time of day and pump run duration.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    /// `"HH:MM"`, 24-hour local time.
    pub at: String,
    pub duration_secs: u64,
    last_triggered: Option<NaiveDate>,
}

impl ScheduleEntry {
    pub fn new(at: impl Into<String>, duration_secs: u64) -> Self {
        Self {
            at: at.into(),
            duration_secs,
            last_triggered: None,
        }
    }
}

/// The set of configured irrigation entries.
#[derive(Debug, Clone, Default)]
pub struct IrrigationSchedule {
    entries: Vec<ScheduleEntry>,
}

impl IrrigationSchedule {
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the durations of every entry due at `now`, stamping today
    /// against each so it cannot fire again until tomorrow.
    pub fn due(&mut self, now: DateTime<Local>) -> Vec<u64> {
        let minute = now.format("%H:%M").to_string();
        let today = now.date_naive();
        let mut due = Vec::new();
        for entry in &mut self.entries {
            if entry.at != minute {
                continue;
            }
            if entry.last_triggered == Some(today) {
                continue;
            }
            if entry.duration_secs == 0 {
                warn!(at = %entry.at, "skipping zero-duration irrigation entry");
                entry.last_triggered = Some(today);
                continue;
            }
            entry.last_triggered = Some(today);
            due.push(entry.duration_secs);
        }
        due
    }
}

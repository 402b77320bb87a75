//! Per-user session state and day-boundary helpers.
//!
//! `SessionState` is the durable "what is this user doing right now and
//! since when" record. It is transient bookkeeping: the work log ledger is
//! the sole source of truth for history, so every transition that closes an
//! interval derives a `WorkLogEntry` from the state being replaced.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::WorkLogEntry;

/// Sentinel task name for break intervals.
pub const BREAK_TASK: &str = "break";

/// Memo marker written on entries closed by the system at end of day.
pub const AUTO_CHECKOUT_MEMO: &str = "auto checkout at end of day";

/// A task name plus its optional goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub task: String,
    #[serde(default)]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub goal_title: Option<String>,
}

impl TaskRef {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            goal_id: None,
            goal_title: None,
        }
    }

    pub fn with_goal(
        task: impl Into<String>,
        goal_id: impl Into<String>,
        goal_title: impl Into<String>,
    ) -> Self {
        Self {
            task: task.into(),
            goal_id: Some(goal_id.into()),
            goal_title: Some(goal_title.into()),
        }
    }

    /// Free-form task outside the configured task list.
    pub fn other(detail: &str) -> Self {
        Self::new(format!("other: {detail}"))
    }

    pub fn breaking() -> Self {
        Self::new(BREAK_TASK)
    }

    pub fn is_break(&self) -> bool {
        self.task == BREAK_TASK
    }
}

/// The authoritative per-user session record.
///
/// Invariant: `is_working` holds exactly when `current_task` and
/// `start_time` are both set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub user_id: String,
    pub user_name: String,
    pub is_working: bool,
    pub current_task: Option<String>,
    pub current_goal_id: Option<String>,
    pub current_goal_title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    /// Snapshot of the task that was running when a break began.
    pub pre_break_task: Option<TaskRef>,
    /// Set when a session was closed by the system without user confirmation.
    pub needs_checkout_correction: bool,
}

impl SessionState {
    /// Not-working defaults for a freshly seen user.
    pub fn idle(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            is_working: false,
            current_task: None,
            current_goal_id: None,
            current_goal_title: None,
            start_time: None,
            pre_break_task: None,
            needs_checkout_correction: false,
        }
    }

    /// The currently running task, if any.
    pub fn current(&self) -> Option<TaskRef> {
        self.current_task.as_ref().map(|task| TaskRef {
            task: task.clone(),
            goal_id: self.current_goal_id.clone(),
            goal_title: self.current_goal_title.clone(),
        })
    }

    pub fn on_break(&self) -> bool {
        self.is_working && self.current_task.as_deref() == Some(BREAK_TASK)
    }

    /// Begin a new interval on `task` at `now`.
    pub fn begin(&mut self, task: &TaskRef, now: DateTime<Utc>) {
        self.is_working = true;
        self.current_task = Some(task.task.clone());
        self.current_goal_id = task.goal_id.clone();
        self.current_goal_title = task.goal_title.clone();
        self.start_time = Some(now);
    }

    /// Reset to idle. Leaves `needs_checkout_correction` untouched.
    pub fn clear(&mut self) {
        self.is_working = false;
        self.current_task = None;
        self.current_goal_id = None;
        self.current_goal_title = None;
        self.start_time = None;
        self.pre_break_task = None;
    }

    /// Derive the ledger entry that closes the current interval at `end`.
    ///
    /// Returns `None` when there is nothing to log: not working, missing
    /// `start_time` (the transition still proceeds -- a logging gap never
    /// blocks a state change), or a non-positive duration.
    pub fn close_entry(&self, end: DateTime<Utc>, memo: &str) -> Option<WorkLogEntry> {
        if !self.is_working {
            return None;
        }
        let task = self.current_task.clone()?;
        let start = self.start_time?;
        let duration_secs = (end - start).num_seconds();
        if duration_secs <= 0 {
            return None;
        }
        Some(WorkLogEntry {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            task,
            goal_id: self.current_goal_id.clone(),
            goal_title: self.current_goal_title.clone(),
            date: start.date_naive(),
            start_time: start,
            end_time: end,
            duration_secs,
            memo: memo.to_string(),
        })
    }
}

/// Last instant of the calendar day `start` falls on (23:59:59.999 UTC).
///
/// Forced stops use this as the synthetic end time so an entry's `date` and
/// `duration` never span midnight.
pub fn end_of_start_day(start: DateTime<Utc>) -> DateTime<Utc> {
    last_instant_of(start.date_naive())
}

fn last_instant_of(date: NaiveDate) -> DateTime<Utc> {
    let t = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    date.and_time(t).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 24, h, m, s).unwrap()
    }

    #[test]
    fn close_entry_computes_duration_and_date() {
        let mut s = SessionState::idle("u1", "Alice");
        s.begin(&TaskRef::new("support"), at(10, 0, 0));
        let entry = s.close_entry(at(10, 30, 0), "").unwrap();
        assert_eq!(entry.task, "support");
        assert_eq!(entry.duration_secs, 1800);
        assert_eq!(entry.date, at(10, 0, 0).date_naive());
    }

    #[test]
    fn close_entry_skips_zero_and_negative_durations() {
        let mut s = SessionState::idle("u1", "Alice");
        s.begin(&TaskRef::new("support"), at(10, 0, 0));
        assert!(s.close_entry(at(10, 0, 0), "").is_none());
        assert!(s.close_entry(at(9, 59, 0), "").is_none());
    }

    #[test]
    fn close_entry_skips_when_start_time_missing() {
        let mut s = SessionState::idle("u1", "Alice");
        s.is_working = true;
        s.current_task = Some("support".to_string());
        assert!(s.close_entry(at(10, 0, 0), "").is_none());
    }

    #[test]
    fn end_of_start_day_is_last_millisecond() {
        let eod = end_of_start_day(at(23, 50, 0));
        assert_eq!(eod.date_naive(), at(23, 50, 0).date_naive());
        assert_eq!(eod.format("%H:%M:%S%.3f").to_string(), "23:59:59.999");
    }

    #[test]
    fn other_task_uses_prefix() {
        assert_eq!(TaskRef::other("errand").task, "other: errand");
    }

    #[test]
    fn on_break_requires_sentinel() {
        let mut s = SessionState::idle("u1", "Alice");
        s.begin(&TaskRef::breaking(), at(12, 0, 0));
        assert!(s.on_break());
        s.begin(&TaskRef::new("support"), at(12, 10, 0));
        assert!(!s.on_break());
    }
}

//! Interactive session state machine.
//!
//! The controller is wall-clock based and owns no threads: the host calls
//! `tick()` periodically for the display heartbeat and the midnight
//! deadline check. Every transition is a single transactional
//! read-modify-write against the store, so the controller stays correct
//! when the reservation executor mutates the same session from outside.
//!
//! ## State transitions
//!
//! ```text
//! Idle -> Working(task) -> OnBreak(saved) -> Working(saved) -> Idle
//! ```
//!
//! Constructed per user session; local bookkeeping (deadline, mirror of the
//! last committed state) is reset on every transition and on load.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::state::{end_of_start_day, SessionState, TaskRef, AUTO_CHECKOUT_MEMO};
use crate::error::{Result, SessionError};
use crate::events::Event;
use crate::store::Database;
use crate::watch::{SessionCallback, Subscribers, SubscriptionId};

/// Outcome of reload reconciliation.
#[derive(Debug, Clone)]
pub enum Restore {
    /// No session was running.
    Idle,
    /// Same-day session restored; the local timer resumes from `started`.
    Working {
        task: TaskRef,
        started: DateTime<Utc>,
        until_deadline: Duration,
    },
    /// A stale session (started on an earlier day) was force-closed at the
    /// end of its start day. The user owes a one-time confirmation.
    AutoClosed {
        task: String,
        end_time: DateTime<Utc>,
    },
}

enum ResumeOutcome {
    Resumed(SessionState, TaskRef),
    StoppedFallback(SessionState),
    NotOnBreak(Option<String>),
}

/// Client-resident state machine for one user's session.
pub struct SessionController {
    db: Database,
    user_id: String,
    user_name: String,
    /// Mirror of the last committed state. Updated only after a successful
    /// commit -- a failed store write never moves the local view.
    state: SessionState,
    /// End-of-day deadline for the running task.
    deadline: Option<DateTime<Utc>>,
    subscribers: Subscribers,
}

impl SessionController {
    /// Attach a controller to a user's session, creating idle defaults on
    /// first login. Call `restore_on_load` afterwards to reconcile.
    pub fn attach(
        db: Database,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Result<Self> {
        let user_id = user_id.into();
        let user_name = user_name.into();
        let state = db.immediate_retry(|db| db.ensure_session(&user_id, &user_name))?;
        Ok(Self {
            db,
            user_id,
            user_name,
            state,
            deadline: None,
            subscribers: Subscribers::default(),
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Elapsed time of the running interval for display purposes.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.state.is_working {
            return None;
        }
        self.state.start_time.map(|start| now - start)
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Register an observer for committed transitions.
    pub fn subscribe(&mut self, callback: SessionCallback) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    /// Remove an observer; call on view teardown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start_task(&mut self, task: TaskRef) -> Result<Option<Event>> {
        self.start_task_at(task, Utc::now())
    }

    /// Switch to `task`, closing the current interval first.
    ///
    /// Starting the task that is already running (same goal included) is a
    /// no-op. Switching into break snapshots the closed task; switching
    /// between two non-break tasks drops any stale snapshot.
    pub fn start_task_at(&mut self, task: TaskRef, now: DateTime<Utc>) -> Result<Option<Event>> {
        let (user_id, user_name) = (self.user_id.clone(), self.user_name.clone());
        let committed = self.db.immediate_retry(|db| {
            let mut s = db.ensure_session(&user_id, &user_name)?;
            if s.is_working && s.current().as_ref() == Some(&task) {
                return Ok(None);
            }
            if let Some(entry) = s.close_entry(now, "") {
                db.append_work_log(&entry)?;
            }
            if task.is_break() {
                if !s.on_break() {
                    s.pre_break_task = s.current();
                }
            } else {
                s.pre_break_task = None;
            }
            s.begin(&task, now);
            db.write_session(&s)?;
            db.rearm_reservations_on(&user_id, now.date_naive())?;
            Ok(Some(s))
        })?;

        let Some(state) = committed else {
            return Ok(None);
        };
        let event = if task.is_break() {
            Event::BreakStarted {
                saved: state.pre_break_task.clone(),
                at: now,
            }
        } else {
            Event::TaskStarted {
                task: task.task,
                goal_id: task.goal_id,
                goal_title: task.goal_title,
                at: now,
            }
        };
        self.commit(state, Some(end_of_start_day(now)), &event);
        Ok(Some(event))
    }

    pub fn start_break(&mut self) -> Result<Option<Event>> {
        self.start_break_at(Utc::now())
    }

    /// Enter break, snapshotting the current task. Entering break while
    /// already on break is a no-op.
    pub fn start_break_at(&mut self, now: DateTime<Utc>) -> Result<Option<Event>> {
        self.start_task_at(TaskRef::breaking(), now)
    }

    pub fn resume_from_break(&mut self) -> Result<Option<Event>> {
        self.resume_from_break_at(Utc::now())
    }

    /// Close the break interval and restart the snapshotted task.
    ///
    /// Only valid while on break. A missing snapshot (corrupted state)
    /// degrades to a plain stop.
    pub fn resume_from_break_at(&mut self, now: DateTime<Utc>) -> Result<Option<Event>> {
        let (user_id, user_name) = (self.user_id.clone(), self.user_name.clone());
        let outcome = self.db.immediate_retry(|db| {
            let mut s = db.ensure_session(&user_id, &user_name)?;
            if !s.on_break() {
                return Ok(ResumeOutcome::NotOnBreak(s.current_task.clone()));
            }
            if let Some(entry) = s.close_entry(now, "") {
                db.append_work_log(&entry)?;
            }
            let outcome = match s.pre_break_task.take() {
                Some(saved) => {
                    s.begin(&saved, now);
                    ResumeOutcome::Resumed(s.clone(), saved)
                }
                None => {
                    s.clear();
                    ResumeOutcome::StoppedFallback(s.clone())
                }
            };
            db.write_session(&s)?;
            db.rearm_reservations_on(&user_id, now.date_naive())?;
            Ok(outcome)
        })?;

        match outcome {
            ResumeOutcome::NotOnBreak(current) => {
                Err(SessionError::NotOnBreak { current }.into())
            }
            ResumeOutcome::Resumed(state, saved) => {
                let event = Event::BreakEnded {
                    resumed: saved,
                    at: now,
                };
                self.commit(state, Some(end_of_start_day(now)), &event);
                Ok(Some(event))
            }
            ResumeOutcome::StoppedFallback(state) => {
                let event = Event::WorkStopped { at: now };
                self.commit(state, None, &event);
                Ok(Some(event))
            }
        }
    }

    pub fn stop_work(&mut self) -> Result<Option<Event>> {
        self.stop_work_at(Utc::now())
    }

    /// Close the current interval and reset to idle.
    pub fn stop_work_at(&mut self, now: DateTime<Utc>) -> Result<Option<Event>> {
        if !self.state.is_working {
            self.deadline = None;
            return Ok(None);
        }
        let (user_id, user_name) = (self.user_id.clone(), self.user_name.clone());
        let state = self.db.immediate_retry(|db| {
            let mut s = db.ensure_session(&user_id, &user_name)?;
            if let Some(entry) = s.close_entry(now, "") {
                db.append_work_log(&entry)?;
            }
            s.clear();
            db.write_session(&s)?;
            db.rearm_reservations_on(&user_id, now.date_naive())?;
            Ok(s)
        })?;
        let event = Event::WorkStopped { at: now };
        self.commit(state, None, &event);
        Ok(Some(event))
    }

    pub fn tick(&mut self) -> Result<Option<Event>> {
        self.tick_at(Utc::now())
    }

    /// Heartbeat. Performs the forced end-of-day stop once `now` passes the
    /// deadline of the running task's start day.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Result<Option<Event>> {
        let Some(start) = self.state.start_time.filter(|_| self.state.is_working) else {
            return Ok(None);
        };
        let deadline = self.deadline.unwrap_or_else(|| end_of_start_day(start));
        if now <= deadline {
            return Ok(None);
        }
        self.force_close()
    }

    pub fn restore_on_load(&mut self) -> Result<Restore> {
        self.restore_on_load_at(Utc::now())
    }

    /// Reconcile local state from the store after a reload.
    ///
    /// A session whose start day is not today is force-closed at the end of
    /// its start day; otherwise the local timer and deadline are rebuilt
    /// from the stored start time.
    pub fn restore_on_load_at(&mut self, now: DateTime<Utc>) -> Result<Restore> {
        let (user_id, user_name) = (self.user_id.clone(), self.user_name.clone());
        let state = self.db.immediate_retry(|db| db.ensure_session(&user_id, &user_name))?;

        match (state.is_working, state.start_time) {
            (true, Some(start)) if start.date_naive() != now.date_naive() => {
                self.state = state;
                match self.force_close()? {
                    Some(Event::AutoClosed { task, end_time, .. }) => {
                        Ok(Restore::AutoClosed { task, end_time })
                    }
                    // The executor closed it between our read and the lock.
                    _ => Ok(Restore::Idle),
                }
            }
            (true, Some(start)) => {
                let task = state.current().unwrap_or_else(|| TaskRef::new(""));
                let deadline = end_of_start_day(start);
                self.state = state;
                self.deadline = Some(deadline);
                Ok(Restore::Working {
                    task,
                    started: start,
                    until_deadline: deadline - now,
                })
            }
            _ => {
                self.state = state;
                self.deadline = None;
                Ok(Restore::Idle)
            }
        }
    }

    /// Clear the auto-closure flag after the user confirmed the correction
    /// prompt.
    pub fn acknowledge_checkout_correction(&mut self) -> Result<()> {
        if !self.state.needs_checkout_correction {
            return Ok(());
        }
        let (user_id, user_name) = (self.user_id.clone(), self.user_name.clone());
        let state = self.db.immediate_retry(|db| {
            let mut s = db.ensure_session(&user_id, &user_name)?;
            s.needs_checkout_correction = false;
            db.write_session(&s)?;
            Ok(s)
        })?;
        self.state = state;
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// System-initiated closure at the end of the running task's start day.
    /// Re-checks under the write lock: the executor may have already closed
    /// the session, in which case this is a no-op.
    fn force_close(&mut self) -> Result<Option<Event>> {
        let (user_id, user_name) = (self.user_id.clone(), self.user_name.clone());
        let (state, closed) = self.db.immediate_retry(|db| {
            let mut s = db.ensure_session(&user_id, &user_name)?;
            let Some(start) = s.start_time.filter(|_| s.is_working) else {
                return Ok((s, None));
            };
            let end = end_of_start_day(start);
            let task = s.current_task.clone().unwrap_or_default();
            if let Some(entry) = s.close_entry(end, AUTO_CHECKOUT_MEMO) {
                db.append_work_log(&entry)?;
            }
            s.clear();
            s.needs_checkout_correction = true;
            db.write_session(&s)?;
            Ok((s, Some((task, end))))
        })?;

        let Some((task, end_time)) = closed else {
            self.state = state;
            self.deadline = None;
            return Ok(None);
        };
        info!(user_id = %self.user_id, %task, "session auto-closed at end of start day");
        let event = Event::AutoClosed {
            task,
            end_time,
            at: Utc::now(),
        };
        self.commit(state, None, &event);
        Ok(Some(event))
    }

    fn commit(&mut self, state: SessionState, deadline: Option<DateTime<Utc>>, event: &Event) {
        self.state = state;
        self.deadline = deadline;
        self.subscribers.notify(&self.state, event);
    }
}

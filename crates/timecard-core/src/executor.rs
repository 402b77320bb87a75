//! Scheduled reservation execution.
//!
//! Invoked on a fixed cadence by an external scheduler, independent of any
//! connected client. Each due reservation is applied in its own
//! `BEGIN IMMEDIATE` transaction that re-checks the idempotency marker,
//! mutates the session, appends the ledger entry and consumes the marker
//! together -- a crash cannot separate the state update from the marker.
//!
//! Execution is at-least-once across invocations; at-most-once per
//! occurrence rests on the marker re-check in step one of the transaction,
//! not on the best-effort skew sleep.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::session::{SessionState, TaskRef};
use crate::store::{Database, Reservation, ReservationAction};

/// How far past `now` the due scan looks, covering invocation jitter.
pub const DEFAULT_LOOKAHEAD_SECS: i64 = 60;

/// Candidates scheduled at most this far in the future participate in the
/// skew-compensation sleep.
pub const DEFAULT_SKEW_WAIT_CAP_SECS: i64 = 15;

/// Executes due break/stop reservations against the session store.
pub struct ReservationExecutor {
    db: Database,
    lookahead: Duration,
    skew_wait_cap: Duration,
}

/// Per-reservation outcome of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ItemOutcome {
    /// Session transitioned and the occurrence was consumed.
    Executed { action: ReservationAction },
    /// User was not working; the occurrence was consumed without a
    /// transition. A manual re-arm restores eligibility for today.
    SkippedIdle,
    /// The running session started after the occurrence instant, so the
    /// reservation predates everything it could act on. Consumed without a
    /// transition.
    SkippedStale,
    /// A concurrent run consumed the occurrence first.
    AlreadyConsumed,
    /// Transaction failed; the occurrence stays eligible for the next tick.
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub reservation_id: String,
    pub user_id: String,
    pub occurrence: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Summary of one executor invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub items: Vec<ItemReport>,
}

impl RunReport {
    pub fn executed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Executed { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Failed { .. }))
            .count()
    }
}

impl ReservationExecutor {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            lookahead: Duration::seconds(DEFAULT_LOOKAHEAD_SECS),
            skew_wait_cap: Duration::seconds(DEFAULT_SKEW_WAIT_CAP_SECS),
        }
    }

    pub fn with_lookahead(mut self, lookahead: Duration) -> Self {
        self.lookahead = lookahead;
        self
    }

    pub fn with_skew_wait_cap(mut self, cap: Duration) -> Self {
        self.skew_wait_cap = cap;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// One scheduler tick: scan, wait out near-future candidates once,
    /// execute. Safe under duplicate or overlapping invocations.
    pub async fn run_once(&self) -> Result<RunReport> {
        let now = Utc::now();
        let due = self.db.list_due_reservations(now + self.lookahead)?;
        if due.is_empty() {
            debug!("no due reservations");
            return Ok(RunReport::default());
        }
        if let Some(wait) = skew_wait(&due, now, self.skew_wait_cap) {
            debug!(wait_ms = wait.as_millis() as u64, "waiting for near-future reservations");
            tokio::time::sleep(wait).await;
        }
        Ok(self.execute_batch(due))
    }

    /// Execute a batch of due items, isolating failures per item.
    pub fn execute_batch(&self, due: Vec<(Reservation, DateTime<Utc>)>) -> RunReport {
        let mut report = RunReport::default();
        for (reservation, occurrence) in due {
            let outcome = match self.execute_one(&reservation, occurrence) {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(
                        reservation_id = %reservation.id,
                        user_id = %reservation.user_id,
                        error = %err,
                        "reservation execution failed; will retry on next tick"
                    );
                    ItemOutcome::Failed {
                        message: err.to_string(),
                    }
                }
            };
            if let ItemOutcome::Executed { action } = &outcome {
                info!(
                    reservation_id = %reservation.id,
                    user_id = %reservation.user_id,
                    action = action.as_str(),
                    %occurrence,
                    "reservation executed"
                );
            }
            report.items.push(ItemReport {
                reservation_id: reservation.id.clone(),
                user_id: reservation.user_id.clone(),
                occurrence,
                outcome,
            });
        }
        report
    }

    /// Convenience for tests and one-shot CLI runs with an explicit clock.
    pub fn collect_due(&self, now: DateTime<Utc>) -> Result<Vec<(Reservation, DateTime<Utc>)>> {
        Ok(self.db.list_due_reservations(now + self.lookahead)?)
    }

    fn execute_one(
        &self,
        reservation: &Reservation,
        occurrence: DateTime<Utc>,
    ) -> Result<ItemOutcome, StoreError> {
        let occurrence_date = occurrence.date_naive();
        self.db.immediate(|db| {
            // Re-read under the write lock: a concurrent run may have
            // consumed this occurrence already.
            let Some(current) = db.read_reservation(&reservation.id)? else {
                return Ok(ItemOutcome::AlreadyConsumed);
            };
            if current.last_executed_date == Some(occurrence_date) {
                return Ok(ItemOutcome::AlreadyConsumed);
            }

            let mut session = db.ensure_session(&reservation.user_id, &reservation.user_name)?;
            if !session.is_working {
                db.mark_reservation_executed(&reservation.id, occurrence_date)?;
                return Ok(ItemOutcome::SkippedIdle);
            }
            // An occurrence left over from before the session began (executor
            // was offline) must not fire retroactively: closing at that
            // instant would drop the open interval and rewind `start_time`
            // into a past day. The session postdates the plan; consume only.
            if session.start_time.is_some_and(|start| start > occurrence) {
                db.mark_reservation_executed(&reservation.id, occurrence_date)?;
                return Ok(ItemOutcome::SkippedStale);
            }

            match reservation.action {
                // Already on break: the transition is already in effect.
                ReservationAction::Break if session.on_break() => {}
                ReservationAction::Break => {
                    apply_break(db, &mut session, occurrence)?;
                }
                ReservationAction::Stop => {
                    apply_stop(db, &mut session, occurrence)?;
                }
            }
            db.mark_reservation_executed(&reservation.id, occurrence_date)?;
            Ok(ItemOutcome::Executed {
                action: reservation.action,
            })
        })
    }
}

/// Close the running interval at the reservation's nominal instant (not
/// wall clock, so durations align with the intended time) and enter break.
fn apply_break(
    db: &Database,
    session: &mut SessionState,
    occurrence: DateTime<Utc>,
) -> Result<(), rusqlite::Error> {
    if let Some(entry) = session.close_entry(occurrence, "") {
        db.append_work_log(&entry)?;
    }
    session.pre_break_task = session.current();
    session.begin(&TaskRef::breaking(), occurrence);
    db.write_session(session)
}

fn apply_stop(
    db: &Database,
    session: &mut SessionState,
    occurrence: DateTime<Utc>,
) -> Result<(), rusqlite::Error> {
    if let Some(entry) = session.close_entry(occurrence, "") {
        db.append_work_log(&entry)?;
    }
    session.clear();
    db.write_session(session)
}

/// Largest positive wait among candidates still slightly in the future.
/// Best-effort skew compensation, bounded by `cap`.
fn skew_wait(
    due: &[(Reservation, DateTime<Utc>)],
    now: DateTime<Utc>,
    cap: Duration,
) -> Option<std::time::Duration> {
    due.iter()
        .filter_map(|(_, occ)| {
            let wait = *occ - now;
            (wait > Duration::zero() && wait <= cap).then_some(wait)
        })
        .max()
        .and_then(|d| d.to_std().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, day, h, m, s).unwrap()
    }

    fn executor() -> ReservationExecutor {
        ReservationExecutor::new(Database::open_memory().unwrap())
    }

    fn working_session(db: &Database, task: &str, start: DateTime<Utc>) {
        let mut s = SessionState::idle("u1", "Alice");
        s.begin(&TaskRef::new(task), start);
        db.write_session(&s).unwrap();
    }

    #[test]
    fn due_break_closes_task_and_enters_break() {
        let ex = executor();
        working_session(ex.database(), "support", at(24, 10, 0, 0));
        ex.database()
            .upsert_reservation(&Reservation::break_at("u1", "Alice", at(24, 10, 30, 0)))
            .unwrap();

        let due = ex.collect_due(at(24, 10, 30, 0)).unwrap();
        assert_eq!(due.len(), 1);
        let report = ex.execute_batch(due);
        assert_eq!(report.executed_count(), 1);

        let entries = ex
            .database()
            .work_log_for_day("u1", at(24, 0, 0, 0).date_naive())
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].task, "support");
        assert_eq!(entries[0].duration_secs, 1800);
        assert_eq!(entries[0].end_time, at(24, 10, 30, 0));

        let session = ex.database().read_session("u1").unwrap().unwrap();
        assert!(session.on_break());
        assert_eq!(session.start_time, Some(at(24, 10, 30, 0)));
        assert_eq!(
            session.pre_break_task,
            Some(TaskRef::new("support"))
        );
    }

    #[test]
    fn second_run_on_same_occurrence_is_noop() {
        let ex = executor();
        working_session(ex.database(), "support", at(24, 10, 0, 0));
        ex.database()
            .upsert_reservation(&Reservation::break_at("u1", "Alice", at(24, 10, 30, 0)))
            .unwrap();

        let first = ex.execute_batch(ex.collect_due(at(24, 10, 30, 0)).unwrap());
        assert_eq!(first.executed_count(), 1);

        // Duplicate invocation: scan again immediately.
        let due = ex.collect_due(at(24, 10, 30, 30)).unwrap();
        assert!(due.is_empty());

        let entries = ex
            .database()
            .work_log_for_day("u1", at(24, 0, 0, 0).date_naive())
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn marker_recheck_catches_concurrent_consumption() {
        let ex = executor();
        working_session(ex.database(), "support", at(24, 10, 0, 0));
        let r = Reservation::break_at("u1", "Alice", at(24, 10, 30, 0));
        ex.database().upsert_reservation(&r).unwrap();

        let due = ex.collect_due(at(24, 10, 30, 0)).unwrap();
        // A concurrent run consumes the occurrence between scan and execute.
        ex.database()
            .mark_reservation_executed(&r.id, at(24, 0, 0, 0).date_naive())
            .unwrap();

        let report = ex.execute_batch(due);
        assert_eq!(report.executed_count(), 0);
        assert!(matches!(
            report.items[0].outcome,
            ItemOutcome::AlreadyConsumed
        ));
    }

    #[test]
    fn idle_user_consumes_without_transition() {
        let ex = executor();
        ex.database()
            .write_session(&SessionState::idle("u1", "Alice"))
            .unwrap();
        let r = Reservation::stop("u1", "Alice", at(24, 18, 0, 0));
        ex.database().upsert_reservation(&r).unwrap();

        let report = ex.execute_batch(ex.collect_due(at(24, 18, 0, 0)).unwrap());
        assert!(matches!(report.items[0].outcome, ItemOutcome::SkippedIdle));

        let stored = ex.database().read_reservation(&r.id).unwrap().unwrap();
        assert_eq!(stored.last_executed_date, Some(at(24, 0, 0, 0).date_naive()));
        let entries = ex
            .database()
            .work_log_for_day("u1", at(24, 0, 0, 0).date_naive())
            .unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn occurrence_older_than_session_consumes_without_transition() {
        let ex = executor();
        // Scheduled on the 23rd; the 24th's occurrence was never consumed
        // (no executor run that day). On the 25th the user is mid-task.
        let r = Reservation::break_at("u1", "Alice", at(23, 10, 30, 0));
        ex.database().upsert_reservation(&r).unwrap();
        working_session(ex.database(), "support", at(25, 8, 0, 0));

        let due = ex.collect_due(at(25, 8, 5, 0)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, at(24, 10, 30, 0));
        let report = ex.execute_batch(due);
        assert!(matches!(report.items[0].outcome, ItemOutcome::SkippedStale));

        // The running session is untouched and nothing was logged.
        let session = ex.database().read_session("u1").unwrap().unwrap();
        assert!(session.is_working);
        assert_eq!(session.current_task.as_deref(), Some("support"));
        assert_eq!(session.start_time, Some(at(25, 8, 0, 0)));
        assert!(session.pre_break_task.is_none());
        for day in [23, 24, 25] {
            assert!(ex
                .database()
                .work_log_for_day("u1", at(day, 0, 0, 0).date_naive())
                .unwrap()
                .is_empty());
        }

        // The stale occurrence is spent; today's own fires normally.
        let due = ex.collect_due(at(25, 10, 30, 0)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, at(25, 10, 30, 0));
        let report = ex.execute_batch(due);
        assert_eq!(report.executed_count(), 1);
        let entries = ex
            .database()
            .work_log_for_day("u1", at(25, 0, 0, 0).date_naive())
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].duration_secs, 9000);
    }

    #[test]
    fn stop_reservation_resets_session() {
        let ex = executor();
        working_session(ex.database(), "support", at(24, 9, 0, 0));
        ex.database()
            .upsert_reservation(&Reservation::stop("u1", "Alice", at(24, 18, 0, 0)))
            .unwrap();

        let report = ex.execute_batch(ex.collect_due(at(24, 18, 0, 30)).unwrap());
        assert_eq!(report.executed_count(), 1);

        let session = ex.database().read_session("u1").unwrap().unwrap();
        assert!(!session.is_working);
        let entries = ex
            .database()
            .work_log_for_day("u1", at(24, 0, 0, 0).date_naive())
            .unwrap();
        assert_eq!(entries[0].duration_secs, 9 * 3600);
        assert_eq!(entries[0].end_time, at(24, 18, 0, 0));
    }

    #[test]
    fn break_while_already_on_break_consumes_without_splitting() {
        let ex = executor();
        let mut s = SessionState::idle("u1", "Alice");
        s.begin(&TaskRef::breaking(), at(24, 10, 0, 0));
        s.pre_break_task = Some(TaskRef::new("support"));
        ex.database().write_session(&s).unwrap();
        let r = Reservation::break_at("u1", "Alice", at(24, 10, 30, 0));
        ex.database().upsert_reservation(&r).unwrap();

        let report = ex.execute_batch(ex.collect_due(at(24, 10, 30, 0)).unwrap());
        assert_eq!(report.executed_count(), 1);

        let session = ex.database().read_session("u1").unwrap().unwrap();
        assert_eq!(session.start_time, Some(at(24, 10, 0, 0)));
        assert_eq!(session.pre_break_task, Some(TaskRef::new("support")));
        assert!(ex
            .database()
            .work_log_for_day("u1", at(24, 0, 0, 0).date_naive())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn rearm_makes_consumed_occurrence_due_again() {
        let ex = executor();
        working_session(ex.database(), "support", at(24, 10, 0, 0));
        let r = Reservation::break_at("u1", "Alice", at(24, 10, 30, 0));
        ex.database().upsert_reservation(&r).unwrap();

        ex.execute_batch(ex.collect_due(at(24, 10, 30, 0)).unwrap());
        assert!(ex.collect_due(at(24, 11, 0, 0)).unwrap().is_empty());

        // Manual action re-arms today's marker under the new context.
        ex.database()
            .rearm_reservations_on("u1", at(24, 0, 0, 0).date_naive())
            .unwrap();
        let due = ex.collect_due(at(24, 11, 0, 0)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, at(24, 10, 30, 0));
    }

    #[test]
    fn skew_wait_takes_max_bounded_future_wait() {
        let now = at(24, 10, 29, 50);
        let due = vec![
            (Reservation::break_at("u1", "A", at(24, 10, 30, 0)), at(24, 10, 30, 0)),
            (Reservation::stop("u2", "B", at(24, 10, 29, 0)), at(24, 10, 29, 0)),
        ];
        let wait = skew_wait(&due, now, Duration::seconds(15)).unwrap();
        assert_eq!(wait, std::time::Duration::from_secs(10));

        // Beyond the cap nothing is waited for.
        let far = vec![(
            Reservation::stop("u3", "C", at(24, 10, 31, 0)),
            at(24, 10, 31, 0),
        )];
        assert!(skew_wait(&far, now, Duration::seconds(15)).is_none());
    }
}

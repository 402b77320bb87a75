//! Reservation storage.
//!
//! A reservation is a user-configured daily instant at which `break` or
//! `stop` is applied automatically. `scheduled_time` is fixed at creation;
//! each calendar day derives its own occurrence from its time of day, and
//! `last_executed_date` is the per-occurrence idempotency marker. Manual
//! session actions re-arm today's marker instead of deleting rows.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{parse_ts, Database};

/// What a reservation applies when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationAction {
    Break,
    Stop,
}

impl ReservationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationAction::Break => "break",
            ReservationAction::Stop => "stop",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "break" => Some(ReservationAction::Break),
            "stop" => Some(ReservationAction::Stop),
            _ => None,
        }
    }
}

/// A scheduled break/stop action for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub action: ReservationAction,
    /// First occurrence; daily-recurring thereafter. Never rewritten by
    /// execution or re-arming.
    pub scheduled_time: DateTime<Utc>,
    /// Idempotency marker: the occurrence date most recently consumed.
    pub last_executed_date: Option<NaiveDate>,
}

impl Reservation {
    /// A user's single stop reservation. The fixed id makes an upsert
    /// replace any previous one.
    pub fn stop(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            id: format!("stop:{user_id}"),
            user_id,
            user_name: user_name.into(),
            action: ReservationAction::Stop,
            scheduled_time,
            last_executed_date: None,
        }
    }

    /// A break reservation. The id is keyed by time of day so several may
    /// coexist per user.
    pub fn break_at(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            id: format!("break:{user_id}:{}", scheduled_time.format("%H%M")),
            user_id,
            user_name: user_name.into(),
            action: ReservationAction::Break,
            scheduled_time,
            last_executed_date: None,
        }
    }

    /// The occurrence instant on the given calendar day.
    pub fn occurrence_on(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_time(self.scheduled_time.time()).and_utc()
    }

    /// The unconsumed occurrence at or before `before`, if any.
    ///
    /// Checks yesterday's occurrence first to cover the window where
    /// `before` has crossed midnight ahead of a late-evening reservation.
    /// Occurrences earlier than `scheduled_time` itself never fire.
    pub fn due_occurrence(&self, before: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = before.date_naive();
        let candidates = [today.pred_opt()?, today];
        for date in candidates {
            let occ = self.occurrence_on(date);
            if occ <= before && occ >= self.scheduled_time && self.last_executed_date != Some(date)
            {
                return Some(occ);
            }
        }
        None
    }
}

impl Database {
    /// Insert or replace a reservation (matched on id).
    pub fn upsert_reservation(&self, r: &Reservation) -> Result<(), rusqlite::Error> {
        self.conn().execute(
            "INSERT OR REPLACE INTO reservations
                (id, user_id, user_name, action, scheduled_time, last_executed_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                r.id,
                r.user_id,
                r.user_name,
                r.action.as_str(),
                r.scheduled_time.to_rfc3339(),
                r.last_executed_date.map(|d| d.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn read_reservation(&self, id: &str) -> Result<Option<Reservation>, rusqlite::Error> {
        self.conn()
            .prepare(
                "SELECT id, user_id, user_name, action, scheduled_time, last_executed_date
                 FROM reservations WHERE id = ?1",
            )?
            .query_row(params![id], reservation_from_row)
            .optional()
    }

    pub fn list_reservations(&self, user_id: &str) -> Result<Vec<Reservation>, rusqlite::Error> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, user_name, action, scheduled_time, last_executed_date
             FROM reservations WHERE user_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], reservation_from_row)?;
        rows.collect()
    }

    /// All reservations across users with an unconsumed occurrence at or
    /// before `before`, paired with that occurrence.
    pub fn list_due_reservations(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<(Reservation, DateTime<Utc>)>, rusqlite::Error> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, user_name, action, scheduled_time, last_executed_date
             FROM reservations ORDER BY scheduled_time ASC",
        )?;
        let rows = stmt.query_map([], reservation_from_row)?;
        let mut due = Vec::new();
        for row in rows {
            let r = row?;
            if let Some(occ) = r.due_occurrence(before) {
                due.push((r, occ));
            }
        }
        Ok(due)
    }

    /// Consume one occurrence. Called inside the same transaction as the
    /// session write so a crash cannot separate the two.
    pub fn mark_reservation_executed(
        &self,
        id: &str,
        occurrence_date: NaiveDate,
    ) -> Result<(), rusqlite::Error> {
        self.conn().execute(
            "UPDATE reservations SET last_executed_date = ?2 WHERE id = ?1",
            params![id, occurrence_date.to_string()],
        )?;
        Ok(())
    }

    /// Re-arm: clear the marker for `date` on all of a user's reservations.
    /// Rows are never deleted and `scheduled_time` is never touched.
    pub fn rearm_reservations_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<usize, rusqlite::Error> {
        self.conn().execute(
            "UPDATE reservations SET last_executed_date = NULL
             WHERE user_id = ?1 AND last_executed_date = ?2",
            params![user_id, date.to_string()],
        )
    }

    /// Remove a reservation entirely (explicit user configuration change,
    /// not part of any session transition).
    pub fn delete_reservation(&self, id: &str) -> Result<bool, rusqlite::Error> {
        Ok(self
            .conn()
            .execute("DELETE FROM reservations WHERE id = ?1", params![id])?
            > 0)
    }
}

fn reservation_from_row(row: &Row<'_>) -> Result<Reservation, rusqlite::Error> {
    let action: String = row.get(3)?;
    let scheduled: String = row.get(4)?;
    let last_executed: Option<String> = row.get(5)?;
    Ok(Reservation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        user_name: row.get(2)?,
        action: ReservationAction::parse(&action).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown reservation action: {action}").into(),
            )
        })?,
        scheduled_time: parse_ts(&scheduled)?,
        last_executed_date: match last_executed {
            Some(s) => Some(s.parse().map_err(|e: chrono::ParseError| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?),
            None => None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, day, h, m, 0).unwrap()
    }

    #[test]
    fn stop_id_is_fixed_per_user() {
        let a = Reservation::stop("u1", "Alice", at(24, 18, 0));
        let b = Reservation::stop("u1", "Alice", at(24, 19, 0));
        assert_eq!(a.id, b.id);

        let db = Database::open_memory().unwrap();
        db.upsert_reservation(&a).unwrap();
        db.upsert_reservation(&b).unwrap();
        assert_eq!(db.list_reservations("u1").unwrap().len(), 1);
    }

    #[test]
    fn break_ids_are_keyed_by_time() {
        let a = Reservation::break_at("u1", "Alice", at(24, 10, 30));
        let b = Reservation::break_at("u1", "Alice", at(24, 15, 0));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn not_due_before_first_scheduled_time() {
        // Configured for tomorrow 10:30; today's 10:30 must not fire.
        let r = Reservation::break_at("u1", "Alice", at(25, 10, 30));
        assert_eq!(r.due_occurrence(at(24, 11, 0)), None);
        assert_eq!(r.due_occurrence(at(25, 11, 0)), Some(at(25, 10, 30)));
    }

    #[test]
    fn recurs_daily_until_consumed() {
        let mut r = Reservation::break_at("u1", "Alice", at(24, 10, 30));
        assert_eq!(r.due_occurrence(at(24, 10, 31)), Some(at(24, 10, 30)));

        r.last_executed_date = Some(at(24, 0, 0).date_naive());
        assert_eq!(r.due_occurrence(at(24, 23, 0)), None);
        // Next day's occurrence is due again.
        assert_eq!(r.due_occurrence(at(25, 10, 31)), Some(at(25, 10, 30)));
    }

    #[test]
    fn late_evening_occurrence_found_across_midnight() {
        // Lookahead can push `before` past midnight; yesterday's 23:59
        // occurrence must still be found.
        let r = Reservation::stop("u1", "Alice", at(24, 23, 59));
        assert_eq!(r.due_occurrence(at(25, 0, 0)), Some(at(24, 23, 59)));
    }

    #[test]
    fn rearm_clears_today_only_and_keeps_schedule() {
        let db = Database::open_memory().unwrap();
        let today = at(24, 0, 0).date_naive();
        let yesterday = today.pred_opt().unwrap();

        let mut consumed_today = Reservation::break_at("u1", "Alice", at(24, 10, 30));
        consumed_today.last_executed_date = Some(today);
        let mut consumed_yesterday = Reservation::stop("u1", "Alice", at(24, 18, 0));
        consumed_yesterday.last_executed_date = Some(yesterday);
        db.upsert_reservation(&consumed_today).unwrap();
        db.upsert_reservation(&consumed_yesterday).unwrap();

        let cleared = db.rearm_reservations_on("u1", today).unwrap();
        assert_eq!(cleared, 1);

        let listed = db.list_reservations("u1").unwrap();
        let brk = listed.iter().find(|r| r.id == consumed_today.id).unwrap();
        assert_eq!(brk.last_executed_date, None);
        assert_eq!(brk.scheduled_time, at(24, 10, 30));
        let stop = listed.iter().find(|r| r.id == consumed_yesterday.id).unwrap();
        assert_eq!(stop.last_executed_date, Some(yesterday));
    }

    #[test]
    fn list_due_pairs_reservation_with_occurrence() {
        let db = Database::open_memory().unwrap();
        db.upsert_reservation(&Reservation::break_at("u1", "Alice", at(24, 10, 30)))
            .unwrap();
        db.upsert_reservation(&Reservation::stop("u2", "Bob", at(24, 18, 0)))
            .unwrap();

        let due = db.list_due_reservations(at(24, 11, 0)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0.user_id, "u1");
        assert_eq!(due[0].1, at(24, 10, 30));
    }
}

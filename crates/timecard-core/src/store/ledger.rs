//! Work log ledger.
//!
//! Append-only, immutable records of completed task intervals. Every
//! session transition that closes an interval appends here; nothing ever
//! updates or deletes a row.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{parse_ts, Database};

/// One completed task interval.
///
/// `date` is the calendar day of `start_time` -- the start day even if the
/// interval was closed after midnight. `duration_secs` is always positive;
/// zero-length intervals are never written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkLogEntry {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub task: String,
    pub goal_id: Option<String>,
    pub goal_title: Option<String>,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_secs: i64,
    pub memo: String,
}

impl Database {
    /// Append an entry to the ledger. Fire-and-forget: entries are immutable.
    pub fn append_work_log(&self, entry: &WorkLogEntry) -> Result<(), rusqlite::Error> {
        self.conn().execute(
            "INSERT INTO work_log
                (id, user_id, user_name, task, goal_id, goal_title,
                 date, start_time, end_time, duration_secs, memo)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.id,
                entry.user_id,
                entry.user_name,
                entry.task,
                entry.goal_id,
                entry.goal_title,
                entry.date.to_string(),
                entry.start_time.to_rfc3339(),
                entry.end_time.to_rfc3339(),
                entry.duration_secs,
                entry.memo,
            ],
        )?;
        Ok(())
    }

    /// All of a user's entries for one day, oldest first.
    pub fn work_log_for_day(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<WorkLogEntry>, rusqlite::Error> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, user_name, task, goal_id, goal_title,
                    date, start_time, end_time, duration_secs, memo
             FROM work_log
             WHERE user_id = ?1 AND date = ?2
             ORDER BY start_time ASC",
        )?;
        let rows = stmt.query_map(params![user_id, date.to_string()], |row| {
            let date: String = row.get(6)?;
            let start: String = row.get(7)?;
            let end: String = row.get(8)?;
            Ok(WorkLogEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                user_name: row.get(2)?,
                task: row.get(3)?,
                goal_id: row.get(4)?,
                goal_title: row.get(5)?,
                date: date.parse().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        6,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
                start_time: parse_ts(&start)?,
                end_time: parse_ts(&end)?,
                duration_secs: row.get(9)?,
                memo: row.get(10)?,
            })
        })?;
        rows.collect()
    }
}

//! Session row access.
//!
//! One row per user. Callers that depend on the current value wrap these
//! primitives in `Database::immediate` / `immediate_retry`; the bare methods
//! perform no locking of their own.

use rusqlite::{params, OptionalExtension};

use super::{parse_ts, Database};
use crate::session::SessionState;

impl Database {
    /// Read a user's session row, if one exists.
    pub fn read_session(&self, user_id: &str) -> Result<Option<SessionState>, rusqlite::Error> {
        self.conn()
            .prepare(
                "SELECT user_id, user_name, is_working, current_task, current_goal_id,
                        current_goal_title, start_time, pre_break_task, needs_checkout_correction
                 FROM sessions WHERE user_id = ?1",
            )?
            .query_row(params![user_id], |row| {
                let start_time: Option<String> = row.get(6)?;
                let pre_break: Option<String> = row.get(7)?;
                Ok(SessionState {
                    user_id: row.get(0)?,
                    user_name: row.get(1)?,
                    is_working: row.get::<_, i64>(2)? != 0,
                    current_task: row.get(3)?,
                    current_goal_id: row.get(4)?,
                    current_goal_title: row.get(5)?,
                    start_time: match start_time {
                        Some(s) => Some(parse_ts(&s)?),
                        None => None,
                    },
                    // A corrupted snapshot degrades to "no snapshot"; the
                    // controller then falls back to a plain stop on resume.
                    pre_break_task: pre_break.and_then(|s| serde_json::from_str(&s).ok()),
                    needs_checkout_correction: row.get::<_, i64>(8)? != 0,
                })
            })
            .optional()
    }

    /// Read a user's session row, creating idle defaults on first access.
    pub fn ensure_session(
        &self,
        user_id: &str,
        user_name: &str,
    ) -> Result<SessionState, rusqlite::Error> {
        if let Some(state) = self.read_session(user_id)? {
            return Ok(state);
        }
        let state = SessionState::idle(user_id, user_name);
        self.write_session(&state)?;
        Ok(state)
    }

    /// Persist a full session row.
    pub fn write_session(&self, state: &SessionState) -> Result<(), rusqlite::Error> {
        let pre_break = state
            .pre_break_task
            .as_ref()
            .and_then(|t| serde_json::to_string(t).ok());
        self.conn().execute(
            "INSERT OR REPLACE INTO sessions
                (user_id, user_name, is_working, current_task, current_goal_id,
                 current_goal_title, start_time, pre_break_task, needs_checkout_correction)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                state.user_id,
                state.user_name,
                state.is_working as i64,
                state.current_task,
                state.current_goal_id,
                state.current_goal_title,
                state.start_time.map(|t| t.to_rfc3339()),
                pre_break,
                state.needs_checkout_correction as i64,
            ],
        )?;
        Ok(())
    }
}

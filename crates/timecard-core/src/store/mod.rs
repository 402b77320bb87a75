//! SQLite-backed persistence.
//!
//! One database file holds all three tables -- sessions, work_log,
//! reservations -- so a session transition, its ledger append and a
//! reservation marker update commit as a single transaction.

mod ledger;
mod reservation;
mod session;

pub use ledger::WorkLogEntry;
pub use reservation::{Reservation, ReservationAction};

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::{CoreError, StoreError};

/// Returns `~/.config/timecard[-dev]/` based on TIMECARD_ENV.
///
/// Set TIMECARD_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TIMECARD_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("timecard-dev")
    } else {
        base_dir.join("timecard")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// SQLite database holding session state, the work log ledger and
/// reservations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `<data_dir>/timecard.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        Ok(Self::open_at(&data_dir()?.join("timecard.db"))?)
    }

    /// Open (creating if needed) the database at an explicit path. Several
    /// handles may target the same file; the busy timeout arbitrates their
    /// write locks.
    pub fn open_at(path: &std::path::Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        db.configure()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        let db = Self { conn };
        db.migrate()
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(db)
    }

    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn configure(&self) -> Result<(), StoreError> {
        // Concurrent writers (client + executor) back off instead of
        // failing immediately on the write lock.
        self.conn
            .busy_timeout(std::time::Duration::from_millis(500))
            .map_err(StoreError::from)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                user_id                   TEXT PRIMARY KEY,
                user_name                 TEXT NOT NULL,
                is_working                INTEGER NOT NULL DEFAULT 0,
                current_task              TEXT,
                current_goal_id           TEXT,
                current_goal_title        TEXT,
                start_time                TEXT,
                pre_break_task            TEXT,
                needs_checkout_correction INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS work_log (
                id            TEXT PRIMARY KEY,
                user_id       TEXT NOT NULL,
                user_name     TEXT NOT NULL,
                task          TEXT NOT NULL,
                goal_id       TEXT,
                goal_title    TEXT,
                date          TEXT NOT NULL,
                start_time    TEXT NOT NULL,
                end_time      TEXT NOT NULL,
                duration_secs INTEGER NOT NULL,
                memo          TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS reservations (
                id                 TEXT PRIMARY KEY,
                user_id            TEXT NOT NULL,
                user_name          TEXT NOT NULL,
                action             TEXT NOT NULL,
                scheduled_time     TEXT NOT NULL,
                last_executed_date TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_work_log_user_date ON work_log(user_id, date);
            CREATE INDEX IF NOT EXISTS idx_reservations_user ON reservations(user_id);",
        )?;
        Ok(())
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// Commits on `Ok`, rolls back on `Err`. Every read-modify-write against
    /// session state goes through here -- plain read-then-write is racy
    /// against the other writer.
    pub fn immediate<T>(
        &self,
        f: impl FnOnce(&Self) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err.into())
            }
        }
    }

    /// `immediate` with bounded retry on the write lock.
    ///
    /// Interactive callers surface `StoreError::Conflict` once retries
    /// exhaust; the executor lets the next scheduler tick retry instead.
    pub fn immediate_retry<T>(
        &self,
        mut f: impl FnMut(&Self) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        const MAX_ATTEMPTS: u32 = 3;
        let mut attempt = 0;
        loop {
            match self.immediate(&mut f) {
                Err(StoreError::Locked) if attempt + 1 < MAX_ATTEMPTS => {
                    attempt += 1;
                    std::thread::sleep(std::time::Duration::from_millis(50 * u64::from(attempt)));
                }
                Err(StoreError::Locked) => {
                    return Err(StoreError::Conflict {
                        attempts: MAX_ATTEMPTS,
                    })
                }
                other => return other,
            }
        }
    }
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

//! # Timecard Core Library
//!
//! Core business logic for Timecard, a per-user work-session tracker.
//! All operations are available via a standalone CLI binary; any GUI is a
//! thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Session controller**: a wall-clock-based state machine driving
//!   start/break/resume/stop transitions; the caller invokes `tick()`
//!   periodically for the display heartbeat and the midnight deadline
//! - **Storage**: one SQLite database holding the authoritative session
//!   row per user, the append-only work log ledger, and reservations
//! - **Reservation executor**: a cron-invoked process applying scheduled
//!   break/stop actions transactionally, whether or not a client is
//!   connected
//!
//! ## Key components
//!
//! - [`SessionController`]: interactive state machine
//! - [`ReservationExecutor`]: scheduled-action executor
//! - [`Database`]: session, ledger and reservation persistence
//! - [`Config`]: application configuration

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod session;
pub mod store;
pub mod watch;

pub use config::Config;
pub use error::{ConfigError, CoreError, Result, SessionError, StoreError};
pub use events::Event;
pub use executor::{ItemOutcome, ItemReport, ReservationExecutor, RunReport};
pub use session::{Restore, SessionController, SessionState, TaskRef};
pub use store::{Database, Reservation, ReservationAction, WorkLogEntry};
pub use watch::SubscriptionId;

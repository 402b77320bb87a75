use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::TaskRef;

/// Every committed session transition produces an Event.
/// The UI layer renders them; subscribers registered on the controller
/// receive them alongside the committed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TaskStarted {
        task: String,
        goal_id: Option<String>,
        goal_title: Option<String>,
        at: DateTime<Utc>,
    },
    BreakStarted {
        /// Task snapshot that will be restored on resume.
        saved: Option<TaskRef>,
        at: DateTime<Utc>,
    },
    BreakEnded {
        resumed: TaskRef,
        at: DateTime<Utc>,
    },
    WorkStopped {
        at: DateTime<Utc>,
    },
    /// Session closed by the system at the end of its start day.
    /// Requires a one-time confirmation from the user on next load.
    AutoClosed {
        task: String,
        end_time: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}

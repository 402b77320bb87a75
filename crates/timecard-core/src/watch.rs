//! Observer registration for committed session changes.
//!
//! Replaces raw store listeners: a subscriber registered on the controller
//! receives every committed state together with the event that produced it.
//! Unsubscribing is explicit and tied to view teardown by the host.

use crate::events::Event;
use crate::session::SessionState;

pub type SessionCallback = Box<dyn Fn(&SessionState, &Event) + Send>;

/// Handle returned by `subscribe`; pass back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    entries: Vec<(u64, SessionCallback)>,
}

impl Subscribers {
    pub(crate) fn subscribe(&mut self, callback: SessionCallback) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, callback));
        SubscriptionId(id)
    }

    /// Returns false when the id was already removed.
    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id.0);
        self.entries.len() != before
    }

    pub(crate) fn notify(&self, state: &SessionState, event: &Event) {
        for (_, callback) in &self.entries {
            callback(state, event);
        }
    }
}

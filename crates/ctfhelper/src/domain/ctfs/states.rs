//! Scheduled event status tracking.
//!
//! The gateway only delivers the new state of a scheduled event, so the last
//! status seen per event is persisted and each update is reduced to a
//! [`Transition`]. Keeping it in the database means a restart does not replay
//! start or end announcements for events that already moved on.
//!
//! # State Flow
//!
//! ```text
//! Scheduled ──→ Active ──→ Completed
//!     │
//!     └──────→ Canceled (no action)
//! ```

use ctfhelper_core::{EventStatus, Transition};
use log::debug;

use super::CtfStore;

#[derive(Debug, Clone)]
pub struct StatusTracker {
    store: CtfStore,
}

impl StatusTracker {
    pub fn new(store: CtfStore) -> Self {
        Self { store }
    }

    /// Records `status` for `event_id` and reports what changed.
    pub async fn observe(
        &self,
        guild_id: u64,
        event_id: u64,
        status: EventStatus,
    ) -> Result<Transition, sqlx::Error> {
        let previous = self
            .store
            .swap_event_status(guild_id, event_id, status)
            .await?;
        let transition = Transition::between(previous, status);
        debug!(
            "scheduled event {} {:?} -> {} ({:?})",
            event_id, previous, status, transition
        );
        Ok(transition)
    }
}

//! Shared value types for the CTF lifecycle

use serde::{Deserialize, Serialize};

/// Color of the feed announcement embed. Never handed out to a CTF role.
pub const FEED_EMBED_COLOR: u32 = 0xBEBEFE;

/// Color a CTF role is reset to once its event has completed.
pub const ARCHIVED_ROLE_COLOR: u32 = 0xD3D3D3;

/// Upper bound (exclusive) for random role colors.
pub const MAX_ROLE_COLOR: u32 = 0xFFFFFF;

/// Status of the scheduled event mirroring a CTF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    Active,
    Completed,
    Canceled,
    Unknown,
}

impl EventStatus {
    pub fn state_name(&self) -> &'static str {
        match self {
            EventStatus::Scheduled => "scheduled",
            EventStatus::Active => "active",
            EventStatus::Completed => "completed",
            EventStatus::Canceled => "canceled",
            EventStatus::Unknown => "unknown",
        }
    }

    /// Inverse of [`EventStatus::state_name`]; anything else reads as `Unknown`.
    pub fn from_state_name(name: &str) -> Self {
        match name {
            "scheduled" => EventStatus::Scheduled,
            "active" => EventStatus::Active,
            "completed" => EventStatus::Completed,
            "canceled" => EventStatus::Canceled,
            _ => EventStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Canceled)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.state_name())
    }
}

/// What a scheduled-event status update asks the lifecycle to do.
///
/// # State Flow
///
/// ```text
/// Scheduled
///     ↓
/// Active ──────→ CTF started announcement
///     ↓
/// Completed ───→ archive channel, neutralize role, ended announcement
/// ```
///
/// Any other status, or an update that repeats the previous status, maps to
/// [`Transition::Ignored`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Ended,
    Ignored,
}

impl Transition {
    /// `previous` is `None` when no earlier status was observed; that counts as a change.
    pub fn between(previous: Option<EventStatus>, current: EventStatus) -> Self {
        if previous == Some(current) {
            return Transition::Ignored;
        }
        match current {
            EventStatus::Active => Transition::Started,
            EventStatus::Completed => Transition::Ended,
            _ => Transition::Ignored,
        }
    }
}

/// Result of reading a finished poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Nobody voted.
    NoVotes,
    /// Exactly one option holds the maximum.
    Winner(usize),
    /// Several options share the maximum; indexes in option order.
    Tie(Vec<usize>),
}

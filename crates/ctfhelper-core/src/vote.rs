//! Candidate window, poll option encoding and tie-break for CTF votes

use itertools::Itertools;
use time::{Date, Duration, OffsetDateTime, Weekday};

use crate::{CoreError, VoteOutcome};

pub const MIN_CANDIDATES: usize = 2;
pub const MAX_CANDIDATES: usize = 10;
pub const POLL_DURATION_HOURS: u64 = 48;

/// Longest answer text a poll accepts.
pub const MAX_POLL_ANSWER_LEN: usize = 55;

/// ISO week whose events are offered in a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteWindow {
    pub year: i32,
    pub week: u8,
}

impl VoteWindow {
    /// Current ISO week, or the following one when `today` falls on a weekend.
    pub fn for_day(today: Date) -> Self {
        let anchor = match today.weekday() {
            Weekday::Saturday | Weekday::Sunday => today + Duration::weeks(1),
            _ => today,
        };
        let (year, week, _) = anchor.to_iso_week_date();
        Self { year, week }
    }

    pub fn contains(&self, start: OffsetDateTime) -> bool {
        let (year, week, _) = start.date().to_iso_week_date();
        (year, week) == (self.year, self.week)
    }
}

pub fn check_candidate_count(found: usize) -> Result<(), CoreError> {
    if (MIN_CANDIDATES..=MAX_CANDIDATES).contains(&found) {
        Ok(())
    } else {
        Err(CoreError::CandidateCount {
            found,
            min: MIN_CANDIDATES,
            max: MAX_CANDIDATES,
        })
    }
}

/// Encodes a candidate as `"<title> (<id>)"`, shortening the title to fit a poll answer.
pub fn poll_option(title: &str, external_id: i64) -> String {
    let suffix = format!(" ({})", external_id);
    let room = MAX_POLL_ANSWER_LEN.saturating_sub(suffix.chars().count());
    let title: String = title.trim().chars().take(room).collect();
    format!("{}{}", title.trim_end(), suffix)
}

/// Reads the id between the last `(` and the last `)` of a poll option.
pub fn parse_poll_option(text: &str) -> Result<i64, CoreError> {
    let malformed = || CoreError::MalformedPollOption(text.to_string());
    let open = text.rfind('(').ok_or_else(malformed)?;
    let close = text.rfind(')').ok_or_else(malformed)?;
    if close <= open {
        return Err(malformed());
    }
    text[open + 1..close]
        .trim()
        .parse::<i64>()
        .map_err(|_| malformed())
}

/// Picks the single most voted option. Ties are reported, never broken.
pub fn resolve_votes(counts: &[u64]) -> VoteOutcome {
    let max = counts.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return VoteOutcome::NoVotes;
    }
    let winners: Vec<usize> = counts.iter().positions(|&count| count == max).collect();
    match winners.as_slice() {
        [winner] => VoteOutcome::Winner(*winner),
        _ => VoteOutcome::Tie(winners),
    }
}

//! Names, descriptions and timestamps derived from event index metadata

use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::CoreError;

/// Longest description the feed embed will carry.
pub const MAX_DESCRIPTION_LEN: usize = 4096;

/// Longest description a scheduled event accepts.
pub const MAX_EVENT_DESCRIPTION_LEN: usize = 1000;

const ELLIPSIS: &str = "...";

/// Parses an RFC 3339 start/finish timestamp, rejecting empty values.
pub fn parse_event_time(value: &str) -> Result<OffsetDateTime, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidTime {
            value: value.to_string(),
            reason: String::from("missing"),
        });
    }
    OffsetDateTime::parse(trimmed, &Rfc3339).map_err(|e| CoreError::InvalidTime {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// `"<title> - <year>"`, the year taken from the event start.
pub fn display_name(title: &str, start: OffsetDateTime) -> String {
    format!("{} - {}", title.trim(), start.year())
}

/// Cuts `text` to at most `max_len` characters, ending in `...` when anything was dropped.
pub fn truncate_with_ellipsis(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let keep = max_len.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

pub fn truncate_description(text: &str) -> String {
    truncate_with_ellipsis(text, MAX_DESCRIPTION_LEN)
}

/// Year encoded as the suffix after the last `-` of a display name.
///
/// Falls back to `fallback_year` when the suffix is not a number.
pub fn year_from_name(name: &str, fallback_year: i32) -> i32 {
    name.rsplit('-')
        .next()
        .and_then(|suffix| suffix.trim().parse::<i32>().ok())
        .unwrap_or(fallback_year)
}

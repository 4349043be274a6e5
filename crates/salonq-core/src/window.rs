//! Time windows for appointments.
//!
//! This module provides [`Window`], a canonical half-open interval
//! `[start, end)` in UTC, and [`parse_window`] which turns a calendar date
//! plus loosely-formatted human time text plus a duration into a window.
//!
//! Shop-local wall-clock times are stored as UTC instants; all overlap and
//! ordering comparisons happen on instants, never on raw strings.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a booking window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    /// The calendar date was not `YYYY-MM-DD`.
    #[error("invalid date {input:?}: expected YYYY-MM-DD")]
    InvalidDate { input: String },

    /// The time text matched none of the accepted formats.
    #[error("unparsable time {input:?}")]
    UnparsableTime { input: String },

    /// The duration was zero, negative, or too large to represent.
    #[error("invalid duration {minutes} minutes")]
    InvalidDuration { minutes: i64 },
}

/// Dots used as hour/minute separators ("2.30pm").
static DOTTED_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)\.(\d)").expect("valid dotted-time regex"));

/// Trailing meridiem in any of its common spellings ("pm", "p.m.", "PM").
static MERIDIEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([apAP])\.?[mM]\.?\s*$").expect("valid meridiem regex"));

/// A bare hour with meridiem ("2 PM"); chrono needs an explicit minute.
static BARE_HOUR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}) ([AP]M)$").expect("valid bare-hour regex"));

/// Accepted time formats, tried in order of specificity.
///
/// Meridiem formats come first so that "2:30 PM" is never misread as 02:30.
const TIME_FORMATS: &[&str] = &["%I:%M:%S %p", "%I:%M %p", "%H:%M:%S", "%H:%M"];

/// A half-open time interval `[start, end)` held by one booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl Window {
    /// Creates a new window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "Window start must be <= end");
        Self { start, end }
    }

    /// Creates a window from a start instant and a duration in minutes.
    pub fn from_start(start: DateTime<Utc>, duration_minutes: i64) -> Self {
        Self::new(start, start + Duration::minutes(duration_minutes))
    }

    /// Returns the duration of this window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Returns the calendar date of the window's start.
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Checks whether an instant falls within this window.
    ///
    /// Half-open semantics: the start is inside, the end is not.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Checks whether two windows overlap.
    ///
    /// Half-open semantics: a booking ending at 10:00 does not conflict
    /// with one starting at 10:00.
    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Returns true if the window starts before `now`.
    ///
    /// A window starting exactly at `now` is not in the past.
    pub fn starts_in_past(&self, now: DateTime<Utc>) -> bool {
        self.start < now
    }
}

/// Parses a calendar date, human time text and a duration into a [`Window`].
///
/// The time text may be 12-hour with meridiem (`2:30 PM`, `2 pm`, `2.30pm`),
/// 24-hour (`14:30`, `14:30:00`), or any of the loose spellings the
/// normalizer smooths over. Formats are tried in order of specificity and
/// the first valid parse wins.
///
/// The duration must be positive and small enough that the window's end
/// stays representable; anything else is `InvalidDuration`, never a panic.
pub fn parse_window(
    date: &str,
    time_text: &str,
    duration_minutes: i64,
) -> Result<Window, WindowError> {
    if duration_minutes <= 0 {
        return Err(WindowError::InvalidDuration {
            minutes: duration_minutes,
        });
    }

    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
        WindowError::InvalidDate {
            input: date.to_string(),
        }
    })?;

    let normalized = normalize_time_text(time_text);
    let time = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&normalized, fmt).ok())
        .ok_or_else(|| WindowError::UnparsableTime {
            input: time_text.to_string(),
        })?;

    let start = day.and_time(time).and_utc();
    let end = Duration::try_minutes(duration_minutes)
        .and_then(|d| start.checked_add_signed(d))
        .ok_or(WindowError::InvalidDuration {
            minutes: duration_minutes,
        })?;
    Ok(Window::new(start, end))
}

/// Smooths loose human time spellings into something chrono can parse.
///
/// `"2.30pm"` becomes `"2:30 PM"`, `"9 p.m."` becomes `"9:00 PM"`. The
/// bare-hour expansion matters: chrono's `%I %p` never matches without a
/// minute field, so hour-only inputs get an explicit `:00`.
fn normalize_time_text(raw: &str) -> String {
    let trimmed = raw.trim();
    let dotted = DOTTED_TIME.replace_all(trimmed, "$1:$2");
    let meridiem = MERIDIEM.replace(&dotted, |caps: &regex::Captures| {
        format!(" {}M", caps[1].to_uppercase())
    });
    BARE_HOUR.replace(&meridiem, "$1:00 $2").into_owned()
}

//! Vertical layout of the daily timeline: one pixel row per minute since the
//! study day started.

use crate::day::DayBoundary;
use chrono::{DateTime, TimeZone};
use serde::Serialize;

/// Shortest block drawn, so that tiny sessions stay clickable
pub const MIN_BLOCK_MINUTES: i64 = 15;
/// Height used when the end lies before the start (clock skew, bad data)
pub const FALLBACK_BLOCK_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelineBlock {
    pub top_minutes: i64,
    pub height_minutes: i64,
}

/// Block for a session starting at `start`. Open sessions (no `end`) extend to `now`.
pub fn block_for<Tz: TimeZone>(
    boundary: &DayBoundary,
    start: &DateTime<Tz>,
    end: Option<&DateTime<Tz>>,
    now: &DateTime<Tz>,
) -> TimelineBlock {
    let top_minutes = boundary.minutes_since_start(start);
    let end = end.unwrap_or(now);

    let span = end.clone().signed_duration_since(start.clone()).num_minutes();
    let height_minutes = if span < 0 {
        FALLBACK_BLOCK_MINUTES
    } else {
        span.max(MIN_BLOCK_MINUTES)
    };

    TimelineBlock {
        top_minutes,
        height_minutes,
    }
}

/// Offset of the "now" line
pub fn now_offset<Tz: TimeZone>(boundary: &DayBoundary, now: &DateTime<Tz>) -> i64 {
    boundary.minutes_since_start(now)
}

//! Aggregates over study sessions.
//!
//! Sessions are attributed to the study day of their start time only, even when
//! they run past the cutoff.

use crate::day::DayBoundary;
use crate::models::{StudySession, SubjectTotal};
use chrono::{DateTime, NaiveDate, TimeZone};
use std::collections::{BTreeMap, HashMap};

/// Sum of durations that started within the study day of `now` (04:00 cutoff).
pub fn total_for_today<Tz: TimeZone>(sessions: &[StudySession], now: &DateTime<Tz>) -> u64 {
    total_for_day(&DayBoundary::default(), sessions, now)
}

/// Like [`total_for_today`] with an explicit boundary.
pub fn total_for_day<Tz: TimeZone>(
    boundary: &DayBoundary,
    sessions: &[StudySession],
    now: &DateTime<Tz>,
) -> u64 {
    sessions
        .iter()
        .filter(|s| boundary.contains(now, &s.start_time))
        .fold(0u64, |acc, s| acc.saturating_add(s.duration_seconds))
}

pub fn total_all_time(sessions: &[StudySession]) -> u64 {
    sessions
        .iter()
        .fold(0u64, |acc, s| acc.saturating_add(s.duration_seconds))
}

/// Totals per subject, largest first. Sessions are grouped by subject id, or by
/// name when the id is empty. The color of the first session seen is kept.
pub fn total_by_subject(sessions: &[StudySession]) -> Vec<SubjectTotal> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<SubjectTotal> = Vec::new();

    for session in sessions {
        let key = if session.subject_id.is_empty() {
            session.subject_name.as_str()
        } else {
            session.subject_id.as_str()
        };
        match index.get(key) {
            Some(&i) => {
                totals[i].seconds = totals[i].seconds.saturating_add(session.duration_seconds);
            }
            None => {
                index.insert(key, totals.len());
                totals.push(SubjectTotal {
                    subject_id: session.subject_id.clone(),
                    subject_name: session.subject_name.clone(),
                    subject_color: session.subject_color.clone(),
                    seconds: session.duration_seconds,
                    ratio: 0.0,
                });
            }
        }
    }

    // sort_by is stable: ties keep first-seen order
    totals.sort_by(|a, b| b.seconds.cmp(&a.seconds));

    let max = totals.first().map(|t| t.seconds).unwrap_or(0);
    if max > 0 {
        for total in &mut totals {
            total.ratio = total.seconds as f64 / max as f64;
        }
    }
    totals
}

/// Totals keyed by study date, computed in `tz`.
pub fn daily_totals<Tz: TimeZone>(
    boundary: &DayBoundary,
    sessions: &[StudySession],
    tz: &Tz,
) -> BTreeMap<NaiveDate, u64> {
    let mut days = BTreeMap::new();
    for session in sessions {
        let local = session.start_time.with_timezone(tz);
        let total = days.entry(boundary.study_date(&local)).or_insert(0u64);
        *total = total.saturating_add(session.duration_seconds);
    }
    days
}

/// Seven totals for the Monday-first week containing the study day of `now`.
pub fn week_totals<Tz: TimeZone>(
    boundary: &DayBoundary,
    sessions: &[StudySession],
    now: &DateTime<Tz>,
) -> [(NaiveDate, u64); 7] {
    let (week, _) = boundary.week_of(now);
    let days = daily_totals(boundary, sessions, &now.timezone());
    week.map(|date| (date, days.get(&date).copied().unwrap_or(0)))
}

/// Parse a user-entered duration in minutes into seconds.
///
/// Accepts a finite, non-negative decimal number ("15", " 7.5 ") whose seconds
/// fit in an `i64`; anything else is `None` and the caller keeps the previous value.
pub fn parse_duration_minutes(input: &str) -> Option<u64> {
    let minutes: f64 = input.trim().parse().ok()?;
    if !minutes.is_finite() || minutes < 0.0 {
        return None;
    }
    let seconds = (minutes * 60.0).round();
    // Stores keep durations as signed 64-bit integers
    if seconds >= i64::MAX as f64 {
        return None;
    }
    Some(seconds as u64)
}

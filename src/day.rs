//! Logical study day.
//!
//! A study day does not end at midnight: it runs from the cutoff hour (04:00 by
//! default) of one calendar date to the cutoff hour of the next. Anything that
//! happens between midnight and the cutoff still belongs to the previous day.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike};

/// Hour (local time) at which a new study day begins
pub const DEFAULT_CUTOFF_HOUR: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    cutoff_hour: u32,
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self {
            cutoff_hour: DEFAULT_CUTOFF_HOUR,
        }
    }
}

impl DayBoundary {
    /// Hours above 23 are clamped to 23.
    pub fn new(cutoff_hour: u32) -> Self {
        Self {
            cutoff_hour: cutoff_hour.min(23),
        }
    }

    pub fn cutoff_hour(&self) -> u32 {
        self.cutoff_hour
    }

    /// Calendar date that names the study day containing `instant`.
    /// Before the cutoff hour this is the previous calendar date.
    pub fn study_date<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> NaiveDate {
        let date = instant.date_naive();
        if instant.hour() < self.cutoff_hour {
            date.pred_opt().unwrap_or(date)
        } else {
            date
        }
    }

    /// Instant at which the study day named `date` starts, in `tz`.
    ///
    /// A cutoff that falls into a DST gap moves past the gap; an ambiguous one
    /// (clocks turned back) resolves to the earliest reading.
    pub fn start_of_date<Tz: TimeZone>(&self, tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
        let cutoff = NaiveTime::from_hms_opt(self.cutoff_hour, 0, 0).unwrap_or(NaiveTime::MIN);
        let naive = date.and_time(cutoff);
        match tz.from_local_datetime(&naive).earliest() {
            Some(dt) => dt,
            None => {
                let shifted = naive + Duration::hours(1);
                tz.from_local_datetime(&shifted)
                    .earliest()
                    .unwrap_or_else(|| tz.from_utc_datetime(&naive))
            }
        }
    }

    /// Start of the study day containing `now`.
    pub fn start_of<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        self.start_of_date(&now.timezone(), self.study_date(now))
    }

    /// `[start, end)` of the study day containing `now`. `end` is the next
    /// date's cutoff, which is 24h later except across a DST change.
    pub fn range_of<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>) {
        let tz = now.timezone();
        let date = self.study_date(now);
        let start = self.start_of_date(&tz, date);
        let end = match date.succ_opt() {
            Some(next) => self.start_of_date(&tz, next),
            None => start.clone() + Duration::hours(24),
        };
        (start, end)
    }

    /// Whether `instant` falls into the same study day as `now`.
    pub fn contains<Tz: TimeZone, Tz2: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        instant: &DateTime<Tz2>,
    ) -> bool {
        let (start, end) = self.range_of(now);
        let instant = instant.with_timezone(&now.timezone());
        instant >= start && instant < end
    }

    /// Minutes elapsed between the start of the study day and `instant`.
    pub fn minutes_since_start<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> i64 {
        let start = self.start_of(instant);
        instant.clone().signed_duration_since(start).num_minutes()
    }

    /// Monday-first week containing the study day of `now`, and the index of
    /// that day inside the week.
    pub fn week_of<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> ([NaiveDate; 7], usize) {
        let today = self.study_date(now);
        let index = today.weekday().num_days_from_monday() as usize;
        let monday = today
            .checked_sub_signed(Duration::days(index as i64))
            .unwrap_or(today);

        let mut days = [monday; 7];
        for (offset, day) in days.iter_mut().enumerate() {
            *day = monday
                .checked_add_signed(Duration::days(offset as i64))
                .unwrap_or(monday);
        }
        (days, index)
    }
}

/// Start of the current study day using the default 04:00 cutoff.
pub fn study_day_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    DayBoundary::default().start_of(now)
}

use std::collections::BTreeSet;
use std::fmt;

use chrono::DateTime;
use chrono::Datelike;
use chrono::Days;
use chrono::Months;
use chrono::NaiveDate;
use chrono::Utc;
use chrono::Weekday;
use serde::Deserialize;
use serde::Serialize;

use crate::TimestampMs;

/// Calendar recurrence of a round.
///
/// A finished round with a cadence is succeeded by a new round that closes at the next calendar
/// boundary, in UTC.
#[derive(Debug, Clone, Copy)]
#[derive(PartialEq, Eq, Hash)]
#[derive(PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Cadence {
    pub const ALL: [Cadence; 4] = [Cadence::Daily, Cadence::Weekly, Cadence::Monthly, Cadence::Yearly];

    /// Returns the first boundary of this cadence strictly after the day of `after`.
    ///
    /// Boundaries are midnights: the next day, the next Monday, the first day of the next month or
    /// the first day of the next year.
    /// Returns `None` if the result is not representable.
    pub fn next_close_at(self, after: TimestampMs) -> Option<TimestampMs> {
        let date = utc_date(after)?;

        let next = self.next_date(date)?;
        let at = next.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis();
        u64::try_from(at).ok()
    }

    fn next_date(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Cadence::Daily => date.checked_add_days(Days::new(1)),
            Cadence::Weekly => {
                let to_monday = 7 - date.weekday().num_days_from_monday() as u64;
                date.checked_add_days(Days::new(to_monday))
            }
            Cadence::Monthly => date.with_day(1)?.checked_add_months(Months::new(1)),
            Cadence::Yearly => NaiveDate::from_ymd_opt(date.year() + 1, 1, 1),
        }
    }

    /// The cadences whose period starts on `date`.
    pub fn due_on(date: NaiveDate) -> BTreeSet<Cadence> {
        let mut due = BTreeSet::new();
        due.insert(Cadence::Daily);

        if date.weekday() == Weekday::Mon {
            due.insert(Cadence::Weekly);
        }
        if date.day() == 1 {
            due.insert(Cadence::Monthly);
        }
        if date.ordinal() == 1 {
            due.insert(Cadence::Yearly);
        }

        due
    }
}

/// The UTC calendar day `ts` falls on.
pub fn utc_date(ts: TimestampMs) -> Option<NaiveDate> {
    let millis = i64::try_from(ts).ok()?;
    Some(DateTime::<Utc>::from_timestamp_millis(millis)?.date_naive())
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
            Cadence::Yearly => "yearly",
        };
        f.write_str(s)
    }
}

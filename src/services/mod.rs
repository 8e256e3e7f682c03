pub mod assignment;
pub mod availability;
pub mod booking;
pub mod flow;
pub mod notify;
pub mod slots;

use chrono::{Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Interpret a wall-clock time in `tz` and convert it to naive UTC.
/// Ambiguous times (DST fall-back) take the earlier offset; nonexistent
/// times (spring-forward gap) are pushed past the gap.
pub(crate) fn local_to_utc(local: NaiveDateTime, tz: &Tz) -> NaiveDateTime {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.naive_utc(),
        LocalResult::Ambiguous(earlier, _) => earlier.naive_utc(),
        LocalResult::None => tz
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.naive_utc())
            .unwrap_or(local),
    }
}

pub(crate) fn utc_to_local(utc: NaiveDateTime, tz: &Tz) -> NaiveDateTime {
    Utc.from_utc_datetime(&utc).with_timezone(tz).naive_local()
}

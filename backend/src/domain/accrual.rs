//! Calendar accrual engine for the savings counter.
//!
//! Pure functions that turn a start date, a daily amount and a reference
//! instant into day counts and money totals. All comparisons happen at
//! local-day granularity so a counter never gains or loses a day because of
//! the time of day or a DST shift. Nothing here reads the system clock.
//!
//! The functions are generic over the timezone; the services call them with
//! `chrono::Local`, tests pin a fixed offset.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, NaiveTime, Offset, SecondsFormat,
    TimeZone, Timelike, Utc,
};
use shared::{CounterTotals, MonthRemainingProgress};

/// Resolve the first instant of `date` in `tz`.
///
/// When a DST transition skips midnight the wall clock is read with the
/// offset in force before the gap, which lands on the first valid instant of
/// the day.
pub fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let offset_seconds = tz
                .offset_from_local_datetime(&(midnight - Duration::days(1)))
                .earliest()
                .map(|offset| offset.fix().local_minus_utc())
                .unwrap_or(0);
            tz.from_utc_datetime(&(midnight - Duration::seconds(i64::from(offset_seconds))))
        }
    }
}

/// Truncate an instant to local midnight of the same calendar day
pub fn start_of_local_day<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<Tz> {
    local_midnight(&instant.timezone(), instant.date_naive())
}

/// Day number of a calendar date, independent of any offset
pub fn local_day_number(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce())
}

/// First calendar day of the month containing `date`
pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

fn first_day_of_next_month(date: NaiveDate) -> NaiveDate {
    first_day_of_month(date)
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX)
}

/// Whole calendar days from `start` to `end`, both days included.
/// Returns 0 when `start` is after `end`.
pub fn inclusive_days_between<Tz: TimeZone>(start: &DateTime<Tz>, end: &DateTime<Tz>) -> u64 {
    if start > end {
        return 0;
    }

    let days = local_day_number(end.date_naive()) - local_day_number(start.date_naive()) + 1;
    u64::try_from(days).unwrap_or(0)
}

/// Coerce a raw daily amount into a whole, non-negative number.
/// Negative or non-finite input falls back to `fallback`; fractions are floored.
pub fn normalize_daily_amount(raw: f64, fallback: u64) -> u64 {
    if !raw.is_finite() || raw < 0.0 {
        return fallback;
    }

    raw.floor() as u64
}

/// Lifetime and current-month accrual at `now`.
///
/// The monthly figure only counts days of the current calendar month, clipped
/// at the start date, so it is always covered by the overall figure.
pub fn calculate_counter_totals<Tz: TimeZone>(
    start_date: &DateTime<Tz>,
    daily_amount: u64,
    now: &DateTime<Tz>,
) -> CounterTotals {
    let today = start_of_local_day(now);
    let start = start_of_local_day(start_date);

    if start > today {
        return CounterTotals::default();
    }

    let overall_days = inclusive_days_between(&start, &today);

    let month_start = local_midnight(&today.timezone(), first_day_of_month(today.date_naive()));
    let monthly_from = if start > month_start { start } else { month_start };
    let monthly_days = inclusive_days_between(&monthly_from, &today);

    CounterTotals {
        overall: overall_days.saturating_mul(daily_amount),
        monthly: monthly_days.saturating_mul(daily_amount),
    }
}

/// How much of the month containing `now` is still ahead.
///
/// The ratio is measured in milliseconds against the month's real duration,
/// so it moves continuously during the day. `days_left` counts today.
pub fn calculate_month_remaining_progress<Tz: TimeZone>(now: &DateTime<Tz>) -> MonthRemainingProgress {
    let tz = now.timezone();
    let today = now.date_naive();
    let month_first = first_day_of_month(today);
    let next_month_first = first_day_of_next_month(today);

    let month_start = local_midnight(&tz, month_first);
    let next_month_start = local_midnight(&tz, next_month_first);

    let total_ms = next_month_start
        .clone()
        .signed_duration_since(month_start)
        .num_milliseconds();
    let remaining_ms = next_month_start
        .signed_duration_since(now.clone())
        .num_milliseconds()
        .max(0);

    let remaining_ratio = if total_ms <= 0 {
        0.0
    } else {
        (remaining_ms as f64 / total_ms as f64).clamp(0.0, 1.0)
    };

    let next_month_day = local_day_number(next_month_first);
    let days_in_month = u32::try_from(next_month_day - local_day_number(month_first)).unwrap_or(0);
    let days_left = u32::try_from((next_month_day - local_day_number(today)).max(0)).unwrap_or(0);

    MonthRemainingProgress {
        days_in_month,
        days_left,
        remaining_ratio,
    }
}

/// Canonical UTC form used for everything persisted: `YYYY-MM-DDTHH:MM:SS.mmmZ`
pub fn to_iso_string<Tz: TimeZone>(instant: &DateTime<Tz>) -> String {
    instant
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO instant, accepting it only when it is already in canonical form.
/// Leap seconds (`:60`) are not valid instants.
pub fn parse_canonical_iso(value: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value).ok()?.with_timezone(&Utc);
    if parsed.nanosecond() >= 1_000_000_000 {
        return None;
    }
    (to_iso_string(&parsed) == value).then_some(parsed)
}

/// `YYYY-MM-DD` of the instant's local calendar date
pub fn format_date_ymd<Tz: TimeZone>(date: &DateTime<Tz>) -> String {
    date.date_naive().format("%Y-%m-%d").to_string()
}

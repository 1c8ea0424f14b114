//! Date range math for the calendar grid and display strings.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc, Weekday};

/// Weeks start on Sunday unless the caller says otherwise.
pub const DEFAULT_WEEK_START: Weekday = Weekday::Sun;

/// Midnight (UTC) at the start of `date`.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Last second (UTC) of `date`.
pub fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + Duration::days(1) - Duration::seconds(1)
}

/// Snap an all-day span to start-of-day / end-of-day of its dates.
pub fn normalize_all_day(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    (day_start(start.date_naive()), day_end(end.date_naive()))
}

/// Inclusive overlap of two spans.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start <= b_end && b_start <= a_end
}

/// First and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date - Duration::days(i64::from(date.day0()));
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX);
    (first, last)
}

fn days_after_week_start(date: NaiveDate, week_start: Weekday) -> i64 {
    let day = i64::from(date.weekday().num_days_from_monday());
    let start = i64::from(week_start.num_days_from_monday());
    (day - start).rem_euclid(7)
}

/// First and last day of the week containing `date`.
pub fn week_bounds(date: NaiveDate, week_start: Weekday) -> (NaiveDate, NaiveDate) {
    let first = date - Duration::days(days_after_week_start(date, week_start));
    (first, first + Duration::days(6))
}

/// Day grid for a month view: the whole month padded with days of the
/// neighbouring months so the first and last rows are complete weeks.
/// The length is always a multiple of 7.
pub fn days_in_month(date: NaiveDate, week_start: Weekday) -> Vec<NaiveDate> {
    let (first, last) = month_bounds(date);
    let (grid_start, _) = week_bounds(first, week_start);
    let (_, grid_end) = week_bounds(last, week_start);

    grid_start
        .iter_days()
        .take_while(|day| *day <= grid_end)
        .collect()
}

/// UTC span covered by the month grid around `date`.
pub fn month_grid_range(date: NaiveDate, week_start: Weekday) -> (DateTime<Utc>, DateTime<Utc>) {
    let (first, last) = month_bounds(date);
    let (grid_start, _) = week_bounds(first, week_start);
    let (_, grid_end) = week_bounds(last, week_start);
    (day_start(grid_start), day_end(grid_end))
}

/// Human label for an event span.
///
/// Single-day spans show the date, plus the clock range when the event is
/// timed. Multi-day spans show only the start and end dates.
pub fn format_date_range(start: DateTime<Utc>, end: DateTime<Utc>, all_day: bool) -> String {
    let start_date = start.date_naive();
    let end_date = end.date_naive();

    if start_date == end_date {
        let day = start.format("%a, %b %-d, %Y").to_string();
        if all_day {
            return day;
        }
        return format!(
            "{} · {} – {}",
            day,
            start.format("%-I:%M %p"),
            end.format("%-I:%M %p")
        );
    }

    if start_date.year() == end_date.year() {
        format!(
            "{} – {}",
            start.format("%b %-d"),
            end.format("%b %-d, %Y")
        )
    } else {
        format!(
            "{} – {}",
            start.format("%b %-d, %Y"),
            end.format("%b %-d, %Y")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_bounds_handle_leap_february_and_december() {
        assert_eq!(month_bounds(date(2024, 2, 17)), (date(2024, 2, 1), date(2024, 2, 29)));
        assert_eq!(month_bounds(date(2025, 12, 31)), (date(2025, 12, 1), date(2025, 12, 31)));
    }

    #[test]
    fn week_bounds_respect_week_start() {
        // 2025-01-15 is a Wednesday
        assert_eq!(
            week_bounds(date(2025, 1, 15), Weekday::Sun),
            (date(2025, 1, 12), date(2025, 1, 18))
        );
        assert_eq!(
            week_bounds(date(2025, 1, 15), Weekday::Mon),
            (date(2025, 1, 13), date(2025, 1, 19))
        );
        assert_eq!(
            week_bounds(date(2025, 1, 12), Weekday::Sun),
            (date(2025, 1, 12), date(2025, 1, 18))
        );
    }

    #[test]
    fn month_grid_is_whole_weeks_covering_the_month() {
        for month in 1..=12 {
            for week_start in [Weekday::Sun, Weekday::Mon] {
                let grid = days_in_month(date(2025, month, 10), week_start);
                assert_eq!(grid.len() % 7, 0, "month {} start {:?}", month, week_start);
                assert_eq!(grid[0].weekday(), week_start);
                let (first, last) = month_bounds(date(2025, month, 10));
                assert!(grid.contains(&first));
                assert!(grid.contains(&last));
            }
        }
    }

    #[test]
    fn january_2025_grid_pads_from_december() {
        // Jan 1 2025 is a Wednesday; a Sunday grid starts Dec 29
        let grid = days_in_month(date(2025, 1, 1), Weekday::Sun);
        assert_eq!(grid.first(), Some(&date(2024, 12, 29)));
        assert_eq!(grid.last(), Some(&date(2025, 2, 1)));
        assert_eq!(grid.len(), 35);
    }

    #[test]
    fn all_day_normalization_spans_whole_days() {
        let start = Utc.with_ymd_and_hms(2025, 1, 10, 14, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 12, 9, 0, 0).unwrap();
        let (s, e) = normalize_all_day(start, end);
        assert_eq!(s, Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap());
        assert_eq!(e, Utc.with_ymd_and_hms(2025, 1, 12, 23, 59, 59).unwrap());
    }

    #[test]
    fn single_day_labels_show_times_only_when_timed() {
        let start = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 10, 17, 30, 0).unwrap();
        assert_eq!(format_date_range(start, end, true), "Fri, Jan 10, 2025");
        assert_eq!(
            format_date_range(start, end, false),
            "Fri, Jan 10, 2025 · 9:00 AM – 5:30 PM"
        );
    }

    #[test]
    fn multi_day_labels_never_show_times() {
        let start = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 12, 17, 0, 0).unwrap();
        assert_eq!(format_date_range(start, end, false), "Jan 10 – Jan 12, 2025");
        assert_eq!(format_date_range(start, end, true), "Jan 10 – Jan 12, 2025");

        let new_year = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let eve = Utc.with_ymd_and_hms(2024, 12, 30, 0, 0, 0).unwrap();
        assert_eq!(format_date_range(eve, new_year, true), "Dec 30, 2024 – Jan 2, 2025");
    }
}

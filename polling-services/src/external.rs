//! Provider-neutral shape of an upstream event, and the window a sync
//! pass covers.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use shared::dates::{day_start, normalize_all_day, overlaps};

/// One upstream event instance as fetched from a provider
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalEvent {
    /// Stable per instance; recurring instances carry their original start
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub all_day: bool,
    pub html_link: Option<String>,
    /// Cancelled upstream; treated as removed
    pub cancelled: bool,
}

/// Time span one sync pass fetches and reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    pub fn around(now: DateTime<Utc>, past_days: i64, future_days: i64) -> Self {
        Self {
            start: now - Duration::days(past_days),
            end: now + Duration::days(future_days),
        }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        overlaps(self.start, self.end, start, end)
    }
}

/// Span of an all-day event whose upstream end date is exclusive. A missing
/// or non-advancing end yields a single day.
pub fn all_day_span(
    start: NaiveDate,
    end_exclusive: Option<NaiveDate>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let last = end_exclusive
        .and_then(|end| end.pred_opt())
        .filter(|last| *last >= start)
        .unwrap_or(start);
    normalize_all_day(day_start(start), day_start(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn all_day_end_dates_become_inclusive() {
        let jan = |d| NaiveDate::from_ymd_opt(2025, 1, d).unwrap();
        let (start, end) = all_day_span(jan(10), Some(jan(13)));
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 12, 23, 59, 59).unwrap());

        let (_, single) = all_day_span(jan(10), Some(jan(10)));
        assert_eq!(single, Utc.with_ymd_and_hms(2025, 1, 10, 23, 59, 59).unwrap());
        assert_eq!(all_day_span(jan(10), None).1, single);
    }

    #[test]
    fn window_overlap_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let window = SyncWindow::around(now, 30, 90);
        assert_eq!(window.start, now - Duration::days(30));
        assert!(window.overlaps(window.end, window.end + Duration::hours(1)));
        assert!(!window.overlaps(
            window.start - Duration::days(2),
            window.start - Duration::days(1)
        ));
    }
}

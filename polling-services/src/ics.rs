//! ICS/webcal subscription feeds: fetching with a bounded timeout, VEVENT
//! parsing, and recurrence expansion into discrete instances.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{
    Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event, EventLike,
};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

use crate::external::{all_day_span, ExternalEvent, SyncWindow};

/// Upper bound on instances generated per recurring event
const MAX_INSTANCES: u16 = 1000;

/// Why a feed could not be fetched or read. Messages are shown to users as
/// the source's last sync error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("The calendar URL is not valid")]
    InvalidUrl,

    #[error("The calendar server did not respond in time")]
    Timeout,

    #[error("The calendar was not found. It may have been unpublished.")]
    NotFound,

    #[error("The calendar is private or access was denied")]
    Unauthorized,

    #[error("The calendar server returned HTTP {0}")]
    Http(u16),

    #[error("The URL does not point to a calendar feed")]
    NotCalendar,

    #[error("The calendar feed could not be read: {0}")]
    Parse(String),

    #[error("Could not reach the calendar server: {0}")]
    Network(String),
}

/// Retrieves the raw body of an ICS feed
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FeedError>;
}

/// Feed fetcher over HTTPS
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: StdDuration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("homeday-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FeedError> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::NOT_FOUND | StatusCode::GONE => FeedError::NotFound,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FeedError::Unauthorized,
                other => FeedError::Http(other.as_u16()),
            });
        }

        let body = response.text().await.map_err(classify)?;
        if !body.contains("BEGIN:VCALENDAR") {
            return Err(FeedError::NotCalendar);
        }
        Ok(body)
    }
}

fn classify(err: reqwest::Error) -> FeedError {
    if err.is_timeout() {
        FeedError::Timeout
    } else if err.is_builder() {
        FeedError::InvalidUrl
    } else {
        FeedError::Network(err.without_url().to_string())
    }
}

/// A resolved DTSTART/DTEND value
#[derive(Debug, Clone, Copy)]
struct Moment {
    at: DateTime<Utc>,
    date: Option<NaiveDate>,
    tz: Option<Tz>,
}

impl Moment {
    fn from_ical(value: DatePerhapsTime) -> Self {
        match value {
            DatePerhapsTime::Date(date) => Moment {
                at: shared::dates::day_start(date),
                date: Some(date),
                tz: None,
            },
            DatePerhapsTime::DateTime(CalendarDateTime::Utc(at)) => Moment {
                at,
                date: None,
                tz: None,
            },
            DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => Moment {
                at: naive.and_utc(),
                date: None,
                tz: None,
            },
            DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
                let tz = tzid.parse::<Tz>().ok();
                Moment {
                    at: local_to_utc(date_time, tz),
                    date: None,
                    tz,
                }
            }
        }
    }
}

fn local_to_utc(naive: NaiveDateTime, tz: Option<Tz>) -> DateTime<Utc> {
    match tz.and_then(|tz| tz.from_local_datetime(&naive).earliest()) {
        Some(local) => local.with_timezone(&Utc),
        None => naive.and_utc(),
    }
}

/// Parse a bare EXDATE / RECURRENCE-ID value in the zone of its master.
fn parse_ical_instant(value: &str, tz: Option<Tz>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Some(utc) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .ok()
            .map(|n| n.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        return Some(local_to_utc(naive, tz));
    }
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .ok()
        .map(shared::dates::day_start)
}

/// `P1D`, `PT1H30M`, `P1W` and friends
fn parse_ical_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let body = value.strip_prefix('P')?;

    let mut total = Duration::zero();
    let mut digits = String::new();
    let mut in_time = false;
    for c in body.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' => digits.push(c),
            unit => {
                let n: i64 = digits.parse().ok()?;
                digits.clear();
                total += match (unit, in_time) {
                    ('W', false) => Duration::weeks(n),
                    ('D', false) => Duration::days(n),
                    ('H', true) => Duration::hours(n),
                    ('M', true) => Duration::minutes(n),
                    ('S', true) => Duration::seconds(n),
                    _ => return None,
                };
            }
        }
    }
    if !digits.is_empty() {
        return None;
    }
    Some(if negative { -total } else { total })
}

fn text(event: &Event, key: &str) -> Option<String> {
    event
        .property_value(key)
        .map(|v| v.replace("\\n", "\n").replace("\\,", ",").replace("\\;", ";"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_cancelled(event: &Event) -> bool {
    event
        .property_value("STATUS")
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("CANCELLED"))
}

/// Expand a feed into upstream instances overlapping `window`.
///
/// Recurring events become one instance per occurrence, identified as
/// `uid@<original start>`; RECURRENCE-ID overrides replace the occurrence
/// they name, and cancelled events or occurrences are dropped.
pub fn parse_feed(body: &str, window: SyncWindow) -> Result<Vec<ExternalEvent>, FeedError> {
    if !body.contains("BEGIN:VCALENDAR") {
        return Err(FeedError::NotCalendar);
    }
    let calendar: Calendar = body.parse().map_err(FeedError::Parse)?;

    let mut masters: Vec<&Event> = Vec::new();
    let mut overrides: HashMap<String, Vec<&Event>> = HashMap::new();
    for component in &calendar.components {
        let CalendarComponent::Event(event) = component else {
            continue;
        };
        match (event.get_uid(), event.property_value("RECURRENCE-ID")) {
            (Some(uid), Some(_)) => overrides.entry(uid.to_string()).or_default().push(event),
            _ => masters.push(event),
        }
    }

    let mut seen_ids = HashSet::new();
    let mut out = Vec::new();
    for (index, master) in masters.into_iter().enumerate() {
        let uid = master
            .get_uid()
            .map(str::to_string)
            .unwrap_or_else(|| format!("generated-{}", index));
        let Some(start) = master.get_start().map(Moment::from_ical) else {
            warn!(uid = %uid, "Skipping VEVENT without DTSTART");
            continue;
        };
        let instances = expand_master(
            master,
            &uid,
            start,
            overrides.get(&uid).map(Vec::as_slice).unwrap_or(&[]),
            window,
        );
        for instance in instances {
            if seen_ids.insert(instance.external_id.clone()) {
                out.push(instance);
            }
        }
    }

    out.sort_by_key(|e| e.start_at);
    debug!(count = out.len(), "Parsed ICS feed");
    Ok(out)
}

fn expand_master(
    master: &Event,
    uid: &str,
    start: Moment,
    overrides: &[&Event],
    window: SyncWindow,
) -> Vec<ExternalEvent> {
    let all_day = start.date.is_some();
    let span = span_of(master, start);

    if is_cancelled(master) {
        return Vec::new();
    }
    let Some(rule) = master.property_value("RRULE") else {
        let instance = instance_from(master, uid.to_string(), start.at, span, all_day);
        if window.overlaps(instance.start_at, instance.end_at) {
            return vec![instance];
        }
        return Vec::new();
    };

    let starts = match occurrences(rule, start, span, window) {
        Ok(starts) => starts,
        Err(err) => {
            warn!(uid = %uid, error = %err, "Could not expand RRULE; keeping first occurrence");
            vec![start.at]
        }
    };
    let excluded: HashSet<DateTime<Utc>> = master
        .property_value("EXDATE")
        .map(|v| {
            v.split(',')
                .filter_map(|d| parse_ical_instant(d, start.tz))
                .collect()
        })
        .unwrap_or_default();

    let mut instances: BTreeMap<DateTime<Utc>, ExternalEvent> = starts
        .into_iter()
        .filter(|at| !excluded.contains(at))
        .map(|at| (at, instance_from(master, recurring_id(uid, at), at, span, all_day)))
        .collect();

    for replacement in overrides {
        let Some(original) = replacement
            .property_value("RECURRENCE-ID")
            .and_then(|v| parse_ical_instant(v, start.tz))
        else {
            continue;
        };
        if is_cancelled(replacement) {
            instances.remove(&original);
            continue;
        }
        let Some(moved) = replacement.get_start().map(Moment::from_ical) else {
            continue;
        };
        let moved_span = span_of(replacement, moved);
        let instance = instance_from(
            replacement,
            recurring_id(uid, original),
            moved.at,
            moved_span,
            moved.date.is_some(),
        );
        instances.insert(original, instance);
    }

    instances
        .into_values()
        .filter(|e| window.overlaps(e.start_at, e.end_at))
        .collect()
}

/// Length of one occurrence, from DTEND or DURATION
fn span_of(event: &Event, start: Moment) -> Duration {
    if let Some(end) = event.get_end().map(Moment::from_ical) {
        return (end.at - start.at).max(Duration::zero());
    }
    if let Some(duration) = event.property_value("DURATION").and_then(parse_ical_duration) {
        return duration.max(Duration::zero());
    }
    if start.date.is_some() {
        Duration::days(1)
    } else {
        Duration::zero()
    }
}

fn occurrences(
    rule: &str,
    start: Moment,
    span: Duration,
    window: SyncWindow,
) -> Result<Vec<DateTime<Utc>>, String> {
    let dtstart = match start.tz {
        Some(tz) => format!(
            "DTSTART;TZID={}:{}",
            tz.name(),
            start.at.with_timezone(&tz).format("%Y%m%dT%H%M%S")
        ),
        None => format!("DTSTART:{}", start.at.format("%Y%m%dT%H%M%SZ")),
    };
    let set: rrule::RRuleSet = format!("{}\nRRULE:{}", dtstart, rule.trim())
        .parse()
        .map_err(|e: rrule::RRuleError| e.to_string())?;

    // occurrences that started before the window may still overlap it
    let after = (window.start - span).with_timezone(&rrule::Tz::UTC);
    let before = window.end.with_timezone(&rrule::Tz::UTC);
    let result = set.after(after).before(before).all(MAX_INSTANCES);
    if result.limited {
        warn!(rule = %rule, "Recurrence truncated at {} instances", MAX_INSTANCES);
    }
    Ok(result
        .dates
        .into_iter()
        .map(|d| d.with_timezone(&Utc))
        .collect())
}

fn recurring_id(uid: &str, original_start: DateTime<Utc>) -> String {
    format!("{}@{}", uid, original_start.format("%Y%m%dT%H%M%SZ"))
}

fn instance_from(
    event: &Event,
    external_id: String,
    start_at: DateTime<Utc>,
    span: Duration,
    all_day: bool,
) -> ExternalEvent {
    let (start_at, end_at) = if all_day {
        // DTEND of an all-day event is the exclusive next day
        let first = start_at.date_naive();
        let days = span.num_days().max(1);
        all_day_span(first, Some(first + Duration::days(days)))
    } else {
        (start_at, start_at + span)
    };

    ExternalEvent {
        external_id,
        title: text(event, "SUMMARY").unwrap_or_else(|| "Untitled event".to_string()),
        description: text(event, "DESCRIPTION"),
        location: text(event, "LOCATION"),
        start_at,
        end_at,
        all_day,
        html_link: text(event, "URL"),
        cancelled: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> SyncWindow {
        SyncWindow::around(Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap(), 30, 180)
    }

    fn feed(events: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n{}END:VCALENDAR\r\n",
            events
        )
    }

    #[test]
    fn single_events_keep_their_uid() {
        let body = feed(
            "BEGIN:VEVENT\r\nUID:abc-1\r\nSUMMARY:Weekend at Dad's house\r\n\
             LOCATION:Dad's house\r\nDTSTART:20250110T180000Z\r\nDTEND:20250112T180000Z\r\n\
             END:VEVENT\r\n",
        );
        let events = parse_feed(&body, window()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].external_id, "abc-1");
        assert_eq!(events[0].title, "Weekend at Dad's house");
        assert_eq!(events[0].location.as_deref(), Some("Dad's house"));
        assert_eq!(events[0].end_at - events[0].start_at, Duration::days(2));
        assert!(!events[0].all_day);
    }

    #[test]
    fn all_day_end_is_inclusive() {
        let body = feed(
            "BEGIN:VEVENT\r\nUID:holiday\r\nSUMMARY:Holiday\r\n\
             DTSTART;VALUE=DATE:20250120\r\nDTEND;VALUE=DATE:20250122\r\nEND:VEVENT\r\n",
        );
        let events = parse_feed(&body, window()).unwrap();
        assert!(events[0].all_day);
        assert_eq!(events[0].start_at, Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap());
        assert_eq!(events[0].end_at, Utc.with_ymd_and_hms(2025, 1, 21, 23, 59, 59).unwrap());
    }

    #[test]
    fn weekly_rule_expands_with_exdate_and_override() {
        let body = feed(
            "BEGIN:VEVENT\r\nUID:swim\r\nSUMMARY:Swim class\r\n\
             DTSTART:20250106T160000Z\r\nDTEND:20250106T170000Z\r\n\
             RRULE:FREQ=WEEKLY;COUNT=4\r\nEXDATE:20250113T160000Z\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:swim\r\nRECURRENCE-ID:20250120T160000Z\r\nSUMMARY:Swim (moved)\r\n\
             DTSTART:20250121T160000Z\r\nDTEND:20250121T170000Z\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:swim\r\nRECURRENCE-ID:20250127T160000Z\r\nSTATUS:CANCELLED\r\n\
             DTSTART:20250127T160000Z\r\nEND:VEVENT\r\n",
        );
        let events = parse_feed(&body, window()).unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.external_id.as_str()).collect();
        assert_eq!(ids, vec!["swim@20250106T160000Z", "swim@20250120T160000Z"]);
        assert_eq!(events[1].title, "Swim (moved)");
        assert_eq!(events[1].start_at, Utc.with_ymd_and_hms(2025, 1, 21, 16, 0, 0).unwrap());
    }

    #[test]
    fn events_outside_the_window_and_cancelled_ones_are_dropped() {
        let body = feed(
            "BEGIN:VEVENT\r\nUID:old\r\nSUMMARY:Old\r\nDTSTART:20240101T100000Z\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:gone\r\nSUMMARY:Gone\r\nSTATUS:CANCELLED\r\n\
             DTSTART:20250116T100000Z\r\nEND:VEVENT\r\n",
        );
        assert!(parse_feed(&body, window()).unwrap().is_empty());
    }

    #[test]
    fn non_calendar_bodies_are_classified() {
        assert_eq!(
            parse_feed("<html>nope</html>", window()).unwrap_err(),
            FeedError::NotCalendar
        );
    }

    #[test]
    fn durations_parse() {
        assert_eq!(parse_ical_duration("PT1H30M"), Some(Duration::minutes(90)));
        assert_eq!(parse_ical_duration("P1W"), Some(Duration::weeks(1)));
        assert_eq!(parse_ical_duration("P2DT3H"), Some(Duration::hours(51)));
        assert_eq!(parse_ical_duration("1H"), None);
    }

    #[test]
    fn instants_honor_the_master_zone() {
        let tz: Tz = "America/New_York".parse().unwrap();
        assert_eq!(
            parse_ical_instant("20250110T090000", Some(tz)),
            Some(Utc.with_ymd_and_hms(2025, 1, 10, 14, 0, 0).unwrap())
        );
        assert_eq!(
            parse_ical_instant("20250110T090000Z", Some(tz)),
            Some(Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap())
        );
    }
}

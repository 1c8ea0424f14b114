//! Home-stay candidates among freshly fetched upstream events.

use shared::home_stay::matching_candidates;
use shared::{Home, HomeStayCandidate, MatchReason};
use uuid::Uuid;

use crate::external::ExternalEvent;

fn unclassified(source_id: Uuid, event: &ExternalEvent) -> HomeStayCandidate {
    HomeStayCandidate {
        source_id,
        external_event_id: event.external_id.clone(),
        title: event.title.clone(),
        location: event.location.clone(),
        start_at: event.start_at,
        end_at: event.end_at,
        all_day: event.all_day,
        home_id: None,
        confidence: None,
        reason: MatchReason::NoMatch,
    }
}

/// Live imported events that look like a stay at one of `homes`.
pub fn detect_candidates(
    source_id: Uuid,
    events: &[ExternalEvent],
    homes: &[Home],
) -> Vec<HomeStayCandidate> {
    let live = events
        .iter()
        .filter(|e| !e.cancelled)
        .map(|e| unclassified(source_id, e));
    matching_candidates(live, homes)
}

//! Home-stay suggestions drawn from a child's synced calendars.

use std::sync::Arc;

use shared::home_stay::matching_candidates;
use shared::{HomeStayCandidate, MatchReason, WorkflowError, WorkflowResult};
use tracing::debug;
use uuid::Uuid;

use crate::roster::Roster;
use crate::store::{ExternalEventStore, MappedEvent, SourceStore};

/// Classifies the live read-only mirrors of every source connected for a
/// child against that child's homes.
pub struct HomeStayFinder {
    sources: Arc<dyn SourceStore>,
    mirrors: Arc<dyn ExternalEventStore>,
    roster: Arc<dyn Roster>,
}

impl HomeStayFinder {
    pub fn new(
        sources: Arc<dyn SourceStore>,
        mirrors: Arc<dyn ExternalEventStore>,
        roster: Arc<dyn Roster>,
    ) -> Self {
        Self {
            sources,
            mirrors,
            roster,
        }
    }

    /// Matching candidates ordered by start time. Only guardians of the
    /// child may look.
    pub async fn candidates(
        &self,
        child_id: Uuid,
        viewer: Uuid,
    ) -> WorkflowResult<Vec<HomeStayCandidate>> {
        if !self.roster.guardians(child_id).await?.contains(&viewer) {
            return Err(WorkflowError::forbidden(
                "Only the child's guardians can see calendar suggestions",
            ));
        }
        let homes = self.roster.homes(child_id).await?;
        if homes.is_empty() {
            return Ok(Vec::new());
        }

        let mut unclassified = Vec::new();
        for source in self.sources.list_sources_for_child(child_id).await? {
            let mirrored = self.mirrors.mapped_events(source.id).await?;
            unclassified.extend(
                mirrored
                    .into_iter()
                    .filter(|m| m.event.is_read_only && m.event.child_id == child_id)
                    .map(unclassified_candidate),
            );
        }

        let mut found = matching_candidates(unclassified, &homes);
        found.sort_by(|a, b| {
            (a.start_at, &a.external_event_id).cmp(&(b.start_at, &b.external_event_id))
        });
        debug!(child_id = %child_id, count = found.len(), "Home-stay candidates");
        Ok(found)
    }

    /// The current candidate for one upstream event, re-derived from storage
    pub async fn find(
        &self,
        child_id: Uuid,
        source_id: Uuid,
        external_event_id: &str,
        viewer: Uuid,
    ) -> WorkflowResult<HomeStayCandidate> {
        self.candidates(child_id, viewer)
            .await?
            .into_iter()
            .find(|c| c.source_id == source_id && c.external_event_id == external_event_id)
            .ok_or_else(|| WorkflowError::not_found("Home-stay suggestion"))
    }
}

/// Mirrors keep no location, so only the title is matched.
fn unclassified_candidate(mapped: MappedEvent) -> HomeStayCandidate {
    let MappedEvent { mapping, event } = mapped;
    HomeStayCandidate {
        source_id: mapping.source_id,
        external_event_id: mapping.external_event_id,
        title: event.title,
        location: None,
        start_at: event.start_at,
        end_at: event.end_at,
        all_day: event.all_day,
        home_id: None,
        confidence: None,
        reason: MatchReason::NoMatch,
    }
}

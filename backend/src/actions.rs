//! # Calendar actions
//!
//! Every calendar mutation and the permission-aware listing path.
//!
//! Home-days follow a small forward-only state machine:
//!
//! ```text
//! proposed ──confirm──▶ confirmed
//!     └─────reject────▶ rejected
//! ```
//!
//! A proposal is confirmed or rejected by a guardian of the child other than
//! the proposer. When no such guardian exists the proposal is confirmed on
//! creation. Travel and plain events are always confirmed. Rows imported from
//! external calendars are read-only.
//!
//! Mutations re-check permissions themselves; the `can_*` flags computed by
//! [`CalendarActions::list_events`] are for display only.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::api::UpdateEventRequest;
use shared::colors::home_color;
use shared::dates::{format_date_range, normalize_all_day};
use shared::{
    CalendarEvent, EnrichedEvent, EventDetails, EventKind, EventQuery, EventStatus, EventType,
    Home, HomeStayCandidate, NewCalendarEvent, ProposeOutcome, StatusTransition, TravelEndpoint,
    WorkflowError, WorkflowResult,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::roster::{eligible_confirmers, Roster};
use crate::store::{overlap_error, EventStore, OverlapGuard};

/// How to treat a confirmed home-day overlapping another confirmed home-day
/// of the same child at a different home.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Overlaps coexist; resolving them is left to the guardians.
    #[default]
    Allow,
    /// Confirming (or auto-confirming) into such an overlap fails.
    RejectConfirmed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub overlap_policy: OverlapPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HomeDayProposal {
    pub child_id: Uuid,
    pub home_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub all_day: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub child_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub all_day: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTravel {
    pub child_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub all_day: bool,
    pub from_home_id: Option<Uuid>,
    pub from_location: Option<String>,
    pub to_home_id: Option<Uuid>,
    pub to_location: Option<String>,
}

/// Partial update of a manual event; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub all_day: Option<bool>,
}

impl From<UpdateEventRequest> for EventPatch {
    fn from(req: UpdateEventRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            start_at: req.start_at,
            end_at: req.end_at,
            all_day: req.all_day,
        }
    }
}

pub struct CalendarActions {
    events: Arc<dyn EventStore>,
    roster: Arc<dyn Roster>,
    config: WorkflowConfig,
}

impl CalendarActions {
    pub fn new(events: Arc<dyn EventStore>, roster: Arc<dyn Roster>) -> Self {
        Self {
            events,
            roster,
            config: WorkflowConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> WorkflowConfig {
        self.config
    }

    /// Propose that a child stays at a home for a span.
    ///
    /// Sent for confirmation when another guardian can confirm it, otherwise
    /// confirmed immediately with no proposal audit.
    pub async fn propose_home_day(
        &self,
        proposal: HomeDayProposal,
        proposer: Uuid,
    ) -> WorkflowResult<ProposeOutcome> {
        let (start_at, end_at) =
            validated_span(proposal.start_at, proposal.end_at, proposal.all_day)?;
        let reason = proposal
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let homes = self.roster.homes(proposal.child_id).await?;
        let home = homes
            .iter()
            .find(|h| h.id == proposal.home_id)
            .ok_or_else(|| WorkflowError::validation("Home does not belong to this child"))?;

        let guardians = self.roster.guardians(proposal.child_id).await?;
        let eligible = eligible_confirmers(&guardians, Some(proposer));
        let auto_confirm = eligible.is_empty();

        if auto_confirm {
            self.ensure_no_confirmed_overlap(
                proposal.child_id,
                home.id,
                start_at,
                end_at,
                None,
            )
            .await?;
        }

        let mut new_event = NewCalendarEvent::manual(
            proposal.child_id,
            home.name.clone(),
            start_at,
            end_at,
            EventKind::HomeDay { home_id: home.id },
            proposer,
        );
        new_event.all_day = proposal.all_day;

        if auto_confirm {
            let event = self.events.insert(new_event).await?;
            info!(
                event_id = %event.id,
                child_id = %event.child_id,
                "Home day auto-confirmed (no other guardian)"
            );
            return Ok(ProposeOutcome::AutoConfirmed(event));
        }

        new_event.status = EventStatus::Proposed;
        new_event.proposed_by = Some(proposer);
        new_event.proposal_reason = reason;
        let event = self.events.insert(new_event).await?;
        info!(
            event_id = %event.id,
            child_id = %event.child_id,
            confirmers = eligible.len(),
            "Home day proposed"
        );
        Ok(ProposeOutcome::SentForConfirmation(event))
    }

    pub async fn confirm_home_day(
        &self,
        event_id: Uuid,
        confirmer: Uuid,
    ) -> WorkflowResult<CalendarEvent> {
        let event = self.pending_decision(event_id, confirmer, "confirm").await?;

        let guard = match self.config.overlap_policy {
            OverlapPolicy::Allow => None,
            OverlapPolicy::RejectConfirmed => OverlapGuard::for_event(&event),
        };
        let transition = StatusTransition::Confirm {
            by: confirmer,
            at: Utc::now(),
        };
        let confirmed = self
            .events
            .transition(event_id, transition, guard)
            .await?
            .ok_or_else(lost_race)?;
        info!(event_id = %event_id, confirmed_by = %confirmer, "Home day confirmed");
        Ok(confirmed)
    }

    pub async fn reject_home_day(
        &self,
        event_id: Uuid,
        rejecter: Uuid,
    ) -> WorkflowResult<CalendarEvent> {
        self.pending_decision(event_id, rejecter, "reject").await?;

        let transition = StatusTransition::Reject {
            by: rejecter,
            at: Utc::now(),
        };
        let rejected = self
            .events
            .transition(event_id, transition, None)
            .await?
            .ok_or_else(lost_race)?;
        info!(event_id = %event_id, rejected_by = %rejecter, "Home day rejected");
        Ok(rejected)
    }

    /// Shared checks before a confirm or reject, in the order callers see
    /// them: missing, read-only, wrong state, wrong actor.
    async fn pending_decision(
        &self,
        event_id: Uuid,
        actor: Uuid,
        verb: &str,
    ) -> WorkflowResult<CalendarEvent> {
        let event = self.load(event_id).await?;
        if event.is_read_only {
            return Err(WorkflowError::forbidden(
                "Events imported from external calendars cannot be changed",
            ));
        }
        if event.event_type() != EventType::HomeDay {
            return Err(WorkflowError::invalid_state(
                "Only home days go through confirmation",
            ));
        }
        if event.status != EventStatus::Proposed {
            return Err(WorkflowError::invalid_state(format!(
                "This home day is already {}",
                event.status.as_str()
            )));
        }
        if event.proposed_by == Some(actor) {
            return Err(WorkflowError::forbidden(format!(
                "You cannot {} your own proposal",
                verb
            )));
        }
        let guardians = self.roster.guardians(event.child_id).await?;
        if !eligible_confirmers(&guardians, event.proposed_by).contains(&actor) {
            return Err(WorkflowError::forbidden(format!(
                "Only another guardian of this child can {} this home day",
                verb
            )));
        }
        Ok(event)
    }

    pub async fn create_event(&self, input: NewEvent, actor: Uuid) -> WorkflowResult<CalendarEvent> {
        let title = validated_title(&input.title)?;
        let (start_at, end_at) = validated_span(input.start_at, input.end_at, input.all_day)?;

        let mut new_event = NewCalendarEvent::manual(
            input.child_id,
            title,
            start_at,
            end_at,
            EventKind::Event,
            actor,
        );
        new_event.description = clean_description(input.description);
        new_event.all_day = input.all_day;

        let event = self.events.insert(new_event).await?;
        debug!(event_id = %event.id, "Event created");
        Ok(event)
    }

    /// Travel needs a home or a non-empty location at each end and is
    /// confirmed on creation.
    pub async fn create_travel(&self, input: NewTravel, actor: Uuid) -> WorkflowResult<CalendarEvent> {
        let title = validated_title(&input.title)?;
        let (start_at, end_at) = validated_span(input.start_at, input.end_at, input.all_day)?;

        let from = endpoint("from", input.from_home_id, input.from_location.as_deref())?;
        let to = endpoint("to", input.to_home_id, input.to_location.as_deref())?;

        let homes = self.roster.homes(input.child_id).await?;
        for home_id in [from.home_id(), to.home_id()].into_iter().flatten() {
            if !homes.iter().any(|h| h.id == home_id) {
                return Err(WorkflowError::validation(
                    "Home does not belong to this child",
                ));
            }
        }

        let mut new_event = NewCalendarEvent::manual(
            input.child_id,
            title,
            start_at,
            end_at,
            EventKind::Travel { from, to },
            actor,
        );
        new_event.description = clean_description(input.description);
        new_event.all_day = input.all_day;

        let event = self.events.insert(new_event).await?;
        debug!(event_id = %event.id, "Travel created");
        Ok(event)
    }

    /// Patch the provided fields, re-validating the merged span.
    pub async fn update_event(
        &self,
        event_id: Uuid,
        patch: EventPatch,
        actor: Uuid,
    ) -> WorkflowResult<CalendarEvent> {
        let event = self.load(event_id).await?;
        if event.is_read_only {
            return Err(WorkflowError::forbidden(
                "Events imported from external calendars cannot be edited",
            ));
        }
        if event.status == EventStatus::Rejected {
            return Err(WorkflowError::invalid_state(
                "Rejected home days cannot be edited",
            ));
        }

        let title = match patch.title {
            Some(title) => validated_title(&title)?,
            None => event.title.clone(),
        };
        let description = match patch.description {
            Some(description) => clean_description(Some(description)),
            None => event.description.clone(),
        };
        let all_day = patch.all_day.unwrap_or(event.all_day);
        let (start_at, end_at) = validated_span(
            patch.start_at.unwrap_or(event.start_at),
            patch.end_at.unwrap_or(event.end_at),
            all_day,
        )?;

        if event.status == EventStatus::Confirmed {
            if let Some(home_id) = event.kind.home_id() {
                self.ensure_no_confirmed_overlap(
                    event.child_id,
                    home_id,
                    start_at,
                    end_at,
                    Some(event.id),
                )
                .await?;
            }
        }

        let details = EventDetails {
            title,
            description,
            start_at,
            end_at,
            all_day,
        };
        let updated = self
            .events
            .update_details(event_id, details)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Event"))?;
        info!(event_id = %event_id, actor = %actor, "Event updated");
        Ok(updated)
    }

    pub async fn delete_event(&self, event_id: Uuid, actor: Uuid) -> WorkflowResult<()> {
        let event = self.load(event_id).await?;
        if event.is_read_only {
            return Err(WorkflowError::forbidden(
                "Events imported from external calendars cannot be deleted",
            ));
        }
        if !self.events.soft_delete(event_id).await? {
            return Err(WorkflowError::not_found("Event"));
        }
        info!(event_id = %event_id, actor = %actor, "Event deleted");
        Ok(())
    }

    /// Rows matching `query`, enriched for display from `viewer`'s point of
    /// view.
    pub async fn list_events(
        &self,
        query: &EventQuery,
        viewer: Uuid,
    ) -> WorkflowResult<Vec<EnrichedEvent>> {
        let events = self.events.list(query).await?;
        self.enrich(query.child_id, events, viewer).await
    }

    /// Proposals awaiting `viewer`, regardless of date.
    pub async fn pending_confirmations(
        &self,
        child_id: Uuid,
        viewer: Uuid,
    ) -> WorkflowResult<Vec<EnrichedEvent>> {
        let query = EventQuery {
            event_types: Some(vec![EventType::HomeDay]),
            statuses: Some(vec![EventStatus::Proposed]),
            ..EventQuery::for_child(child_id)
        };
        let pending = self.list_events(&query, viewer).await?;
        Ok(pending.into_iter().filter(|e| e.can_confirm).collect())
    }

    /// Turn a home-stay suggestion from a synced calendar into an ordinary
    /// proposal.
    pub async fn propose_from_candidate(
        &self,
        child_id: Uuid,
        candidate: &HomeStayCandidate,
        proposer: Uuid,
    ) -> WorkflowResult<ProposeOutcome> {
        let home_id = candidate
            .home_id
            .ok_or_else(|| WorkflowError::validation("This event does not match a home"))?;
        let proposal = HomeDayProposal {
            child_id,
            home_id,
            start_at: candidate.start_at,
            end_at: candidate.end_at,
            all_day: candidate.all_day,
            reason: Some(format!("From synced calendar: {}", candidate.title)),
        };
        self.propose_home_day(proposal, proposer).await
    }

    async fn load(&self, event_id: Uuid) -> WorkflowResult<CalendarEvent> {
        self.events
            .get(event_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Event"))
    }

    async fn ensure_no_confirmed_overlap(
        &self,
        child_id: Uuid,
        home_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> WorkflowResult<()> {
        if self.config.overlap_policy == OverlapPolicy::Allow {
            return Ok(());
        }
        let query = EventQuery {
            range: Some((start_at, end_at)),
            event_types: Some(vec![EventType::HomeDay]),
            statuses: Some(vec![EventStatus::Confirmed]),
            ..EventQuery::for_child(child_id)
        };
        let guard = OverlapGuard {
            home_id,
            start_at,
            end_at,
        };
        let clash = self
            .events
            .list(&query)
            .await?
            .iter()
            .any(|e| Some(e.id) != exclude && guard.clashes_with(e));
        if clash {
            return Err(overlap_error());
        }
        Ok(())
    }

    async fn enrich(
        &self,
        child_id: Uuid,
        events: Vec<CalendarEvent>,
        viewer: Uuid,
    ) -> WorkflowResult<Vec<EnrichedEvent>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let guardians = self.roster.guardians(child_id).await?;
        let homes: HashMap<Uuid, Home> = self
            .roster
            .homes(child_id)
            .await?
            .into_iter()
            .map(|h| (h.id, h))
            .collect();

        let mut names: HashMap<Uuid, Option<String>> = HashMap::new();
        for event in &events {
            for user in [
                event.proposed_by,
                event.confirmed_by,
                event.rejected_by,
                event.created_by,
            ]
            .into_iter()
            .flatten()
            {
                if !names.contains_key(&user) {
                    let name = self.roster.display_name(user).await?;
                    names.insert(user, name);
                }
            }
        }
        let name_of = |user: Option<Uuid>| user.and_then(|u| names.get(&u).cloned().flatten());
        let label_of = |endpoint: &TravelEndpoint| match endpoint {
            TravelEndpoint::Home(id) => homes
                .get(id)
                .map(|h| h.name.clone())
                .unwrap_or_else(|| "Unknown home".to_string()),
            TravelEndpoint::Location(text) => text.clone(),
        };

        let enriched = events
            .into_iter()
            .map(|event| {
                let home = event.kind.home_id().and_then(|id| homes.get(&id));
                let (from_label, to_label) = match &event.kind {
                    EventKind::Travel { from, to } => (Some(label_of(from)), Some(label_of(to))),
                    _ => (None, None),
                };

                let awaiting = event.event_type() == EventType::HomeDay
                    && event.status == EventStatus::Proposed
                    && !event.is_read_only;
                let eligible = if awaiting {
                    eligible_confirmers(&guardians, event.proposed_by)
                } else {
                    Vec::new()
                };
                let can_decide = awaiting
                    && event.proposed_by != Some(viewer)
                    && eligible.contains(&viewer);
                let writable = !event.is_read_only && event.status != EventStatus::Rejected;

                EnrichedEvent {
                    home_name: home.map(|h| h.name.clone()),
                    home_color: home.map(|h| home_color(&h.name).hex().to_string()),
                    from_label,
                    to_label,
                    proposed_by_name: name_of(event.proposed_by),
                    confirmed_by_name: name_of(event.confirmed_by),
                    rejected_by_name: name_of(event.rejected_by),
                    created_by_name: name_of(event.created_by),
                    date_label: format_date_range(event.start_at, event.end_at, event.all_day),
                    eligible_confirmers: eligible,
                    can_confirm: can_decide,
                    can_reject: can_decide,
                    can_edit: writable,
                    can_delete: writable,
                    event,
                }
            })
            .collect();
        Ok(enriched)
    }
}

fn lost_race() -> WorkflowError {
    WorkflowError::conflict("This home day was just decided by someone else. Please refresh.")
}

fn validated_span(
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    all_day: bool,
) -> WorkflowResult<(DateTime<Utc>, DateTime<Utc>)> {
    if end_at < start_at {
        return Err(WorkflowError::validation("End time must be after start time"));
    }
    if all_day {
        Ok(normalize_all_day(start_at, end_at))
    } else {
        Ok((start_at, end_at))
    }
}

fn validated_title(title: &str) -> WorkflowResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(WorkflowError::validation("Title is required"));
    }
    Ok(title.to_string())
}

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// One travel end. A home and a location on the same end is ambiguous.
fn endpoint(
    end: &str,
    home_id: Option<Uuid>,
    location: Option<&str>,
) -> WorkflowResult<TravelEndpoint> {
    let location = location.map(str::trim).filter(|l| !l.is_empty());
    match (home_id, location) {
        (Some(_), Some(_)) => Err(WorkflowError::validation(format!(
            "Travel '{}' must be either a home or a location, not both",
            end
        ))),
        (Some(id), None) => Ok(TravelEndpoint::Home(id)),
        (None, Some(text)) => Ok(TravelEndpoint::Location(text.to_string())),
        (None, None) => Err(WorkflowError::validation(format!(
            "Travel needs a '{}' home or location",
            end
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_endpoints_need_exactly_one_side() {
        let home = Uuid::new_v4();
        assert_eq!(endpoint("from", Some(home), None).unwrap(), TravelEndpoint::Home(home));
        assert_eq!(
            endpoint("to", None, Some(" School ")).unwrap(),
            TravelEndpoint::Location("School".to_string())
        );
        assert!(endpoint("to", None, Some("   ")).is_err());
        assert!(endpoint("from", None, None).is_err());
        assert!(endpoint("from", Some(home), Some("School")).is_err());
    }

    #[test]
    fn inverted_spans_fail_for_timed_and_all_day() {
        let start = Utc::now();
        let end = start - chrono::Duration::minutes(1);
        for all_day in [false, true] {
            let err = validated_span(start, end, all_day).unwrap_err();
            assert_eq!(err.code(), "validation_error");
        }
        assert!(validated_span(start, start, false).is_ok());
    }
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::actions::{EventPatch, HomeDayProposal, NewEvent, NewTravel};
use crate::error::{ApiError, ApiResult};
use crate::state::{Actor, AppState};
use shared::api::{
    CandidatesQuery, CandidatesResponse, CreateEventRequest, CreateTravelRequest, EventResponse,
    ListEventsQuery, ListEventsResponse, PendingQuery, PendingResponse, ProposeCandidateRequest,
    ProposeHomeDayRequest, ProposeHomeDayResponse, UpdateEventRequest,
};
use shared::EventQuery;

pub async fn list_events(
    State(state): State<AppState>,
    Actor(viewer): Actor,
    Query(params): Query<ListEventsQuery>,
) -> ApiResult<Json<ListEventsResponse>> {
    let range = match (params.start, params.end) {
        (Some(start), Some(end)) if end < start => {
            return Err(ApiError::bad_request("end must not be before start"))
        }
        (Some(start), Some(end)) => Some((start, end)),
        (None, None) => None,
        _ => return Err(ApiError::bad_request("start and end must be given together")),
    };

    let query = EventQuery {
        child_id: params.child_id,
        range,
        event_types: params.parsed_event_types().map_err(ApiError::BadRequest)?,
        statuses: params.parsed_statuses().map_err(ApiError::BadRequest)?,
        include_rejected: params.include_rejected,
    };

    let events = state.actions.list_events(&query, viewer).await?;
    Ok(Json(ListEventsResponse {
        total: events.len(),
        events,
    }))
}

pub async fn pending_confirmations(
    State(state): State<AppState>,
    Actor(viewer): Actor,
    Query(params): Query<PendingQuery>,
) -> ApiResult<Json<PendingResponse>> {
    let events = state
        .actions
        .pending_confirmations(params.child_id, viewer)
        .await?;
    Ok(Json(PendingResponse {
        count: events.len(),
        events,
    }))
}

pub async fn home_stay_candidates(
    State(state): State<AppState>,
    Actor(viewer): Actor,
    Query(params): Query<CandidatesQuery>,
) -> ApiResult<Json<CandidatesResponse>> {
    let candidates = state
        .home_stays
        .candidates(params.child_id, viewer)
        .await?;
    Ok(Json(CandidatesResponse {
        count: candidates.len(),
        candidates,
    }))
}

pub async fn propose_from_candidate(
    State(state): State<AppState>,
    Actor(proposer): Actor,
    Json(payload): Json<ProposeCandidateRequest>,
) -> ApiResult<(StatusCode, Json<ProposeHomeDayResponse>)> {
    payload.validate()?;

    let candidate = state
        .home_stays
        .find(
            payload.child_id,
            payload.source_id,
            &payload.external_event_id,
            proposer,
        )
        .await?;
    let outcome = state
        .actions
        .propose_from_candidate(payload.child_id, &candidate, proposer)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

pub async fn propose_home_day(
    State(state): State<AppState>,
    Actor(proposer): Actor,
    Json(payload): Json<ProposeHomeDayRequest>,
) -> ApiResult<(StatusCode, Json<ProposeHomeDayResponse>)> {
    payload.validate()?;

    let proposal = HomeDayProposal {
        child_id: payload.child_id,
        home_id: payload.home_id,
        start_at: payload.start_at,
        end_at: payload.end_at,
        all_day: payload.all_day,
        reason: payload.reason,
    };
    let outcome = state.actions.propose_home_day(proposal, proposer).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

pub async fn confirm_home_day(
    State(state): State<AppState>,
    Actor(confirmer): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EventResponse>> {
    let event = state.actions.confirm_home_day(id, confirmer).await?;
    Ok(Json(EventResponse { event }))
}

pub async fn reject_home_day(
    State(state): State<AppState>,
    Actor(rejecter): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EventResponse>> {
    let event = state.actions.reject_home_day(id, rejecter).await?;
    Ok(Json(EventResponse { event }))
}

pub async fn create_event(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<EventResponse>)> {
    payload.validate()?;

    let input = NewEvent {
        child_id: payload.child_id,
        title: payload.title,
        description: payload.description,
        start_at: payload.start_at,
        end_at: payload.end_at,
        all_day: payload.all_day,
    };
    let event = state.actions.create_event(input, actor).await?;
    Ok((StatusCode::CREATED, Json(EventResponse { event })))
}

pub async fn create_travel(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<CreateTravelRequest>,
) -> ApiResult<(StatusCode, Json<EventResponse>)> {
    payload.validate()?;

    let input = NewTravel {
        child_id: payload.child_id,
        title: payload.title,
        description: payload.description,
        start_at: payload.start_at,
        end_at: payload.end_at,
        all_day: payload.all_day,
        from_home_id: payload.from_home_id,
        from_location: payload.from_location,
        to_home_id: payload.to_home_id,
        to_location: payload.to_location,
    };
    let event = state.actions.create_travel(input, actor).await?;
    Ok((StatusCode::CREATED, Json(EventResponse { event })))
}

pub async fn update_event(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateEventRequest>,
) -> ApiResult<Json<EventResponse>> {
    payload.validate()?;
    if payload.is_empty() {
        return Err(ApiError::bad_request("Nothing to update"));
    }

    let event = state
        .actions
        .update_event(id, EventPatch::from(payload), actor)
        .await?;
    Ok(Json(EventResponse { event }))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.actions.delete_event(id, actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

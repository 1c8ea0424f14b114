use axum::{
    extract::{Query, State},
    Json,
};

use crate::error::ApiResult;
use crate::state::{Actor, AppState};
use shared::api::{
    SyncSourceStatus, SyncStatusQuery, SyncStatusResponse, TriggerSyncRequest, TriggerSyncResponse,
};
use shared::WorkflowError;

/// Flag sources for the polling service; the sync itself runs there.
pub async fn trigger_sync(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<TriggerSyncRequest>,
) -> ApiResult<Json<TriggerSyncResponse>> {
    let source_ids = state
        .sources
        .request_sync(payload.child_id, payload.source_id)
        .await?;

    if payload.source_id.is_some() && source_ids.is_empty() {
        return Err(WorkflowError::not_found("Calendar source").into());
    }

    tracing::info!(
        child_id = %payload.child_id,
        actor = %actor,
        count = source_ids.len(),
        "Sync requested"
    );

    let message = if source_ids.is_empty() {
        "No calendars are connected".to_string()
    } else {
        format!("Sync requested for {} calendar(s)", source_ids.len())
    };
    Ok(Json(TriggerSyncResponse {
        triggered: !source_ids.is_empty(),
        message,
        source_ids,
    }))
}

pub async fn get_sync_status(
    State(state): State<AppState>,
    Actor(_viewer): Actor,
    Query(params): Query<SyncStatusQuery>,
) -> ApiResult<Json<SyncStatusResponse>> {
    let sources = state
        .sources
        .list_sources_for_child(params.child_id)
        .await?
        .into_iter()
        .map(|source| SyncSourceStatus {
            source_id: source.id,
            source_name: source.name,
            provider: source.provider,
            status: source.sync_status,
            last_sync: source.last_synced_at,
            sync_requested: source.sync_requested,
            error: source.last_sync_error,
        })
        .collect();

    Ok(Json(SyncStatusResponse { sources }))
}

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{events, health, sync};
use crate::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))

        // Event routes
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/travel", post(events::create_travel))
        .route("/events/home-days", post(events::propose_home_day))
        .route("/events/pending", get(events::pending_confirmations))
        .route("/events/candidates", get(events::home_stay_candidates))
        .route("/events/candidates/propose", post(events::propose_from_candidate))
        .route(
            "/events/:id",
            put(events::update_event).delete(events::delete_event),
        )
        .route("/events/:id/confirm", post(events::confirm_home_day))
        .route("/events/:id/reject", post(events::reject_home_day))

        // Sync routes
        .route("/sync/trigger", post(sync::trigger_sync))
        .route("/sync/status", get(sync::get_sync_status))
}

pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

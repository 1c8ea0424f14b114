//! Shared handler state and the acting-user extractor.

use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::actions::CalendarActions;
use crate::error::ApiError;
use crate::home_stay::HomeStayFinder;
use crate::store::SourceStore;

/// Header carrying the authenticated user id, set by the upstream gateway
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub actions: Arc<CalendarActions>,
    pub sources: Arc<dyn SourceStore>,
    pub home_stays: Arc<HomeStayFinder>,
}

impl AppState {
    pub fn new(
        actions: CalendarActions,
        sources: Arc<dyn SourceStore>,
        home_stays: HomeStayFinder,
    ) -> Self {
        Self {
            actions: Arc::new(actions),
            sources,
            home_stays: Arc::new(home_stays),
        }
    }
}

/// The user a request acts as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;

        Uuid::parse_str(value.trim())
            .map(Actor)
            .map_err(|_| ApiError::Unauthenticated)
    }
}

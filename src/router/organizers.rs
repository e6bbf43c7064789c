//! Public organizer pages.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};

use super::binary;
use crate::AppState;
use crate::error::Result;
use crate::event::Event;
use crate::user::OrganizerProfile;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(profile))
        .route("/{id}/events", get(events))
        .route("/{id}/avatar", get(avatar))
}

async fn profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<OrganizerProfile>> {
    Ok(Json(state.events.organizer(id).await?))
}

/// Public, non-blocked events by start time.
async fn events(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Vec<Event>>> {
    Ok(Json(state.events.organizer_events(id).await?))
}

async fn avatar(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response> {
    let avatar = state.events.organizer_avatar(id).await?;
    Ok(binary(avatar.content_type, avatar.content))
}

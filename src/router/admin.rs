//! Moderation API. Every route requires the admin role.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router, middleware};

use super::Changed;
use crate::AppState;
use crate::category::{Category, CreateCategory, UpdateCategory};
use crate::error::Result;
use crate::event::Event;
use crate::middleware::{Valid, require_admin};
use crate::user::User;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/events", get(events))
        .route("/events/{id}/block", patch(block_event))
        .route("/events/{id}/unblock", patch(unblock_event))
        .route("/organizers/{id}/block", patch(block_organizer))
        .route("/organizers/{id}/unblock", patch(unblock_organizer))
        .route("/users", get(users))
        .route("/users/{id}/block", patch(block_user))
        .route("/users/{id}/unblock", patch(unblock_user))
        .route("/categories", get(categories).post(create_category))
        .route("/categories/{id}", patch(update_category))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}

/// Active and blocked events.
async fn events(State(state): State<AppState>) -> Result<Json<Vec<Event>>> {
    Ok(Json(state.moderation.events().await?))
}

async fn block_event(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Changed>> {
    state.moderation.block_event(id).await?;
    Ok(Json(Changed::new("blocked")))
}

async fn unblock_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Changed>> {
    state.moderation.unblock_event(id).await?;
    Ok(Json(Changed::new("active")))
}

/// Also cancels every active event of the organizer.
async fn block_organizer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Changed>> {
    state.moderation.block_organizer(id).await?;
    Ok(Json(Changed::new("blocked")))
}

async fn unblock_organizer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Changed>> {
    state.moderation.unblock_organizer(id).await?;
    Ok(Json(Changed::new("unblocked")))
}

async fn users(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    Ok(Json(state.moderation.users().await?))
}

/// Also cancels every current registration of the user.
async fn block_user(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Changed>> {
    state.moderation.block_user(id).await?;
    Ok(Json(Changed::new("blocked")))
}

async fn unblock_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Changed>> {
    state.moderation.unblock_user(id).await?;
    Ok(Json(Changed::new("unblocked")))
}

/// Every category, archived ones included.
async fn categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(state.categories.list_all().await?))
}

async fn create_category(
    State(state): State<AppState>,
    Valid(body): Valid<CreateCategory>,
) -> Result<(StatusCode, Json<Category>)> {
    Ok((StatusCode::CREATED, Json(state.categories.create(body).await?)))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Valid(body): Valid<UpdateCategory>,
) -> Result<Json<Category>> {
    Ok(Json(state.categories.update(id, body).await?))
}

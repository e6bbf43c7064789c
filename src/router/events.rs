//! Event catalog, images and per-event registrations.

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::{Changed, Created, IMAGE_LIMIT, binary, upload};
use crate::AppState;
use crate::error::{Result, ServerError};
use crate::event::{CreateEventRequest, Event, EventDetail, ListParams, Page};
use crate::export::ExportFormat;
use crate::middleware::{Auth, MaybeAuth, Valid};
use crate::registration::{CreateRegistrationRequest, Registration};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(detail))
        .route("/{id}/cancel", post(cancel))
        .route(
            "/{id}/images",
            post(add_image).layer(DefaultBodyLimit::max(IMAGE_LIMIT)),
        )
        .route("/{id}/images/{image_id}", get(image))
        .route("/{id}/registrations", get(registrations).post(register))
        .route("/{id}/registrations/export", get(export))
}

/// One page of public events.
async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Event>>> {
    Ok(Json(state.events.list(params).await?))
}

async fn create(
    State(state): State<AppState>,
    Auth(claims): Auth,
    Valid(body): Valid<CreateEventRequest>,
) -> Result<(StatusCode, Json<Created>)> {
    let id = state.events.create(&claims, body).await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

async fn detail(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<EventDetail>> {
    Ok(Json(state.events.get(id).await?))
}

/// Owner only, warns current registrants.
async fn cancel(
    State(state): State<AppState>,
    Auth(claims): Auth,
    Path(id): Path<i64>,
) -> Result<Json<Changed>> {
    let organizer_id = claims.user_id().ok_or(ServerError::Unauthorized)?;
    state.events.cancel(id, organizer_id).await?;
    Ok(Json(Changed::new("cancelled")))
}

async fn add_image(
    State(state): State<AppState>,
    Auth(claims): Auth,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Created>)> {
    let organizer_id = claims.user_id().ok_or(ServerError::Unauthorized)?;
    let (image, file_name) = upload(multipart, "image").await?;
    let image_id = state
        .events
        .add_image(id, organizer_id, image, file_name)
        .await?;
    tracing::info!(event_id = id, image_id, "event image added");

    Ok((StatusCode::CREATED, Json(Created { id: image_id })))
}

async fn image(
    State(state): State<AppState>,
    Path((id, image_id)): Path<(i64, i64)>,
) -> Result<Response> {
    let image = state.events.image(id, image_id).await?;
    Ok(binary(image.content_type, image.content))
}

/// Sign up for an event, with or without an account.
async fn register(
    State(state): State<AppState>,
    MaybeAuth(claims): MaybeAuth,
    Path(id): Path<i64>,
    Valid(body): Valid<CreateRegistrationRequest>,
) -> Result<(StatusCode, Json<Created>)> {
    let registration_id = state
        .registrations
        .create(id, body, claims.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(Created { id: registration_id })))
}

/// Every registration of the event, for its organizer.
async fn registrations(
    State(state): State<AppState>,
    Auth(claims): Auth,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Registration>>> {
    Ok(Json(state.registrations.list_for_event(id, &claims).await?))
}

#[derive(Debug, Default, Deserialize)]
struct ExportParams {
    format: Option<String>,
}

async fn export(
    State(state): State<AppState>,
    Auth(claims): Auth,
    Path(id): Path<i64>,
    Query(params): Query<ExportParams>,
) -> Result<Response> {
    let format = ExportFormat::parse(params.format.as_deref())?;
    let export = state.registrations.export(id, &claims, format).await?;

    Ok((
        [
            (header::CONTENT_TYPE, export.content_type.to_owned()),
            (header::CONTENT_DISPOSITION, export.content_disposition()),
        ],
        export.content,
    )
        .into_response())
}

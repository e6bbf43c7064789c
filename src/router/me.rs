//! Routes about the authenticated caller.

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};

use super::{IMAGE_LIMIT, upload};
use crate::AppState;
use crate::error::Result;
use crate::middleware::Auth;
use crate::registration::MyRegistration;
use crate::token::Claims;
use crate::user::ParticipantProfile;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(me))
        .route("/profile", get(profile))
        .route("/registrations", get(registrations))
        // `PUT /me/avatar` takes a multipart `avatar` file.
        .route(
            "/avatar",
            put(avatar).layer(DefaultBodyLimit::max(IMAGE_LIMIT)),
        )
}

/// Claims carried by the token.
async fn me(Auth(claims): Auth) -> Json<Claims> {
    Json(claims)
}

async fn profile(
    State(state): State<AppState>,
    Auth(claims): Auth,
) -> Result<Json<ParticipantProfile>> {
    Ok(Json(state.registrations.profile(&claims).await?))
}

async fn registrations(
    State(state): State<AppState>,
    Auth(claims): Auth,
) -> Result<Json<Vec<MyRegistration>>> {
    Ok(Json(state.registrations.mine(&claims).await?))
}

async fn avatar(
    State(state): State<AppState>,
    Auth(claims): Auth,
    multipart: Multipart,
) -> Result<StatusCode> {
    let (image, _) = upload(multipart, "avatar").await?;
    state.events.set_avatar(&claims, image).await?;
    tracing::info!(user_id = %claims.sub, "organizer avatar updated");

    Ok(StatusCode::NO_CONTENT)
}

//! Registration lifecycle.

use axum::extract::{Path, State};
use axum::routing::{delete, patch};
use axum::{Json, Router};

use super::Changed;
use crate::AppState;
use crate::error::Result;
use crate::middleware::Auth;
use crate::registration::RegistrationStatus;

pub fn router() -> Router<AppState> {
    Router::new()
        // `DELETE /registrations/{id}`, participant or organizer.
        .route("/{id}", delete(cancel))
        // `PATCH /registrations/{id}/check-in`, organizer only.
        .route("/{id}/check-in", patch(check_in))
}

async fn cancel(
    State(state): State<AppState>,
    Auth(claims): Auth,
    Path(id): Path<i64>,
) -> Result<Json<Changed>> {
    state.registrations.cancel(id, &claims).await?;
    Ok(Json(Changed::new(RegistrationStatus::Cancelled)))
}

async fn check_in(
    State(state): State<AppState>,
    Auth(claims): Auth,
    Path(id): Path<i64>,
) -> Result<Json<Changed>> {
    let status = state.registrations.check_in(id, &claims).await?;
    Ok(Json(Changed::new(status)))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::Value;

    use super::*;
    use crate::event::{CreateEventRequest, CreateTicketType};
    use crate::make_request;
    use crate::router::tests;
    use crate::tests::Fixture;
    use crate::token::Claims;

    async fn event(fixture: &Fixture, organizer: &Claims) -> i64 {
        let start_at = Utc.with_ymd_and_hms(2030, 2, 1, 9, 0, 0).unwrap();
        fixture
            .state
            .events
            .create(organizer, CreateEventRequest {
                title: "Conference".into(),
                description: None,
                start_at,
                end_at: start_at + Duration::hours(8),
                location: None,
                is_online: true,
                is_public: true,
                ticket_types: vec![CreateTicketType {
                    name: "Seat".into(),
                    price: Decimal::ZERO,
                    capacity: 2,
                }],
                category_ids: vec![],
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_check_in_then_cancel() {
        let fixture = Fixture::new().await;
        let organizer = fixture.organizer("org@example.com").await;
        let participant = fixture.participant("grace@example.com").await;
        let event_id = event(&fixture, &organizer).await;
        let id = fixture.register(event_id, "grace@example.com").await;

        let organizer = fixture.token(&organizer);
        let participant = fixture.token(&participant);
        let check_in = format!("/registrations/{id}/check-in");
        let cancel = format!("/registrations/{id}");

        let response =
            make_request(Some(&participant), fixture.app(), Method::PATCH, &check_in, String::default())
                .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        for _ in 0..2 {
            let response =
                make_request(Some(&organizer), fixture.app(), Method::PATCH, &check_in, String::default())
                    .await;
            assert_eq!(response.status(), StatusCode::OK);
            let body: Changed = tests::json(response).await;
            assert_eq!(body.status, "checked_in");
        }

        let response =
            make_request(Some(&participant), fixture.app(), Method::DELETE, &cancel, String::default())
                .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(tests::json::<Changed>(response).await.status, "cancelled");

        // Terminal.
        let response =
            make_request(Some(&participant), fixture.app(), Method::DELETE, &cancel, String::default())
                .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response =
            make_request(Some(&organizer), fixture.app(), Method::PATCH, &check_in, String::default())
                .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let problem: Value = tests::json(response).await;
        assert_eq!(problem["reason"], "invalid_state");
    }

    #[tokio::test]
    async fn test_cancel_requires_token() {
        let fixture = Fixture::new().await;
        let response =
            make_request(None, fixture.app(), Method::DELETE, "/registrations/1", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

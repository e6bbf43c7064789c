//! Account creation and sign in.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use crate::AppState;
use crate::error::Result;
use crate::middleware::Valid;
use crate::user::{LoginRequest, RegisterRequest, Registered, Session};

pub fn router() -> Router<AppState> {
    Router::new()
        // `POST /auth/register` goes to `register`.
        .route("/register", post(register))
        // `POST /auth/login` goes to `login`.
        .route("/login", post(login))
}

/// Handler to create an organizer or participant account.
async fn register(
    State(state): State<AppState>,
    Valid(body): Valid<RegisterRequest>,
) -> Result<(StatusCode, Json<Registered>)> {
    let created = state.users.register(body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Handler to exchange credentials for a bearer token.
async fn login(
    State(state): State<AppState>,
    Valid(body): Valid<LoginRequest>,
) -> Result<Json<Session>> {
    Ok(Json(state.users.login(body).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::{Value, json};

    use super::*;
    use crate::make_request;
    use crate::router::tests;
    use crate::tests::Fixture;
    use crate::user::Role;

    #[tokio::test]
    async fn test_register_then_login() {
        let fixture = Fixture::new().await;

        let body = json!({
            "email": "Org@Example.com",
            "password": "password123",
            "role": "organizer",
            "name": "Rust Paris",
        });
        let response =
            make_request(None, fixture.app(), Method::POST, "/auth/register", body.to_string())
                .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: Registered = tests::json(response).await;
        assert_eq!(created.email, "org@example.com");
        assert_eq!(created.role, Role::Organizer);

        let body = json!({ "email": "org@example.com", "password": "password123" });
        let response =
            make_request(None, fixture.app(), Method::POST, "/auth/login", body.to_string()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let session: Session = tests::json(response).await;
        assert_eq!(session.token_type, "Bearer");

        let claims = fixture.state.token.decode(&session.token).unwrap();
        assert_eq!(claims.user_id(), Some(created.id));
        assert_eq!(claims.roles, [Role::Organizer]);
    }

    #[tokio::test]
    async fn test_register_errors() {
        let fixture = Fixture::new().await;

        let body = json!({ "email": "not-an-email", "password": "short", "role": "participant" });
        let response =
            make_request(None, fixture.app(), Method::POST, "/auth/register", body.to_string())
                .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let problem: Value = tests::json(response).await;
        assert_eq!(problem["reason"], "validation");
        assert_eq!(problem["errors"].as_array().unwrap().len(), 2);

        fixture.participant("ada@example.com").await;
        let body = json!({
            "email": "ada@example.com",
            "password": "password123",
            "role": "participant",
            "firstName": "Ada",
            "lastName": "Byron",
        });
        let response =
            make_request(None, fixture.app(), Method::POST, "/auth/register", body.to_string())
                .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_login_failure() {
        let fixture = Fixture::new().await;
        fixture.participant("ada@example.com").await;

        let body = json!({ "email": "ada@example.com", "password": "wrong password" });
        let response =
            make_request(None, fixture.app(), Method::POST, "/auth/login", body.to_string()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let problem: Value = tests::json(response).await;
        assert_eq!(problem["reason"], "unauthorized");
    }
}

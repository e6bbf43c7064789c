//! Public category list.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::category::CategorySummary;
use crate::error::Result;

/// Non-archived categories, by sort order.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<CategorySummary>>> {
    Ok(Json(state.categories.list_public().await?))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use super::*;
    use crate::make_request;
    use crate::router::tests;
    use crate::tests::Fixture;

    #[tokio::test]
    async fn test_archived_are_hidden() {
        let fixture = Fixture::new().await;
        let music = fixture.category("Music").await;
        let old = fixture.category("Old").await;
        fixture.store.archive_category(old);

        let response =
            make_request(None, fixture.app(), Method::GET, "/categories", String::default()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let categories: Vec<CategorySummary> = tests::json(response).await;
        assert_eq!(categories, [CategorySummary {
            id: music,
            name: "Music".into(),
        }]);
    }
}

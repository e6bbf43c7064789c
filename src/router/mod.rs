//! HTTP API.
mod admin;
mod auth;
mod categories;
mod events;
mod me;
mod organizers;
mod registrations;
mod status;

use axum::Router;
use axum::extract::Multipart;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::user::Binary;

/// Upload size accepted on image routes.
pub const IMAGE_LIMIT: usize = 10 * 1024 * 1024;
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Body of `201 Created` responses.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Created {
    pub id: i64,
}

/// Body of state changing responses.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Changed {
    pub status: String,
}

impl Changed {
    pub fn new(status: impl ToString) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

/// Raw content with its media type.
fn binary(content_type: String, content: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, content_type)], content).into_response()
}

/// Read the file part named `field`, or the first file part.
async fn upload(mut multipart: Multipart, field: &str) -> Result<(Binary, Option<String>)> {
    let mut fallback = None;

    while let Some(part) = multipart.next_field().await? {
        let named = part.name() == Some(field);
        if !named && (fallback.is_some() || part.file_name().is_none()) {
            continue;
        }

        let file_name = part.file_name().map(str::to_owned);
        let content_type = part
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_owned();
        let file = (
            Binary {
                content: part.bytes().await?.to_vec(),
                content_type,
            },
            file_name,
        );

        if named {
            return Ok(file);
        }
        fallback = Some(file);
    }

    fallback.ok_or_else(|| ServerError::InvalidInput(format!("missing `{field}` file")))
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /health`, `GET /status.json` and `GET /metrics`.
        .route("/health", get(status::health))
        .route("/status.json", get(status::status))
        .route("/metrics", get(status::metrics))
        .nest("/auth", auth::router())
        .nest("/me", me::router())
        // `GET /categories` lists usable categories.
        .route("/categories", get(categories::list))
        .nest("/events", events::router())
        .nest("/registrations", registrations::router())
        .nest("/organizers", organizers::router())
        // Admin role required.
        .nest("/admin", admin::router(state))
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::body::Body;
    use axum::http::Response;
    use http_body_util::BodyExt;
    use serde::de::DeserializeOwned;

    /// Collect and parse a JSON body.
    pub async fn json<T: DeserializeOwned>(response: Response<Body>) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    pub async fn bytes(response: Response<Body>) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    /// `multipart/form-data` body holding one file.
    pub fn multipart(field: &str, file_name: &str, content: &[u8]) -> (String, Vec<u8>) {
        const BOUNDARY: &str = "meetup-boundary";

        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        (format!("multipart/form-data; boundary={BOUNDARY}"), body)
    }
}

//! Meetup is an event registration and ticketing API.

#![forbid(unsafe_code)]
#![deny(unused_mut)]
pub mod category;
pub mod config;
mod crypto;
pub mod database;
pub mod error;
pub mod event;
mod export;
pub mod mail;
#[cfg(test)]
mod memory;
mod middleware;
pub mod moderation;
pub mod registration;
pub mod reminder;
mod router;
pub mod telemetry;
mod token;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use category::{CategoryRepository, CategoryService};
use crypto::PasswordManager;
use event::{EventRepository, EventService};
use mail::{LogTransport, MailManager, SmtpTransport, Transport};
use moderation::{ModerationRepository, ModerationService};
use registration::{RegistrationRepository, RegistrationService};
use reminder::{ReminderRepository, ReminderSweep};
use token::TokenManager;
use user::{UserRepository, UserService};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// Storage adapters, one per aggregate.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub events: Arc<dyn EventRepository>,
    pub registrations: Arc<dyn RegistrationRepository>,
    pub moderation: Arc<dyn ModerationRepository>,
    pub reminders: Arc<dyn ReminderRepository>,
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub token: TokenManager,
    pub mail: MailManager,
    pub users: Arc<UserService>,
    pub categories: Arc<CategoryService>,
    pub events: Arc<EventService>,
    pub registrations: Arc<RegistrationService>,
    pub moderation: Arc<ModerationService>,
    pub reminders: Arc<ReminderSweep>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire every service on top of `repositories`.
    pub fn new(
        config: Arc<config::Configuration>,
        repositories: Repositories,
        pwd: PasswordManager,
        token: TokenManager,
        mail: MailManager,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let Repositories {
            users,
            categories,
            events,
            registrations,
            moderation,
            reminders,
        } = repositories;

        Self {
            users: Arc::new(UserService::new(Arc::clone(&users), pwd, token.clone())),
            categories: Arc::new(CategoryService::new(Arc::clone(&categories))),
            events: Arc::new(EventService::new(
                Arc::clone(&events),
                categories,
                Arc::clone(&registrations),
                Arc::clone(&users),
                mail.clone(),
            )),
            registrations: Arc::new(RegistrationService::new(
                Arc::clone(&events),
                Arc::clone(&registrations),
                Arc::clone(&users),
                mail.clone(),
            )),
            moderation: Arc::new(ModerationService::new(
                moderation,
                events,
                Arc::clone(&registrations),
                users,
                mail.clone(),
            )),
            reminders: Arc::new(ReminderSweep::new(reminders, registrations, mail.clone())),
            config,
            token,
            mail,
            metrics,
        }
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    router::router(state.clone())
        .with_state(state)
        .route_layer(axum::middleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    config: Arc<config::Configuration>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    config.check()?;

    let Some(postgres) = &config.postgres else {
        return Err(config::ConfigError::Missing("postgres").into());
    };
    let db = database::Database::new(postgres).await?;

    // execute migrations scripts on start.
    db.migrate().await?;

    let pwd = PasswordManager::new(config.argon2.clone())?;

    // handle jwt.
    let secret = config
        .token
        .as_ref()
        .map(|t| t.secret.as_str())
        .ok_or(config::ConfigError::Missing("token.secret"))?;
    let token = TokenManager::new(secret, config.issuer(), config.audience());

    // handle mail sender.
    let (transport, queue_size, workers): (Arc<dyn Transport>, _, _) = match &config.mail {
        Some(cfg) => (
            Arc::new(SmtpTransport::new(cfg)?),
            cfg.queue_size.unwrap_or(mail::DEFAULT_QUEUE_SIZE),
            cfg.workers.unwrap_or(mail::DEFAULT_WORKERS),
        ),
        None => {
            tracing::warn!("missing `mail` entry on `config.yaml` file, mails will only be logged");
            (Arc::new(LogTransport), mail::DEFAULT_QUEUE_SIZE, mail::DEFAULT_WORKERS)
        },
    };
    let (mail, _dispatcher) = MailManager::new(transport, queue_size, workers);

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "prometheus recorder not installed");
            None
        },
    };

    Ok(AppState::new(
        Arc::clone(&config),
        db.repositories(),
        pwd,
        token,
        mail,
        metrics,
    ))
}

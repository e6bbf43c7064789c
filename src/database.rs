//! PostgreSQL connection pool.
use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::Repositories;
use crate::category::PgCategoryRepository;
use crate::config::Postgres;
use crate::event::PgEventRepository;
use crate::moderation::PgModerationRepository;
use crate::registration::PgRegistrationRepository;
use crate::reminder::PgReminderRepository;
use crate::user::PgUserRepository;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "meetup";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub postgres: PgPool,
}

impl Database {
    /// Init database connections.
    pub async fn new(config: &Postgres) -> Result<Self, sqlx::Error> {
        let addr = match &config.url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}/{}",
                config.username.as_deref().unwrap_or(DEFAULT_CREDENTIALS),
                config.password.as_deref().unwrap_or(DEFAULT_CREDENTIALS),
                config.address,
                config.database.as_deref().unwrap_or(DEFAULT_DATABASE_NAME),
            ),
        };
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size.unwrap_or(DEFAULT_POOL_SIZE));
        let postgres = pool.connect(&addr).await?;

        tracing::info!(
            hostname = %config.address,
            db = config.database.as_deref().unwrap_or(DEFAULT_DATABASE_NAME),
            "postgres connected"
        );

        Ok(Self { postgres })
    }

    /// Execute migrations scripts.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.postgres).await
    }

    /// PostgreSQL adapters for every repository.
    pub fn repositories(&self) -> Repositories {
        let pool = self.postgres.clone();

        Repositories {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            categories: Arc::new(PgCategoryRepository::new(pool.clone())),
            events: Arc::new(PgEventRepository::new(pool.clone())),
            registrations: Arc::new(PgRegistrationRepository::new(pool.clone())),
            moderation: Arc::new(PgModerationRepository::new(pool.clone())),
            reminders: Arc::new(PgReminderRepository::new(pool)),
        }
    }
}

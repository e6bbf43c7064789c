//! Registration persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{MyRegistration, MyRegistrationRecord, NewRegistration, Registration, RegistrationRecord};
use crate::error::{Result, ServerError};

#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    /// A non-cancelled registration exists for `(event, email)`.
    async fn has_active(&self, event_id: i64, email: &str) -> Result<bool>;

    /// Non-cancelled registrations of a ticket type.
    async fn count_active(&self, ticket_type_id: i64) -> Result<i64>;

    /// Atomically re-check uniqueness and capacity, then insert as
    /// `registered`. Concurrent callers never oversell `capacity`.
    async fn reserve(&self, registration: &NewRegistration, capacity: i32) -> Result<i64>;

    async fn find(&self, id: i64) -> Result<Option<Registration>>;

    /// `registered | checked_in -> cancelled`. `false` when nothing changed.
    async fn cancel(&self, id: i64) -> Result<bool>;

    /// `registered -> checked_in`. `false` when nothing changed.
    async fn check_in(&self, id: i64, at: DateTime<Utc>) -> Result<bool>;

    /// Non-cancelled registrations of an event, by last name, first name, id.
    async fn active_for_event(&self, event_id: i64) -> Result<Vec<Registration>>;

    /// Every registration of an event, by last name, first name, id.
    async fn for_event(&self, event_id: i64) -> Result<Vec<Registration>>;

    /// Registrations owned by a user ID or made with its email.
    async fn for_user(&self, user_id: i64, email: &str) -> Result<Vec<MyRegistration>>;
}

const SELECT_REGISTRATION: &str = r#"
    SELECT id, event_id, ticket_type_id, user_id, email, first_name, last_name,
        middle_name, phone, status, checked_in_at, created_at
    FROM registrations
"#;

/// PostgreSQL registration repository.
#[derive(Clone)]
pub struct PgRegistrationRepository {
    pool: PgPool,
}

impl PgRegistrationRepository {
    /// Create a new [`PgRegistrationRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn by_event(&self, event_id: i64, active_only: bool) -> Result<Vec<Registration>> {
        let query = format!(
            "{SELECT_REGISTRATION} WHERE event_id = $1 AND ($2 = FALSE OR status <> 'cancelled')
                ORDER BY last_name, first_name, id"
        );

        sqlx::query_as::<_, RegistrationRecord>(&query)
            .bind(event_id)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Registration::try_from)
            .collect()
    }
}

#[async_trait]
impl RegistrationRepository for PgRegistrationRepository {
    async fn has_active(&self, event_id: i64, email: &str) -> Result<bool> {
        Ok(sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM registrations
                WHERE event_id = $1 AND email = $2 AND status <> 'cancelled')"#,
        )
        .bind(event_id)
        .bind(email)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn count_active(&self, ticket_type_id: i64) -> Result<i64> {
        Ok(sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM registrations
                WHERE ticket_type_id = $1 AND status <> 'cancelled'"#,
        )
        .bind(ticket_type_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn reserve(&self, registration: &NewRegistration, capacity: i32) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        // Serialize reservations on the same ticket type.
        sqlx::query("SELECT id FROM ticket_types WHERE id = $1 FOR UPDATE")
            .bind(registration.ticket_type_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ServerError::NotFound)?;

        let duplicate: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM registrations
                WHERE event_id = $1 AND email = $2 AND status <> 'cancelled')"#,
        )
        .bind(registration.event_id)
        .bind(&registration.email)
        .fetch_one(&mut *tx)
        .await?;
        if duplicate {
            return Err(ServerError::Conflict("already registered for this event".into()));
        }

        let taken: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM registrations
                WHERE ticket_type_id = $1 AND status <> 'cancelled'"#,
        )
        .bind(registration.ticket_type_id)
        .fetch_one(&mut *tx)
        .await?;
        if taken >= i64::from(capacity) {
            return Err(ServerError::CapacityExceeded);
        }

        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO registrations
                (event_id, ticket_type_id, user_id, email, first_name, last_name, middle_name, phone, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'registered')
                RETURNING id"#,
        )
        .bind(registration.event_id)
        .bind(registration.ticket_type_id)
        .bind(registration.user_id)
        .bind(&registration.email)
        .bind(&registration.first_name)
        .bind(&registration.last_name)
        .bind(registration.middle_name.as_deref())
        .bind(registration.phone.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| match ServerError::from(err) {
            // Same email racing on another ticket type of the event.
            ServerError::Conflict(_) => {
                ServerError::Conflict("already registered for this event".into())
            },
            err => err,
        })?;

        tx.commit().await?;

        Ok(id)
    }

    async fn find(&self, id: i64) -> Result<Option<Registration>> {
        let query = format!("{SELECT_REGISTRATION} WHERE id = $1");

        sqlx::query_as::<_, RegistrationRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Registration::try_from)
            .transpose()
    }

    async fn cancel(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE registrations SET status = 'cancelled'
                WHERE id = $1 AND status IN ('registered', 'checked_in')"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn check_in(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE registrations SET status = 'checked_in', checked_in_at = $2
                WHERE id = $1 AND status = 'registered'"#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn active_for_event(&self, event_id: i64) -> Result<Vec<Registration>> {
        self.by_event(event_id, true).await
    }

    async fn for_event(&self, event_id: i64) -> Result<Vec<Registration>> {
        self.by_event(event_id, false).await
    }

    async fn for_user(&self, user_id: i64, email: &str) -> Result<Vec<MyRegistration>> {
        sqlx::query_as::<_, MyRegistrationRecord>(
            r#"SELECT r.id, r.event_id, e.title AS event_title, e.start_at AS event_start_at,
                    t.name AS ticket_type_name, r.status, r.checked_in_at, r.created_at
                FROM registrations r
                JOIN events e ON e.id = r.event_id
                JOIN ticket_types t ON t.id = r.ticket_type_id
                WHERE r.user_id = $1 OR r.email = $2
                ORDER BY e.start_at DESC, r.id DESC"#,
        )
        .bind(user_id)
        .bind(email)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(MyRegistration::try_from)
        .collect()
    }
}

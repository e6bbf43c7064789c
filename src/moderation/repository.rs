//! Moderation persistence.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Result;
use crate::event::{Event, EventRepository, PgEventRepository};
use crate::registration::{Registration, RegistrationRecord};
use crate::user::Role;

#[async_trait]
pub trait ModerationRepository: Send + Sync {
    /// Block an organizer and cancel its active events in one transaction.
    ///
    /// Returns the events that were cancelled, `None` when the user does not
    /// hold the organizer role.
    async fn block_organizer(&self, user_id: i64) -> Result<Option<Vec<Event>>>;

    /// Block a user and cancel its current registrations in one transaction.
    ///
    /// Returns the registrations as they were before cancellation, `None`
    /// when the user does not exist.
    async fn block_user(&self, user_id: i64) -> Result<Option<Vec<Registration>>>;

    /// Clear the blocked flag. With `role`, the user must hold it.
    /// `false` when no such user.
    async fn unblock(&self, user_id: i64, role: Option<Role>) -> Result<bool>;
}

/// PostgreSQL moderation repository.
#[derive(Clone)]
pub struct PgModerationRepository {
    pool: PgPool,
    events: PgEventRepository,
}

impl PgModerationRepository {
    /// Create a new [`PgModerationRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: PgEventRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl ModerationRepository for PgModerationRepository {
    async fn block_organizer(&self, user_id: i64) -> Result<Option<Vec<Event>>> {
        let mut tx = self.pool.begin().await?;

        let is_organizer: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM user_roles WHERE user_id = $1 AND role = 'organizer')"#,
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        if !is_organizer {
            return Ok(None);
        }

        sqlx::query("UPDATE users SET is_blocked = TRUE WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let cancelled: Vec<i64> = sqlx::query_scalar(
            r#"UPDATE events SET status = 'cancelled'
                WHERE organizer_id = $1 AND status = 'active'
                RETURNING id"#,
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut events = Vec::with_capacity(cancelled.len());
        for id in cancelled {
            if let Some(event) = self.events.find(id).await? {
                events.push(event);
            }
        }
        events.sort_by_key(|e| (e.start_at, e.id));

        Ok(Some(events))
    }

    async fn block_user(&self, user_id: i64) -> Result<Option<Vec<Registration>>> {
        let mut tx = self.pool.begin().await?;

        let blocked = sqlx::query("UPDATE users SET is_blocked = TRUE WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if blocked.rows_affected() == 0 {
            return Ok(None);
        }

        let registrations = sqlx::query_as::<_, RegistrationRecord>(
            r#"WITH previous AS (
                    SELECT id, status FROM registrations
                    WHERE user_id = $1 AND status IN ('registered', 'checked_in')
                    FOR UPDATE
                )
                UPDATE registrations r SET status = 'cancelled'
                FROM previous p
                WHERE r.id = p.id
                RETURNING r.id, r.event_id, r.ticket_type_id, r.user_id, r.email, r.first_name,
                    r.last_name, r.middle_name, r.phone, p.status, r.checked_in_at, r.created_at"#,
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Registration::try_from)
        .collect::<Result<Vec<_>>>()?;

        tx.commit().await?;

        Ok(Some(registrations))
    }

    async fn unblock(&self, user_id: i64, role: Option<Role>) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE users SET is_blocked = FALSE
                WHERE id = $1
                    AND ($2::TEXT IS NULL
                        OR EXISTS (SELECT 1 FROM user_roles WHERE user_id = $1 AND role = $2))"#,
        )
        .bind(user_id)
        .bind(role.map(|r| r.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

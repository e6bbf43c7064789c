//! Reminder ledger persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::ReminderKind;
use crate::error::Result;
use crate::event::{Event, EventRepository, PgEventRepository};

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    /// Active events starting inside `[from, to]` with no `kind` reminder
    /// recorded yet.
    async fn due_events(
        &self,
        kind: ReminderKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>>;

    /// Record a sent reminder. `false` when it was already recorded.
    async fn mark_sent(&self, event_id: i64, kind: ReminderKind, at: DateTime<Utc>) -> Result<bool>;
}

/// PostgreSQL reminder repository.
#[derive(Clone)]
pub struct PgReminderRepository {
    pool: PgPool,
    events: PgEventRepository,
}

impl PgReminderRepository {
    /// Create a new [`PgReminderRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: PgEventRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl ReminderRepository for PgReminderRepository {
    async fn due_events(
        &self,
        kind: ReminderKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"SELECT e.id FROM events e
                WHERE e.status = 'active' AND e.start_at BETWEEN $1 AND $2
                    AND NOT EXISTS (SELECT 1 FROM reminder_sent rs
                        WHERE rs.event_id = e.id AND rs.reminder_type = $3)
                ORDER BY e.start_at, e.id"#,
        )
        .bind(from)
        .bind(to)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(event) = self.events.find(id).await? {
                events.push(event);
            }
        }

        Ok(events)
    }

    async fn mark_sent(&self, event_id: i64, kind: ReminderKind, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"INSERT INTO reminder_sent (event_id, reminder_type, sent_at) VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING"#,
        )
        .bind(event_id)
        .bind(kind.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(all(test, feature = "postgres-tests"))]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;

    use super::*;
    use crate::event::{NewEvent, NewTicketType};
    use crate::user::{NewProfile, NewUser, PgUserRepository, UserRepository};

    #[sqlx::test(migrations = "./migrations")]
    async fn test_ledger_hides_reminded_events(pool: PgPool) {
        let organizer_id = PgUserRepository::new(pool.clone())
            .create(&NewUser {
                email: "org@example.com".into(),
                password_hash: "x".into(),
                profile: NewProfile::Organizer { name: "Org".into() },
            })
            .await
            .unwrap();
        let now = Utc::now();
        let start_at = now + Duration::hours(24);
        let event_id = PgEventRepository::new(pool.clone())
            .create(&NewEvent {
                organizer_id,
                title: "Tomorrow".into(),
                description: None,
                start_at,
                end_at: start_at + Duration::hours(1),
                location: None,
                is_online: true,
                is_public: true,
                ticket_types: vec![NewTicketType {
                    name: "Seat".into(),
                    price: Decimal::ZERO,
                    capacity: 1,
                }],
                category_ids: vec![],
            })
            .await
            .unwrap();

        let repo = PgReminderRepository::new(pool);
        let (from, to) = ReminderKind::Day.window(now);
        assert_eq!(repo.due_events(ReminderKind::Day, from, to).await.unwrap()[0].id, event_id);

        assert!(repo.mark_sent(event_id, ReminderKind::Day, now).await.unwrap());
        assert!(!repo.mark_sent(event_id, ReminderKind::Day, now).await.unwrap());
        assert!(repo.due_events(ReminderKind::Day, from, to).await.unwrap().is_empty());
    }
}

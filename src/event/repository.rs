//! Event persistence.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{
    Cursor, Event, EventImage, EventRecord, EventStatus, NewEvent, SortKey, TicketType,
};
use crate::error::Result;
use crate::user::Binary;

/// Catalog page request, as seen by storage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListQuery {
    pub sort: SortKey,
    pub after: Option<Cursor>,
    /// Match events linked to any of these categories. Empty means all.
    pub category_ids: Vec<i64>,
    /// Rows to fetch.
    pub fetch: i64,
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Public, non-blocked events ordered by `query.sort`, after `query.after`.
    async fn list_public(&self, query: &ListQuery) -> Result<Vec<Event>>;

    /// Any event, whatever its status or visibility.
    async fn find(&self, id: i64) -> Result<Option<Event>>;

    async fn ticket_types(&self, event_id: i64) -> Result<Vec<TicketType>>;

    /// Insert event, ticket types and category links in one transaction.
    async fn create(&self, event: &NewEvent) -> Result<i64>;

    /// Conditional status change. `false` when the event is not in `from`.
    async fn transition(&self, id: i64, from: EventStatus, to: EventStatus) -> Result<bool>;

    /// Public, non-blocked events of an organizer by start time.
    async fn by_organizer(&self, organizer_id: i64) -> Result<Vec<Event>>;

    /// Active and blocked events by start time.
    async fn moderated(&self) -> Result<Vec<Event>>;

    async fn add_image(
        &self,
        event_id: i64,
        image: &Binary,
        file_name: Option<&str>,
    ) -> Result<i64>;

    async fn image(&self, event_id: i64, image_id: i64) -> Result<Option<EventImage>>;
}

const SELECT_EVENT: &str = r#"
    SELECT
        e.id, e.organizer_id, o.name AS organizer_name, e.title, e.description,
        e.start_at, e.end_at, e.location, e.is_online, e.is_public, e.status, e.created_at,
        ARRAY(SELECT ec.category_id FROM event_categories ec WHERE ec.event_id = e.id ORDER BY ec.category_id) AS category_ids
    FROM events e
    LEFT JOIN organizer_profiles o ON o.user_id = e.organizer_id
"#;

/// PostgreSQL event repository.
#[derive(Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Create a new [`PgEventRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, mut builder: QueryBuilder<'_, Postgres>) -> Result<Vec<Event>> {
        builder
            .build_query_as::<EventRecord>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Event::try_from)
            .collect()
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn list_public(&self, query: &ListQuery) -> Result<Vec<Event>> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_EVENT);
        builder.push(" WHERE e.is_public AND e.status <> 'blocked'");

        if !query.category_ids.is_empty() {
            builder
                .push(" AND EXISTS (SELECT 1 FROM event_categories ec WHERE ec.event_id = e.id AND ec.category_id = ANY(")
                .push_bind(query.category_ids.clone())
                .push("))");
        }

        let (column, direction, operator) = match query.sort {
            SortKey::StartAt => ("e.start_at", "ASC", ">"),
            SortKey::CreatedAt => ("e.created_at", "DESC", "<"),
        };

        if let Some(cursor) = query.after {
            builder
                .push(format!(" AND ({column}, e.id) {operator} ("))
                .push_bind(cursor.value)
                .push(", ")
                .push_bind(cursor.id)
                .push(")");
        }

        builder
            .push(format!(" ORDER BY {column} {direction}, e.id {direction} LIMIT "))
            .push_bind(query.fetch);

        self.fetch(builder).await
    }

    async fn find(&self, id: i64) -> Result<Option<Event>> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_EVENT);
        builder.push(" WHERE e.id = ").push_bind(id);

        Ok(self.fetch(builder).await?.into_iter().next())
    }

    async fn ticket_types(&self, event_id: i64) -> Result<Vec<TicketType>> {
        Ok(sqlx::query_as::<_, TicketType>(
            r#"SELECT id, event_id, name, price, capacity FROM ticket_types
                WHERE event_id = $1 ORDER BY id"#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create(&self, event: &NewEvent) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO events
                (organizer_id, title, description, start_at, end_at, location, is_online, is_public, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active')
                RETURNING id"#,
        )
        .bind(event.organizer_id)
        .bind(&event.title)
        .bind(event.description.as_deref())
        .bind(event.start_at)
        .bind(event.end_at)
        .bind(event.location.as_deref())
        .bind(event.is_online)
        .bind(event.is_public)
        .fetch_one(&mut *tx)
        .await?;

        for ticket in &event.ticket_types {
            sqlx::query(
                r#"INSERT INTO ticket_types (event_id, name, price, capacity) VALUES ($1, $2, $3, $4)"#,
            )
            .bind(id)
            .bind(&ticket.name)
            .bind(ticket.price)
            .bind(ticket.capacity)
            .execute(&mut *tx)
            .await?;
        }

        for category_id in &event.category_ids {
            sqlx::query(
                r#"INSERT INTO event_categories (event_id, category_id) VALUES ($1, $2)
                    ON CONFLICT DO NOTHING"#,
            )
            .bind(id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(id)
    }

    async fn transition(&self, id: i64, from: EventStatus, to: EventStatus) -> Result<bool> {
        let result = sqlx::query(r#"UPDATE events SET status = $3 WHERE id = $1 AND status = $2"#)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn by_organizer(&self, organizer_id: i64) -> Result<Vec<Event>> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_EVENT);
        builder
            .push(" WHERE e.organizer_id = ")
            .push_bind(organizer_id)
            .push(" AND e.is_public AND e.status <> 'blocked' ORDER BY e.start_at, e.id");

        self.fetch(builder).await
    }

    async fn moderated(&self) -> Result<Vec<Event>> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_EVENT);
        builder.push(" WHERE e.status IN ('active', 'blocked') ORDER BY e.start_at, e.id");

        self.fetch(builder).await
    }

    async fn add_image(
        &self,
        event_id: i64,
        image: &Binary,
        file_name: Option<&str>,
    ) -> Result<i64> {
        Ok(sqlx::query_scalar(
            r#"INSERT INTO event_images (event_id, content, content_type, file_name, sort_order)
                VALUES ($1, $2, $3, $4,
                    (SELECT COUNT(*) FROM event_images WHERE event_id = $1)::INT)
                RETURNING id"#,
        )
        .bind(event_id)
        .bind(&image.content)
        .bind(&image.content_type)
        .bind(file_name)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn image(&self, event_id: i64, image_id: i64) -> Result<Option<EventImage>> {
        Ok(sqlx::query_as::<_, EventImage>(
            r#"SELECT id, event_id, content, content_type, file_name FROM event_images
                WHERE id = $1 AND event_id = $2"#,
        )
        .bind(image_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[cfg(all(test, feature = "postgres-tests"))]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::*;
    use crate::event::NewTicketType;
    use crate::user::{NewProfile, NewUser, PgUserRepository, UserRepository};

    async fn organizer(pool: &PgPool) -> i64 {
        PgUserRepository::new(pool.clone())
            .create(&NewUser {
                email: "org@example.com".into(),
                password_hash: "x".into(),
                profile: NewProfile::Organizer {
                    name: "Org".into(),
                },
            })
            .await
            .unwrap()
    }

    fn event(organizer_id: i64, hour: u32) -> NewEvent {
        let start_at = Utc.with_ymd_and_hms(2030, 1, 1, hour, 0, 0).unwrap();
        NewEvent {
            organizer_id,
            title: format!("Event {hour}"),
            description: None,
            start_at,
            end_at: start_at + Duration::hours(1),
            location: Some("Hall".into()),
            is_online: false,
            is_public: true,
            ticket_types: vec![NewTicketType {
                name: "Standard".into(),
                price: Decimal::ZERO,
                capacity: 10,
            }],
            category_ids: vec![],
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_keyset_pages(pool: PgPool) {
        let organizer_id = organizer(&pool).await;
        let repo = PgEventRepository::new(pool);
        for hour in [3, 1, 2] {
            repo.create(&event(organizer_id, hour)).await.unwrap();
        }

        let first = repo
            .list_public(&ListQuery {
                fetch: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first.iter().map(|e| e.title.as_str()).collect::<Vec<_>>(), ["Event 1", "Event 2"]);
        assert_eq!(first[0].organizer_name.as_deref(), Some("Org"));

        let rest = repo
            .list_public(&ListQuery {
                after: Some(Cursor::of(SortKey::StartAt, &first[1])),
                fetch: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].title, "Event 3");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_transition(pool: PgPool) {
        let organizer_id = organizer(&pool).await;
        let repo = PgEventRepository::new(pool);
        let id = repo.create(&event(organizer_id, 1)).await.unwrap();

        assert!(repo.transition(id, EventStatus::Active, EventStatus::Blocked).await.unwrap());
        assert!(!repo.transition(id, EventStatus::Active, EventStatus::Blocked).await.unwrap());
        assert_eq!(repo.find(id).await.unwrap().unwrap().status, EventStatus::Blocked);
        assert!(repo.list_public(&ListQuery { fetch: 10, ..Default::default() }).await.unwrap().is_empty());
        assert_eq!(repo.ticket_types(id).await.unwrap().len(), 1);
    }
}

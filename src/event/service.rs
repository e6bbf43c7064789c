//! Catalog operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use super::{
    Cursor, Event, EventDetail, EventImage, EventRepository, EventStatus, ListQuery, NewEvent,
    NewTicketType, Page, SortKey, clamp_limit, parse_ids,
};
use crate::category::CategoryRepository;
use crate::error::{Result, ServerError};
use crate::mail::MailManager;
use crate::registration::RegistrationRepository;
use crate::token::Claims;
use crate::user::{Binary, OrganizerProfile, Role, UserRepository};

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[validate(length(max = 256, message = "Title must not exceed 256 characters."))]
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub location: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub ticket_types: Vec<CreateTicketType>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketType {
    pub name: String,
    pub price: Decimal,
    pub capacity: i32,
}

/// Raw catalog query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub category_ids: Option<String>,
    pub sort_by: Option<String>,
}

/// Event catalog.
pub struct EventService {
    events: Arc<dyn EventRepository>,
    categories: Arc<dyn CategoryRepository>,
    registrations: Arc<dyn RegistrationRepository>,
    users: Arc<dyn UserRepository>,
    mail: MailManager,
}

impl EventService {
    /// Create a new [`EventService`].
    pub fn new(
        events: Arc<dyn EventRepository>,
        categories: Arc<dyn CategoryRepository>,
        registrations: Arc<dyn RegistrationRepository>,
        users: Arc<dyn UserRepository>,
        mail: MailManager,
    ) -> Self {
        Self {
            events,
            categories,
            registrations,
            users,
            mail,
        }
    }

    /// One page of public, non-blocked events.
    pub async fn list(&self, params: ListParams) -> Result<Page<Event>> {
        let sort = SortKey::parse(params.sort_by.as_deref());
        let limit = clamp_limit(params.limit);
        let after = match params.cursor.as_deref().map(str::trim) {
            Some(cursor) if !cursor.is_empty() => Some(cursor.parse::<Cursor>()?),
            _ => None,
        };

        let mut items = self
            .events
            .list_public(&ListQuery {
                sort,
                after,
                category_ids: parse_ids(params.category_ids.as_deref()),
                fetch: limit + 1,
            })
            .await?;

        let next_cursor = if items.len() as i64 > limit {
            items.truncate(limit as usize);
            items.last().map(|event| Cursor::of(sort, event).encode())
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }

    /// Event page with its ticket types.
    pub async fn get(&self, id: i64) -> Result<EventDetail> {
        let event = self.listed(id).await?;
        let ticket_types = self.events.ticket_types(id).await?;

        Ok(EventDetail {
            event,
            ticket_types,
        })
    }

    async fn listed(&self, id: i64) -> Result<Event> {
        self.events
            .find(id)
            .await?
            .filter(Event::is_listed)
            .ok_or(ServerError::NotFound)
    }

    /// Event owned by `organizer_id`, any status.
    pub async fn owned(&self, id: i64, organizer_id: i64) -> Result<Event> {
        self.events
            .find(id)
            .await?
            .filter(|event| event.organizer_id == organizer_id)
            .ok_or(ServerError::NotFound)
    }

    pub async fn create(&self, claims: &Claims, req: CreateEventRequest) -> Result<i64> {
        let organizer_id = claims.user_id().ok_or(ServerError::Unauthorized)?;
        if !claims.has_role(Role::Organizer) {
            return Err(ServerError::Forbidden);
        }

        let title = req.title.trim().to_owned();
        if title.is_empty() {
            return Err(ServerError::InvalidInput("title is required".into()));
        }
        if req.end_at < req.start_at {
            return Err(ServerError::InvalidInput(
                "event must not end before it starts".into(),
            ));
        }
        if req.ticket_types.is_empty() {
            return Err(ServerError::InvalidInput(
                "at least one ticket type is required".into(),
            ));
        }

        let mut ticket_types = Vec::with_capacity(req.ticket_types.len());
        for ticket in req.ticket_types {
            let name = ticket.name.trim().to_owned();
            if name.is_empty() || ticket.capacity <= 0 || ticket.price.is_sign_negative() {
                return Err(ServerError::InvalidInput(
                    "each ticket type needs a name, a positive capacity and a non-negative price"
                        .into(),
                ));
            }
            ticket_types.push(NewTicketType {
                name,
                price: ticket.price,
                capacity: ticket.capacity,
            });
        }

        let mut category_ids = req.category_ids;
        category_ids.sort_unstable();
        category_ids.dedup();
        if !category_ids.is_empty() {
            let usable = self.categories.usable(&category_ids).await?;
            if let Some(missing) = category_ids.iter().find(|id| !usable.contains(id)) {
                return Err(ServerError::InvalidInput(format!(
                    "category {missing} not found or archived"
                )));
            }
        }

        let id = self
            .events
            .create(&NewEvent {
                organizer_id,
                title,
                description: req.description,
                start_at: req.start_at,
                end_at: req.end_at,
                location: req.location,
                is_online: req.is_online,
                is_public: req.is_public,
                ticket_types,
                category_ids,
            })
            .await?;

        tracing::info!(event_id = id, organizer_id, "event created");

        Ok(id)
    }

    /// Cancel an active event and warn its current registrants.
    pub async fn cancel(&self, id: i64, organizer_id: i64) -> Result<()> {
        let event = self.owned(id, organizer_id).await?;

        if !self
            .events
            .transition(id, EventStatus::Active, EventStatus::Cancelled)
            .await?
        {
            return Err(ServerError::InvalidState(format!(
                "event is {} and cannot be cancelled",
                event.status
            )));
        }

        let registrants = self.registrations.active_for_event(id).await?;
        tracing::info!(event_id = id, registrants = registrants.len(), "event cancelled");
        self.mail.event_cancelled(&event, &registrants);

        Ok(())
    }

    pub async fn organizer(&self, id: i64) -> Result<OrganizerProfile> {
        self.users
            .organizer_profile(id)
            .await?
            .ok_or(ServerError::NotFound)
    }

    pub async fn organizer_events(&self, id: i64) -> Result<Vec<Event>> {
        self.organizer(id).await?;
        self.events.by_organizer(id).await
    }

    pub async fn organizer_avatar(&self, id: i64) -> Result<Binary> {
        self.users
            .organizer_avatar(id)
            .await?
            .ok_or(ServerError::NotFound)
    }

    pub async fn set_avatar(&self, claims: &Claims, avatar: Binary) -> Result<()> {
        let user_id = claims.user_id().ok_or(ServerError::Unauthorized)?;
        if !claims.has_role(Role::Organizer) {
            return Err(ServerError::Forbidden);
        }
        if avatar.content.is_empty() {
            return Err(ServerError::InvalidInput("image file is required".into()));
        }

        if self.users.set_organizer_avatar(user_id, &avatar).await? {
            Ok(())
        } else {
            Err(ServerError::NotFound)
        }
    }

    pub async fn add_image(
        &self,
        event_id: i64,
        organizer_id: i64,
        image: Binary,
        file_name: Option<String>,
    ) -> Result<i64> {
        self.owned(event_id, organizer_id).await?;
        if image.content.is_empty() {
            return Err(ServerError::InvalidInput("image file is required".into()));
        }

        self.events
            .add_image(event_id, &image, file_name.as_deref())
            .await
    }

    pub async fn image(&self, event_id: i64, image_id: i64) -> Result<EventImage> {
        self.listed(event_id).await?;
        self.events
            .image(event_id, image_id)
            .await?
            .ok_or(ServerError::NotFound)
    }
}

mod cursor;
mod repository;
mod service;

pub use cursor::*;
pub use repository::*;
pub use service::*;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Event lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Cancelled,
    Blocked,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "active",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EventStatus::Active),
            "cancelled" => Ok(EventStatus::Cancelled),
            "blocked" => Ok(EventStatus::Blocked),
            other => Err(ServerError::InvalidInput(format!(
                "unknown event status `{other}`"
            ))),
        }
    }
}

/// Event with its category links.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub organizer_id: i64,
    pub organizer_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub location: Option<String>,
    pub is_online: bool,
    pub is_public: bool,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub category_ids: Vec<i64>,
}

impl Event {
    /// Listed in the public catalog.
    pub fn is_listed(&self) -> bool {
        self.is_public && self.status != EventStatus::Blocked
    }
}

/// Admission category of an event.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    pub id: i64,
    #[serde(skip)]
    pub event_id: i64,
    pub name: String,
    pub price: Decimal,
    pub capacity: i32,
}

/// Event detail page.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub ticket_types: Vec<TicketType>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewTicketType {
    pub name: String,
    pub price: Decimal,
    pub capacity: i32,
}

/// Event to insert along with its ticket types and categories.
#[derive(Clone, Debug, PartialEq)]
pub struct NewEvent {
    pub organizer_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub location: Option<String>,
    pub is_online: bool,
    pub is_public: bool,
    pub ticket_types: Vec<NewTicketType>,
    pub category_ids: Vec<i64>,
}

/// Stored event image.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct EventImage {
    pub id: i64,
    pub event_id: i64,
    pub content: Vec<u8>,
    pub content_type: String,
    pub file_name: Option<String>,
}

/// One page of the public catalog.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[derive(sqlx::FromRow)]
struct EventRecord {
    id: i64,
    organizer_id: i64,
    organizer_name: Option<String>,
    title: String,
    description: Option<String>,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    location: Option<String>,
    is_online: bool,
    is_public: bool,
    status: String,
    created_at: DateTime<Utc>,
    category_ids: Vec<i64>,
}

impl TryFrom<EventRecord> for Event {
    type Error = ServerError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        Ok(Event {
            id: record.id,
            organizer_id: record.organizer_id,
            organizer_name: record.organizer_name,
            title: record.title,
            description: record.description,
            start_at: record.start_at,
            end_at: record.end_at,
            location: record.location,
            is_online: record.is_online,
            is_public: record.is_public,
            status: record.status.parse()?,
            created_at: record.created_at,
            category_ids: record.category_ids,
        })
    }
}

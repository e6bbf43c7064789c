mod repository;
mod service;

pub use repository::*;
pub use service::*;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Registration lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Registered,
    CheckedIn,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Registered => "registered",
            RegistrationStatus::CheckedIn => "checked_in",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }

    /// Holds a place on its ticket type.
    pub fn is_active(&self) -> bool {
        !matches!(self, RegistrationStatus::Cancelled)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(RegistrationStatus::Registered),
            "checked_in" => Ok(RegistrationStatus::CheckedIn),
            "cancelled" => Ok(RegistrationStatus::Cancelled),
            other => Err(ServerError::InvalidInput(format!(
                "unknown registration status `{other}`"
            ))),
        }
    }
}

/// A participant's claim on one place of a ticket type.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: i64,
    pub event_id: i64,
    pub ticket_type_id: i64,
    pub user_id: Option<i64>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub phone: Option<String>,
    pub status: RegistrationStatus,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Registration {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }
}

/// Registration to insert, already validated.
#[derive(Clone, Debug, PartialEq)]
pub struct NewRegistration {
    pub event_id: i64,
    pub ticket_type_id: i64,
    pub user_id: Option<i64>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub phone: Option<String>,
}

/// Registration as listed on the participant's own page.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyRegistration {
    pub id: i64,
    pub event_id: i64,
    pub event_title: String,
    pub event_start_at: DateTime<Utc>,
    pub ticket_type_name: String,
    pub status: RegistrationStatus,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct RegistrationRecord {
    id: i64,
    event_id: i64,
    ticket_type_id: i64,
    user_id: Option<i64>,
    email: String,
    first_name: String,
    last_name: String,
    middle_name: Option<String>,
    phone: Option<String>,
    status: String,
    checked_in_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RegistrationRecord> for Registration {
    type Error = ServerError;

    fn try_from(record: RegistrationRecord) -> Result<Self, Self::Error> {
        Ok(Registration {
            id: record.id,
            event_id: record.event_id,
            ticket_type_id: record.ticket_type_id,
            user_id: record.user_id,
            email: record.email,
            first_name: record.first_name,
            last_name: record.last_name,
            middle_name: record.middle_name,
            phone: record.phone,
            status: record.status.parse()?,
            checked_in_at: record.checked_in_at,
            created_at: record.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MyRegistrationRecord {
    id: i64,
    event_id: i64,
    event_title: String,
    event_start_at: DateTime<Utc>,
    ticket_type_name: String,
    status: String,
    checked_in_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MyRegistrationRecord> for MyRegistration {
    type Error = ServerError;

    fn try_from(record: MyRegistrationRecord) -> Result<Self, Self::Error> {
        Ok(MyRegistration {
            id: record.id,
            event_id: record.event_id,
            event_title: record.event_title,
            event_start_at: record.event_start_at,
            ticket_type_name: record.ticket_type_name,
            status: record.status.parse()?,
            checked_in_at: record.checked_in_at,
            created_at: record.created_at,
        })
    }
}

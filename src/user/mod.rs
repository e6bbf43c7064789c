mod repository;
mod service;

pub use repository::*;
pub use service::*;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Role tag held by a user. A user may hold several.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Organizer,
    Participant,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Organizer => "organizer",
            Role::Participant => "participant",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organizer" => Ok(Role::Organizer),
            "participant" => Ok(Role::Participant),
            "admin" => Ok(Role::Admin),
            other => Err(ServerError::InvalidInput(format!("unknown role `{other}`"))),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = ServerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Trim and lower-case an email before storage or comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub is_blocked: bool,
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
}

/// Profile created alongside a new account.
#[derive(Clone, Debug, PartialEq)]
pub enum NewProfile {
    Organizer { name: String },
    Participant { first_name: String, last_name: String },
}

impl NewProfile {
    pub fn role(&self) -> Role {
        match self {
            NewProfile::Organizer { .. } => Role::Organizer,
            NewProfile::Participant { .. } => Role::Participant,
        }
    }
}

/// Account to insert.
#[derive(Clone, Debug, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub profile: NewProfile,
}

/// Legal name and contact details of a participant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProfile {
    #[serde(skip)]
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
}

/// Public organizer card.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrganizerProfile {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub has_avatar: bool,
}

/// Binary content stored alongside a row.
#[derive(Clone, Debug, PartialEq)]
pub struct Binary {
    pub content: Vec<u8>,
    pub content_type: String,
}

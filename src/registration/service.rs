//! Registration workflow.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use super::{MyRegistration, NewRegistration, Registration, RegistrationRepository, RegistrationStatus};
use crate::error::{Result, ServerError};
use crate::event::{Event, EventRepository, EventStatus};
use crate::export::{self, Export, ExportFormat};
use crate::mail::{MailManager, Template};
use crate::token::Claims;
use crate::user::{ParticipantProfile, UserRepository, normalize_email};

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRegistrationRequest {
    pub ticket_type_id: i64,
    #[validate(length(max = 320, message = "Email is too long."))]
    pub email: Option<String>,
    #[validate(length(max = 128))]
    pub first_name: Option<String>,
    #[validate(length(max = 128))]
    pub last_name: Option<String>,
    #[validate(length(max = 128))]
    pub middle_name: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    pub payment_completed: Option<bool>,
}

/// Non-blank, trimmed value.
fn filled(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Registration operations.
pub struct RegistrationService {
    events: Arc<dyn EventRepository>,
    registrations: Arc<dyn RegistrationRepository>,
    users: Arc<dyn UserRepository>,
    mail: MailManager,
}

impl RegistrationService {
    /// Create a new [`RegistrationService`].
    pub fn new(
        events: Arc<dyn EventRepository>,
        registrations: Arc<dyn RegistrationRepository>,
        users: Arc<dyn UserRepository>,
        mail: MailManager,
    ) -> Self {
        Self {
            events,
            registrations,
            users,
            mail,
        }
    }

    /// Register someone for an event, anonymously or as `caller`.
    pub async fn create(
        &self,
        event_id: i64,
        req: CreateRegistrationRequest,
        caller: Option<&Claims>,
    ) -> Result<i64> {
        let event = self
            .events
            .find(event_id)
            .await?
            .filter(|e| e.is_public && e.status == EventStatus::Active)
            .ok_or(ServerError::NotFound)?;

        let ticket = self
            .events
            .ticket_types(event_id)
            .await?
            .into_iter()
            .find(|t| t.id == req.ticket_type_id)
            .ok_or_else(|| {
                ServerError::InvalidInput("ticket type does not belong to this event".into())
            })?;

        let user_id = caller.and_then(Claims::user_id);
        let profile = match user_id {
            Some(id) => self.users.participant_profile(id).await?,
            None => None,
        }
        .unwrap_or_default();

        let email = filled(req.email)
            .or_else(|| filled(Some(profile.email.clone())))
            .or_else(|| filled(caller.map(|c| c.email.clone())))
            .map(|e| normalize_email(&e))
            .unwrap_or_default();

        if !email.is_empty() && self.registrations.has_active(event_id, &email).await? {
            return Err(ServerError::Conflict("already registered for this event".into()));
        }

        if self.registrations.count_active(ticket.id).await? >= i64::from(ticket.capacity) {
            return Err(ServerError::CapacityExceeded);
        }

        if ticket.price > Decimal::ZERO && req.payment_completed != Some(true) {
            return Err(ServerError::PaymentRequired);
        }

        let ParticipantProfile {
            first_name,
            last_name,
            middle_name,
            phone,
            ..
        } = profile;
        let registration = NewRegistration {
            event_id,
            ticket_type_id: ticket.id,
            user_id,
            first_name: filled(req.first_name).or_else(|| filled(Some(first_name))).unwrap_or_default(),
            last_name: filled(req.last_name).or_else(|| filled(Some(last_name))).unwrap_or_default(),
            middle_name: filled(req.middle_name).or_else(|| filled(middle_name)),
            phone: filled(req.phone).or_else(|| filled(phone)),
            email,
        };

        if registration.first_name.is_empty()
            || registration.last_name.is_empty()
            || registration.email.is_empty()
        {
            return Err(ServerError::InvalidInput(
                "first name, last name and email are required".into(),
            ));
        }

        let id = self.registrations.reserve(&registration, ticket.capacity).await?;

        metrics::counter!("registrations_created_total").increment(1);
        tracing::info!(registration_id = id, event_id, ticket_type_id = ticket.id, "registration created");

        self.mail.send_template(
            &registration.email,
            Template::Confirmation {
                name: &format!("{} {}", registration.first_name, registration.last_name),
                event: &event,
            },
        );

        Ok(id)
    }

    async fn event_of(&self, registration: &Registration) -> Result<Event> {
        self.events
            .find(registration.event_id)
            .await?
            .ok_or(ServerError::NotFound)
    }

    /// Cancel as the event's organizer or as the registrant.
    pub async fn cancel(&self, id: i64, caller: &Claims) -> Result<()> {
        let registration = self
            .registrations
            .find(id)
            .await?
            .filter(|r| r.status.is_active())
            .ok_or(ServerError::NotFound)?;
        let event = self.event_of(&registration).await?;

        let is_organizer = caller.user_id() == Some(event.organizer_id);
        let is_owner = normalize_email(&caller.email) == registration.email;
        if !is_organizer && !is_owner {
            return Err(ServerError::Forbidden);
        }

        // Lost a race with another cancellation.
        if !self.registrations.cancel(id).await? {
            return Err(ServerError::NotFound);
        }

        tracing::info!(registration_id = id, event_id = event.id, by_organizer = is_organizer, "registration cancelled");

        if !is_organizer {
            self.notify_organizer(&event, &registration).await?;
        }

        Ok(())
    }

    async fn notify_organizer(&self, event: &Event, registration: &Registration) -> Result<()> {
        let Some(organizer) = self.users.find_by_id(event.organizer_id).await? else {
            tracing::warn!(event_id = event.id, "organizer account not found");
            return Ok(());
        };
        let organizer_name = event.organizer_name.as_deref().unwrap_or(&organizer.email);

        self.mail.send_template(
            &organizer.email,
            Template::RegistrationCancelled {
                organizer: organizer_name,
                participant: &registration.full_name(),
                email: &registration.email,
                event,
            },
        );

        Ok(())
    }

    /// Mark attendance. Checking in twice keeps the first timestamp.
    pub async fn check_in(&self, id: i64, caller: &Claims) -> Result<RegistrationStatus> {
        let registration = self
            .registrations
            .find(id)
            .await?
            .ok_or(ServerError::NotFound)?;
        let event = self.event_of(&registration).await?;

        if caller.user_id() != Some(event.organizer_id) {
            return Err(ServerError::Forbidden);
        }

        match registration.status {
            RegistrationStatus::CheckedIn => Ok(RegistrationStatus::CheckedIn),
            RegistrationStatus::Cancelled => Err(ServerError::InvalidState(
                "registration is cancelled".into(),
            )),
            RegistrationStatus::Registered => {
                if self.registrations.check_in(id, Utc::now()).await? {
                    tracing::info!(registration_id = id, event_id = event.id, "participant checked in");
                    return Ok(RegistrationStatus::CheckedIn);
                }

                // Changed concurrently, report whatever won.
                match self.registrations.find(id).await?.map(|r| r.status) {
                    Some(RegistrationStatus::CheckedIn) => Ok(RegistrationStatus::CheckedIn),
                    Some(_) => Err(ServerError::InvalidState(
                        "registration is cancelled".into(),
                    )),
                    None => Err(ServerError::NotFound),
                }
            },
        }
    }

    async fn owned_event(&self, event_id: i64, caller: &Claims) -> Result<Event> {
        self.events
            .find(event_id)
            .await?
            .filter(|e| Some(e.organizer_id) == caller.user_id())
            .ok_or(ServerError::NotFound)
    }

    /// Registrations of an event, for its organizer only.
    pub async fn list_for_event(&self, event_id: i64, caller: &Claims) -> Result<Vec<Registration>> {
        self.owned_event(event_id, caller).await?;
        self.registrations.for_event(event_id).await
    }

    /// Render current registrants of an event, for its organizer only.
    pub async fn export(
        &self,
        event_id: i64,
        caller: &Claims,
        format: ExportFormat,
    ) -> Result<Export> {
        let event = self.owned_event(event_id, caller).await?;
        let registrations = self.registrations.active_for_event(event_id).await?;

        Ok(export::render(&event.title, &registrations, format)?)
    }

    pub async fn mine(&self, caller: &Claims) -> Result<Vec<MyRegistration>> {
        let user_id = caller.user_id().ok_or(ServerError::Unauthorized)?;
        self.registrations
            .for_user(user_id, &normalize_email(&caller.email))
            .await
    }

    pub async fn profile(&self, caller: &Claims) -> Result<ParticipantProfile> {
        let user_id = caller.user_id().ok_or(ServerError::Unauthorized)?;
        self.users
            .participant_profile(user_id)
            .await?
            .ok_or(ServerError::NotFound)
    }
}

//! Admin moderation of events and accounts.

mod repository;

pub use repository::*;

use std::sync::Arc;

use crate::error::{Result, ServerError};
use crate::event::{Event, EventRepository, EventStatus};
use crate::mail::{MailManager, OutgoingMail, Template};
use crate::registration::RegistrationRepository;
use crate::user::{Role, User, UserRepository};

/// Moderation operations. Callers must hold the admin role.
pub struct ModerationService {
    repo: Arc<dyn ModerationRepository>,
    events: Arc<dyn EventRepository>,
    registrations: Arc<dyn RegistrationRepository>,
    users: Arc<dyn UserRepository>,
    mail: MailManager,
}

impl ModerationService {
    /// Create a new [`ModerationService`].
    pub fn new(
        repo: Arc<dyn ModerationRepository>,
        events: Arc<dyn EventRepository>,
        registrations: Arc<dyn RegistrationRepository>,
        users: Arc<dyn UserRepository>,
        mail: MailManager,
    ) -> Self {
        Self {
            repo,
            events,
            registrations,
            users,
            mail,
        }
    }

    async fn transition(&self, id: i64, from: EventStatus, to: EventStatus) -> Result<()> {
        if self.events.transition(id, from, to).await? {
            tracing::info!(event_id = id, status = %to, "event moderated");
            return Ok(());
        }

        match self.events.find(id).await? {
            Some(event) => Err(ServerError::InvalidState(format!(
                "event is {}, expected {from}",
                event.status
            ))),
            None => Err(ServerError::NotFound),
        }
    }

    /// `active -> blocked`. Registrants are not notified.
    pub async fn block_event(&self, id: i64) -> Result<()> {
        self.transition(id, EventStatus::Active, EventStatus::Blocked)
            .await
    }

    /// `blocked -> active`.
    pub async fn unblock_event(&self, id: i64) -> Result<()> {
        self.transition(id, EventStatus::Blocked, EventStatus::Active)
            .await
    }

    /// Block an organizer, cancel its active events and warn their registrants.
    pub async fn block_organizer(&self, user_id: i64) -> Result<()> {
        let cancelled = self
            .repo
            .block_organizer(user_id)
            .await?
            .ok_or(ServerError::NotFound)?;

        tracing::info!(user_id, cancelled_events = cancelled.len(), "organizer blocked");

        for event in &cancelled {
            let registrants = self.registrations.active_for_event(event.id).await?;
            self.mail.event_cancelled(event, &registrants);
        }

        Ok(())
    }

    pub async fn unblock_organizer(&self, user_id: i64) -> Result<()> {
        if self.repo.unblock(user_id, Some(Role::Organizer)).await? {
            tracing::info!(user_id, "organizer unblocked");
            Ok(())
        } else {
            Err(ServerError::NotFound)
        }
    }

    /// Block a user, cancel its registrations and warn the organizers.
    pub async fn block_user(&self, user_id: i64) -> Result<()> {
        let cancelled = self
            .repo
            .block_user(user_id)
            .await?
            .ok_or(ServerError::NotFound)?;

        tracing::info!(user_id, cancelled_registrations = cancelled.len(), "user blocked");

        let mut notices = Vec::with_capacity(cancelled.len());
        for registration in &cancelled {
            let Some(event) = self.events.find(registration.event_id).await? else {
                continue;
            };
            let Some(organizer) = self.users.find_by_id(event.organizer_id).await? else {
                continue;
            };

            notices.push(OutgoingMail::new(
                &organizer.email,
                Template::RegistrationCancelled {
                    organizer: event.organizer_name.as_deref().unwrap_or(&organizer.email),
                    participant: &registration.full_name(),
                    email: &registration.email,
                    event: &event,
                },
            ));
        }
        self.mail.send_all(notices);

        Ok(())
    }

    pub async fn unblock_user(&self, user_id: i64) -> Result<()> {
        if self.repo.unblock(user_id, None).await? {
            tracing::info!(user_id, "user unblocked");
            Ok(())
        } else {
            Err(ServerError::NotFound)
        }
    }

    /// Active and blocked events, by start time.
    pub async fn events(&self) -> Result<Vec<Event>> {
        self.events.moderated().await
    }

    /// Every account, newest first.
    pub async fn users(&self) -> Result<Vec<User>> {
        self.users.list().await
    }
}

//! Periodic reminder emails before events start.

mod repository;

pub use repository::*;

use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::Result;
use crate::mail::{MailManager, OutgoingMail, Template};
use crate::registration::RegistrationRepository;

/// Reminder flavour, stored as `24h` or `1h`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ReminderKind {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "1h")]
    Hour,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 2] = [ReminderKind::Day, ReminderKind::Hour];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::Day => "24h",
            ReminderKind::Hour => "1h",
        }
    }

    /// Start time range examined at `now`, bounds included.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            ReminderKind::Day => (now + Duration::hours(23), now + Duration::hours(25)),
            ReminderKind::Hour => (now + Duration::minutes(50), now + Duration::minutes(70)),
        }
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WindowReport {
    /// Events reminded.
    pub events: usize,
    /// Mails queued.
    pub mails: usize,
}

/// Outcome of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub day: WindowReport,
    pub hour: WindowReport,
}

/// Finds events entering a reminder window and mails their registrants once.
pub struct ReminderSweep {
    repo: Arc<dyn ReminderRepository>,
    registrations: Arc<dyn RegistrationRepository>,
    mail: MailManager,
}

impl ReminderSweep {
    /// Create a new [`ReminderSweep`].
    pub fn new(
        repo: Arc<dyn ReminderRepository>,
        registrations: Arc<dyn RegistrationRepository>,
        mail: MailManager,
    ) -> Self {
        Self {
            repo,
            registrations,
            mail,
        }
    }

    /// Examine both windows once.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        Ok(SweepReport {
            day: self.window(ReminderKind::Day, now).await?,
            hour: self.window(ReminderKind::Hour, now).await?,
        })
    }

    async fn window(&self, kind: ReminderKind, now: DateTime<Utc>) -> Result<WindowReport> {
        let (from, to) = kind.window(now);
        let mut report = WindowReport::default();

        for event in self.repo.due_events(kind, from, to).await? {
            let registrants = self.registrations.active_for_event(event.id).await?;
            // Re-examined next tick, someone may still register.
            if registrants.is_empty() {
                continue;
            }

            for registration in &registrants {
                let name = registration.full_name();
                let name = if name.is_empty() { &registration.email } else { &name };
                let mail = OutgoingMail::new(
                    &registration.email,
                    Template::Reminder {
                        kind,
                        name,
                        event: &event,
                    },
                );
                self.mail.send_wait(mail).await;
            }

            self.repo.mark_sent(event.id, kind, now).await?;
            metrics::counter!("reminders_sent_total", "kind" => kind.as_str())
                .increment(registrants.len() as u64);
            tracing::info!(event_id = event.id, %kind, recipients = registrants.len(), "reminders sent");

            report.events += 1;
            report.mails += registrants.len();
        }

        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` flips to `true`.
    ///
    /// A failing sweep is logged and the loop carries on.
    pub async fn run(self: Arc<Self>, interval: StdDuration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "reminder sweep started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once(Utc::now()).await {
                        Ok(report) => tracing::debug!(?report, "reminder sweep done"),
                        Err(err) => tracing::error!(error = %err, "reminder sweep failed"),
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },
            }
        }

        tracing::info!("reminder sweep stopped");
    }
}

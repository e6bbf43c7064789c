//! Plain-text mail templates.

use chrono::{DateTime, Utc};

use crate::event::Event;
use crate::reminder::ReminderKind;

const SIGNATURE: &str = "Meetup";
const ONLINE: &str = "Online";

/// Mail templates list.
#[derive(Debug)]
pub enum Template<'a> {
    /// Registration accepted.
    Confirmation { name: &'a str, event: &'a Event },
    /// Event starts soon.
    Reminder {
        kind: ReminderKind,
        name: &'a str,
        event: &'a Event,
    },
    /// Event cancelled by its organizer or a moderator.
    EventCancelled { name: &'a str, event: &'a Event },
    /// Sent to the organizer when a participant withdraws.
    RegistrationCancelled {
        organizer: &'a str,
        participant: &'a str,
        email: &'a str,
        event: &'a Event,
    },
}

fn when(date: DateTime<Utc>) -> String {
    date.format("%d.%m.%Y %H:%M (UTC)").to_string()
}

fn place(event: &Event) -> &str {
    event
        .location
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or(ONLINE)
}

impl Template<'_> {
    /// Subject and body.
    pub fn render(&self) -> (String, String) {
        match self {
            Template::Confirmation { name, event } => (
                format!("Registration confirmed: {}", event.title),
                format!(
                    "Hello {name},\n\nYou are registered for \"{}\".\n\nDate: {}\nPlace: {}\n\nSee you there!\n{SIGNATURE}\n",
                    event.title,
                    when(event.start_at),
                    place(event),
                ),
            ),
            Template::Reminder { kind, name, event } => {
                let lead = match kind {
                    ReminderKind::Day => format!("\"{}\" takes place tomorrow.", event.title),
                    ReminderKind::Hour => format!("\"{}\" starts in one hour.", event.title),
                };
                (
                    format!("Reminder: {}", event.title),
                    format!(
                        "Hello {name},\n\n{lead}\n\nDate: {}\nPlace: {}\n\nSee you soon!\n{SIGNATURE}\n",
                        when(event.start_at),
                        place(event),
                    ),
                )
            },
            Template::EventCancelled { name, event } => (
                format!("Event cancelled: {}", event.title),
                format!(
                    "Hello {name},\n\nUnfortunately \"{}\", planned on {}, has been cancelled.\n\nWe apologize for the inconvenience.\n{SIGNATURE}\n",
                    event.title,
                    when(event.start_at),
                ),
            ),
            Template::RegistrationCancelled {
                organizer,
                participant,
                email,
                event,
            } => (
                format!("Registration cancelled: {}", event.title),
                format!(
                    "Hello {organizer},\n\n{participant} ({email}) cancelled their registration to \"{}\" ({}).\n\n{SIGNATURE}\n",
                    event.title,
                    when(event.start_at),
                ),
            ),
        }
    }
}

//! Send emails to participants and organizers.
//!
//! Mails are pushed onto a bounded queue and delivered by a background
//! dispatcher. Single mails sent from a request never wait: a full queue drops
//! them. Batches and background senders wait for room instead. A failed send
//! is logged and never retried.

mod template;
mod transport;

pub use template::*;
pub use transport::*;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Notify, Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::event::Event;
use crate::registration::Registration;

pub const DEFAULT_QUEUE_SIZE: usize = 1024;
pub const DEFAULT_WORKERS: usize = 4;

/// Plain-text mail ready to be sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    /// Render `template` for `to`.
    pub fn new(to: &str, template: Template<'_>) -> Self {
        let (subject, body) = template.render();
        Self {
            to: to.to_owned(),
            subject,
            body,
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Handle to the mail queue.
#[derive(Clone, Debug)]
pub struct MailManager {
    sender: mpsc::Sender<OutgoingMail>,
    pending: Arc<Pending>,
}

impl MailManager {
    /// Create a new [`MailManager`] and spawn its dispatcher.
    ///
    /// The dispatcher stops once every [`MailManager`] clone is dropped and
    /// the queue is empty.
    pub fn new(
        transport: Arc<dyn Transport>,
        queue_size: usize,
        workers: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        let pending = Arc::new(Pending::default());
        let handle = tokio::spawn(dispatch(
            receiver,
            transport,
            Arc::new(Semaphore::new(workers.max(1))),
            Arc::clone(&pending),
        ));

        (Self { sender, pending }, handle)
    }

    /// Queue a mail without waiting for delivery.
    pub fn send(&self, mail: OutgoingMail) {
        self.pending.count.fetch_add(1, Ordering::AcqRel);

        if let Err(err) = self.sender.try_send(mail) {
            self.pending.done();
            let (reason, mail) = match err {
                mpsc::error::TrySendError::Full(mail) => ("queue full", mail),
                mpsc::error::TrySendError::Closed(mail) => ("queue closed", mail),
            };
            metrics::counter!("mail_dispatched_total", "outcome" => "dropped").increment(1);
            tracing::warn!(to = %mail.to, subject = %mail.subject, reason, "mail dropped");
        }
    }

    /// Queue a mail, waiting for room when the queue is full.
    pub async fn send_wait(&self, mail: OutgoingMail) {
        self.pending.count.fetch_add(1, Ordering::AcqRel);
        enqueue(&self.sender, &self.pending, mail).await;
    }

    /// Queue every mail from a background task, waiting for room as needed.
    ///
    /// Returns at once. [`MailManager::drain`] also waits for these mails.
    pub fn send_all(&self, mails: Vec<OutgoingMail>) {
        if mails.is_empty() {
            return;
        }
        self.pending.count.fetch_add(mails.len(), Ordering::AcqRel);

        let sender = self.sender.clone();
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            for mail in mails {
                enqueue(&sender, &pending, mail).await;
            }
        });
    }

    /// Render and queue a template.
    pub fn send_template(&self, to: &str, template: Template<'_>) {
        self.send(OutgoingMail::new(to, template));
    }

    /// Warn every registrant that `event` will not take place.
    pub fn event_cancelled(&self, event: &Event, registrants: &[Registration]) {
        let mails = registrants
            .iter()
            .map(|registration| {
                OutgoingMail::new(&registration.email, Template::EventCancelled {
                    name: &registration.full_name(),
                    event,
                })
            })
            .collect();
        self.send_all(mails);
    }

    /// Wait until every queued mail went through its transport.
    pub async fn drain(&self) {
        loop {
            let idle = self.pending.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.pending.count.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// Push `mail` once the queue has room. Only a stopped dispatcher drops it.
async fn enqueue(sender: &mpsc::Sender<OutgoingMail>, pending: &Pending, mail: OutgoingMail) {
    if let Err(mpsc::error::SendError(mail)) = sender.send(mail).await {
        pending.done();
        metrics::counter!("mail_dispatched_total", "outcome" => "dropped").increment(1);
        tracing::warn!(to = %mail.to, subject = %mail.subject, reason = "queue closed", "mail dropped");
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<OutgoingMail>,
    transport: Arc<dyn Transport>,
    workers: Arc<Semaphore>,
    pending: Arc<Pending>,
) {
    while let Some(mail) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
            pending.done();
            break;
        };
        let transport = Arc::clone(&transport);
        let pending = Arc::clone(&pending);

        tokio::spawn(async move {
            match transport.send(&mail).await {
                Ok(()) => {
                    metrics::counter!("mail_dispatched_total", "outcome" => "sent").increment(1);
                    tracing::debug!(to = %mail.to, subject = %mail.subject, "mail sent");
                },
                Err(err) => {
                    metrics::counter!("mail_dispatched_total", "outcome" => "failed").increment(1);
                    tracing::warn!(error = %err, to = %mail.to, "failed to send mail");
                },
            }
            drop(permit);
            pending.done();
        });
    }

    tracing::debug!("mail dispatcher stopped");
}

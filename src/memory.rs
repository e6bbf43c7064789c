//! In-memory adapters for every repository, used by tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::Repositories;
use crate::category::{Category, CategoryRepository, UpdateCategory};
use crate::error::{Result, ServerError};
use crate::event::{
    Event, EventImage, EventRepository, EventStatus, ListQuery, NewEvent, SortKey, TicketType,
};
use crate::moderation::ModerationRepository;
use crate::registration::{
    MyRegistration, NewRegistration, Registration, RegistrationRepository, RegistrationStatus,
};
use crate::reminder::{ReminderKind, ReminderRepository};
use crate::user::{
    Binary, NewProfile, NewUser, OrganizerProfile, ParticipantProfile, Role, User, UserRepository,
};

struct Organizer {
    name: String,
    description: Option<String>,
    avatar: Option<Binary>,
}

struct Account {
    user: User,
    organizer: Option<Organizer>,
    participant: Option<ParticipantProfile>,
}

#[derive(Default)]
struct Tables {
    sequence: i64,
    clock: Option<DateTime<Utc>>,
    users: BTreeMap<i64, Account>,
    categories: BTreeMap<i64, Category>,
    events: BTreeMap<i64, Event>,
    ticket_types: BTreeMap<i64, TicketType>,
    images: BTreeMap<i64, EventImage>,
    registrations: BTreeMap<i64, Registration>,
    reminders: HashSet<(i64, &'static str)>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }

    /// Strictly increasing, microsecond precision like PostgreSQL.
    fn now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now().trunc_subsecs(6);
        if let Some(last) = self.clock {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.clock = Some(now);
        now
    }

    fn event(&self, id: i64) -> Option<Event> {
        let mut event = self.events.get(&id)?.clone();
        event.organizer_name = self
            .users
            .get(&event.organizer_id)
            .and_then(|a| a.organizer.as_ref())
            .map(|o| o.name.clone());
        Some(event)
    }

    fn events_where(&self, filter: impl Fn(&Event) -> bool) -> Vec<Event> {
        let mut events: Vec<_> = self
            .events
            .keys()
            .filter_map(|id| self.event(*id))
            .filter(|e| filter(e))
            .collect();
        events.sort_by_key(|e| (e.start_at, e.id));
        events
    }

    fn registrations_where(&self, filter: impl Fn(&Registration) -> bool) -> Vec<Registration> {
        let mut registrations: Vec<_> = self
            .registrations
            .values()
            .filter(|r| filter(r))
            .cloned()
            .collect();
        registrations.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id))
        });
        registrations
    }
}

/// Every table behind one lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    /// Memory adapters sharing this store.
    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            users: self.clone(),
            categories: self.clone(),
            events: self.clone(),
            registrations: self.clone(),
            moderation: self.clone(),
            reminders: self.clone(),
        }
    }

    pub fn set_blocked(&self, user_id: i64, blocked: bool) {
        if let Some(account) = self.lock().users.get_mut(&user_id) {
            account.user.is_blocked = blocked;
        }
    }

    pub fn set_event_status(&self, event_id: i64, status: EventStatus) {
        if let Some(event) = self.lock().events.get_mut(&event_id) {
            event.status = status;
        }
    }

    pub fn archive_category(&self, category_id: i64) {
        if let Some(category) = self.lock().categories.get_mut(&category_id) {
            category.is_archived = true;
        }
    }

    pub fn event(&self, id: i64) -> Event {
        self.lock().event(id).expect("unknown event")
    }

    pub fn registration(&self, id: i64) -> Registration {
        self.lock()
            .registrations
            .get(&id)
            .cloned()
            .expect("unknown registration")
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: &NewUser) -> Result<i64> {
        let mut tables = self.lock();
        if tables.users.values().any(|a| a.user.email == user.email) {
            return Err(ServerError::Conflict("email is already registered".into()));
        }

        let id = tables.next_id();
        let created_at = tables.now();
        let (organizer, participant) = match &user.profile {
            NewProfile::Organizer { name } => (
                Some(Organizer {
                    name: name.clone(),
                    description: None,
                    avatar: None,
                }),
                None,
            ),
            NewProfile::Participant {
                first_name,
                last_name,
            } => (
                None,
                Some(ParticipantProfile {
                    user_id: id,
                    first_name: first_name.clone(),
                    last_name: last_name.clone(),
                    middle_name: None,
                    email: user.email.clone(),
                    phone: None,
                }),
            ),
        };

        tables.users.insert(id, Account {
            user: User {
                id,
                email: user.email.clone(),
                password_hash: user.password_hash.clone(),
                is_blocked: false,
                roles: vec![user.profile.role()],
                created_at,
            },
            organizer,
            participant,
        });

        Ok(id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|a| a.user.email == email)
            .map(|a| a.user.clone()))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.lock().users.get(&id).map(|a| a.user.clone()))
    }

    async fn list(&self) -> Result<Vec<User>> {
        let mut users: Vec<_> = self.lock().users.values().map(|a| a.user.clone()).collect();
        users.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(users)
    }

    async fn add_role(&self, user_id: i64, role: Role) -> Result<()> {
        if let Some(account) = self.lock().users.get_mut(&user_id) {
            if !account.user.roles.contains(&role) {
                account.user.roles.push(role);
                account.user.roles.sort();
            }
        }
        Ok(())
    }

    async fn participant_profile(&self, user_id: i64) -> Result<Option<ParticipantProfile>> {
        Ok(self
            .lock()
            .users
            .get(&user_id)
            .and_then(|a| a.participant.clone()))
    }

    async fn organizer_profile(&self, user_id: i64) -> Result<Option<OrganizerProfile>> {
        Ok(self.lock().users.get(&user_id).and_then(|a| {
            a.organizer.as_ref().map(|o| OrganizerProfile {
                id: user_id,
                name: o.name.clone(),
                description: o.description.clone(),
                has_avatar: o.avatar.is_some(),
            })
        }))
    }

    async fn organizer_avatar(&self, user_id: i64) -> Result<Option<Binary>> {
        Ok(self
            .lock()
            .users
            .get(&user_id)
            .and_then(|a| a.organizer.as_ref())
            .and_then(|o| o.avatar.clone()))
    }

    async fn set_organizer_avatar(&self, user_id: i64, avatar: &Binary) -> Result<bool> {
        match self
            .lock()
            .users
            .get_mut(&user_id)
            .and_then(|a| a.organizer.as_mut())
        {
            Some(organizer) => {
                organizer.avatar = Some(avatar.clone());
                Ok(true)
            },
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn list(&self, include_archived: bool) -> Result<Vec<Category>> {
        let mut categories: Vec<_> = self
            .lock()
            .categories
            .values()
            .filter(|c| include_archived || !c.is_archived)
            .cloned()
            .collect();
        categories.sort_by_key(|c| (c.sort_order, c.id));
        Ok(categories)
    }

    async fn create(&self, name: &str, sort_order: i32) -> Result<Category> {
        let mut tables = self.lock();
        if tables.categories.values().any(|c| c.name == name) {
            return Err(ServerError::Conflict("category name already exists".into()));
        }

        let category = Category {
            id: tables.next_id(),
            name: name.to_owned(),
            is_archived: false,
            sort_order,
        };
        tables.categories.insert(category.id, category.clone());

        Ok(category)
    }

    async fn update(&self, id: i64, update: &UpdateCategory) -> Result<Option<Category>> {
        let mut tables = self.lock();
        if let Some(name) = &update.name {
            if tables.categories.values().any(|c| c.id != id && &c.name == name) {
                return Err(ServerError::Conflict("category name already exists".into()));
            }
        }

        Ok(tables.categories.get_mut(&id).map(|category| {
            if let Some(name) = &update.name {
                category.name = name.clone();
            }
            if let Some(is_archived) = update.is_archived {
                category.is_archived = is_archived;
            }
            if let Some(sort_order) = update.sort_order {
                category.sort_order = sort_order;
            }
            category.clone()
        }))
    }

    async fn usable(&self, ids: &[i64]) -> Result<Vec<i64>> {
        let tables = self.lock();
        Ok(ids
            .iter()
            .copied()
            .filter(|id| tables.categories.get(id).is_some_and(|c| !c.is_archived))
            .collect())
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn list_public(&self, query: &ListQuery) -> Result<Vec<Event>> {
        let tables = self.lock();
        let mut events = tables.events_where(|e| {
            e.is_listed()
                && (query.category_ids.is_empty()
                    || e.category_ids.iter().any(|c| query.category_ids.contains(c)))
                && query.after.as_ref().is_none_or(|cursor| cursor.admits(query.sort, e))
        });

        if query.sort == SortKey::CreatedAt {
            events.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        }
        events.truncate(query.fetch.max(0) as usize);

        Ok(events)
    }

    async fn find(&self, id: i64) -> Result<Option<Event>> {
        Ok(self.lock().event(id))
    }

    async fn ticket_types(&self, event_id: i64) -> Result<Vec<TicketType>> {
        Ok(self
            .lock()
            .ticket_types
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn create(&self, event: &NewEvent) -> Result<i64> {
        let mut tables = self.lock();
        let id = tables.next_id();
        let created_at = tables.now();

        for ticket in &event.ticket_types {
            let ticket_id = tables.next_id();
            tables.ticket_types.insert(ticket_id, TicketType {
                id: ticket_id,
                event_id: id,
                name: ticket.name.clone(),
                price: ticket.price,
                capacity: ticket.capacity,
            });
        }

        let mut category_ids = event.category_ids.clone();
        category_ids.sort_unstable();
        category_ids.dedup();

        tables.events.insert(id, Event {
            id,
            organizer_id: event.organizer_id,
            organizer_name: None,
            title: event.title.clone(),
            description: event.description.clone(),
            start_at: event.start_at,
            end_at: event.end_at,
            location: event.location.clone(),
            is_online: event.is_online,
            is_public: event.is_public,
            status: EventStatus::Active,
            created_at,
            category_ids,
        });

        Ok(id)
    }

    async fn transition(&self, id: i64, from: EventStatus, to: EventStatus) -> Result<bool> {
        match self.lock().events.get_mut(&id) {
            Some(event) if event.status == from => {
                event.status = to;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn by_organizer(&self, organizer_id: i64) -> Result<Vec<Event>> {
        Ok(self
            .lock()
            .events_where(|e| e.organizer_id == organizer_id && e.is_listed()))
    }

    async fn moderated(&self) -> Result<Vec<Event>> {
        Ok(self
            .lock()
            .events_where(|e| matches!(e.status, EventStatus::Active | EventStatus::Blocked)))
    }

    async fn add_image(
        &self,
        event_id: i64,
        image: &Binary,
        file_name: Option<&str>,
    ) -> Result<i64> {
        let mut tables = self.lock();
        let id = tables.next_id();
        tables.images.insert(id, EventImage {
            id,
            event_id,
            content: image.content.clone(),
            content_type: image.content_type.clone(),
            file_name: file_name.map(str::to_owned),
        });

        Ok(id)
    }

    async fn image(&self, event_id: i64, image_id: i64) -> Result<Option<EventImage>> {
        Ok(self
            .lock()
            .images
            .get(&image_id)
            .filter(|i| i.event_id == event_id)
            .cloned())
    }
}

#[async_trait]
impl RegistrationRepository for MemoryStore {
    async fn has_active(&self, event_id: i64, email: &str) -> Result<bool> {
        Ok(self
            .lock()
            .registrations
            .values()
            .any(|r| r.event_id == event_id && r.email == email && r.status.is_active()))
    }

    async fn count_active(&self, ticket_type_id: i64) -> Result<i64> {
        Ok(self
            .lock()
            .registrations
            .values()
            .filter(|r| r.ticket_type_id == ticket_type_id && r.status.is_active())
            .count() as i64)
    }

    async fn reserve(&self, registration: &NewRegistration, capacity: i32) -> Result<i64> {
        let mut tables = self.lock();
        if !tables.ticket_types.contains_key(&registration.ticket_type_id) {
            return Err(ServerError::NotFound);
        }

        let mut taken = 0;
        for r in tables.registrations.values().filter(|r| r.status.is_active()) {
            if r.event_id == registration.event_id && r.email == registration.email {
                return Err(ServerError::Conflict("already registered for this event".into()));
            }
            if r.ticket_type_id == registration.ticket_type_id {
                taken += 1;
            }
        }
        if taken >= i64::from(capacity) {
            return Err(ServerError::CapacityExceeded);
        }

        let id = tables.next_id();
        let created_at = tables.now();
        tables.registrations.insert(id, Registration {
            id,
            event_id: registration.event_id,
            ticket_type_id: registration.ticket_type_id,
            user_id: registration.user_id,
            email: registration.email.clone(),
            first_name: registration.first_name.clone(),
            last_name: registration.last_name.clone(),
            middle_name: registration.middle_name.clone(),
            phone: registration.phone.clone(),
            status: RegistrationStatus::Registered,
            checked_in_at: None,
            created_at,
        });

        Ok(id)
    }

    async fn find(&self, id: i64) -> Result<Option<Registration>> {
        Ok(self.lock().registrations.get(&id).cloned())
    }

    async fn cancel(&self, id: i64) -> Result<bool> {
        match self.lock().registrations.get_mut(&id) {
            Some(r) if r.status.is_active() => {
                r.status = RegistrationStatus::Cancelled;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn check_in(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        match self.lock().registrations.get_mut(&id) {
            Some(r) if r.status == RegistrationStatus::Registered => {
                r.status = RegistrationStatus::CheckedIn;
                r.checked_in_at = Some(at);
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn active_for_event(&self, event_id: i64) -> Result<Vec<Registration>> {
        Ok(self
            .lock()
            .registrations_where(|r| r.event_id == event_id && r.status.is_active()))
    }

    async fn for_event(&self, event_id: i64) -> Result<Vec<Registration>> {
        Ok(self.lock().registrations_where(|r| r.event_id == event_id))
    }

    async fn for_user(&self, user_id: i64, email: &str) -> Result<Vec<MyRegistration>> {
        let tables = self.lock();
        let mut mine = Vec::new();

        for r in tables
            .registrations
            .values()
            .filter(|r| r.user_id == Some(user_id) || r.email == email)
        {
            let (Some(event), Some(ticket)) = (
                tables.events.get(&r.event_id),
                tables.ticket_types.get(&r.ticket_type_id),
            ) else {
                continue;
            };
            mine.push(MyRegistration {
                id: r.id,
                event_id: r.event_id,
                event_title: event.title.clone(),
                event_start_at: event.start_at,
                ticket_type_name: ticket.name.clone(),
                status: r.status,
                checked_in_at: r.checked_in_at,
                created_at: r.created_at,
            });
        }
        mine.sort_by(|a, b| (b.event_start_at, b.id).cmp(&(a.event_start_at, a.id)));

        Ok(mine)
    }
}

#[async_trait]
impl ModerationRepository for MemoryStore {
    async fn block_organizer(&self, user_id: i64) -> Result<Option<Vec<Event>>> {
        let mut tables = self.lock();
        match tables.users.get_mut(&user_id) {
            Some(account) if account.user.roles.contains(&Role::Organizer) => {
                account.user.is_blocked = true;
            },
            _ => return Ok(None),
        }

        let mut cancelled = Vec::new();
        for event in tables.events.values_mut() {
            if event.organizer_id == user_id && event.status == EventStatus::Active {
                event.status = EventStatus::Cancelled;
                cancelled.push(event.id);
            }
        }

        Ok(Some(
            cancelled.into_iter().filter_map(|id| tables.event(id)).collect(),
        ))
    }

    async fn block_user(&self, user_id: i64) -> Result<Option<Vec<Registration>>> {
        let mut tables = self.lock();
        let Some(account) = tables.users.get_mut(&user_id) else {
            return Ok(None);
        };
        account.user.is_blocked = true;

        let mut cancelled = Vec::new();
        for r in tables.registrations.values_mut() {
            if r.user_id == Some(user_id) && r.status.is_active() {
                cancelled.push(r.clone());
                r.status = RegistrationStatus::Cancelled;
            }
        }

        Ok(Some(cancelled))
    }

    async fn unblock(&self, user_id: i64, role: Option<Role>) -> Result<bool> {
        match self.lock().users.get_mut(&user_id) {
            Some(account) if role.is_none_or(|r| account.user.roles.contains(&r)) => {
                account.user.is_blocked = false;
                Ok(true)
            },
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ReminderRepository for MemoryStore {
    async fn due_events(
        &self,
        kind: ReminderKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let tables = self.lock();
        Ok(tables.events_where(|e| {
            e.status == EventStatus::Active
                && e.start_at >= from
                && e.start_at <= to
                && !tables.reminders.contains(&(e.id, kind.as_str()))
        }))
    }

    async fn mark_sent(&self, event_id: i64, kind: ReminderKind, _at: DateTime<Utc>) -> Result<bool> {
        Ok(self.lock().reminders.insert((event_id, kind.as_str())))
    }
}

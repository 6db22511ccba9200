//! In-process [`Store`] keeping everything in vectors behind one mutex.
//!
//! Used as a test double and for running the HTTP layer without
//! PostgreSQL. The lock is never held across an `.await`, which keeps
//! [`ticket::Store::update_ticket_status`] a true compare-and-set.
//!
//! [`Store`]: super::Store

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use itertools::Itertools as _;

use super::{
    access_log, building, ticket, user, AccessLog, Building, Error, Ticket,
    User,
};

#[derive(Debug, Default)]
pub struct Memory {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tickets: Vec<Ticket>,
    users: Vec<User>,
    buildings: Vec<Building>,
    access_logs: Vec<AccessLog>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_building(mut self, building: Building) -> Self {
        self.inner_mut().buildings.push(building);
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.inner_mut().users.push(user);
        self
    }

    pub fn with_access_log(mut self, log: AccessLog) -> Self {
        self.inner_mut().access_logs.push(log);
        self
    }

    fn inner_mut(&mut self) -> &mut Inner {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, Error> {
        self.inner
            .lock()
            .map_err(|_| Error::Unavailable("memory store poisoned".into()))
    }
}

#[async_trait]
impl ticket::Store for Memory {
    async fn insert_ticket(
        &self,
        draft: ticket::Draft,
    ) -> Result<Ticket, Error> {
        let ticket = Ticket {
            id: ticket::Id::new(),
            requester_id: draft.requester_id,
            building_id: draft.building_id,
            description: draft.description,
            status: ticket::Status::Pending,
            response: None,
            created_at: ticket::now(),
        };
        self.lock()?.tickets.push(ticket.clone());
        Ok(ticket)
    }

    async fn get_tickets_by_requester(
        &self,
        requester_id: &user::Id,
    ) -> Result<Vec<Ticket>, Error> {
        Ok(self
            .lock()?
            .tickets
            .iter()
            .filter(|t| &t.requester_id == requester_id)
            .cloned()
            .collect())
    }

    async fn get_tickets(&self) -> Result<Vec<Ticket>, Error> {
        Ok(self.lock()?.tickets.clone())
    }

    async fn get_ticket_by_id(
        &self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Error> {
        Ok(self.lock()?.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn update_ticket_status(
        &self,
        id: ticket::Id,
        expected: ticket::Status,
        response: ticket::Response,
    ) -> Result<Option<Ticket>, Error> {
        let mut inner = self.lock()?;
        let Some(ticket) = inner
            .tickets
            .iter_mut()
            .find(|t| t.id == id && t.status == expected)
        else {
            return Ok(None);
        };
        ticket.status = response.status.into();
        ticket.response = Some(response);
        Ok(Some(ticket.clone()))
    }
}

#[async_trait]
impl user::Store for Memory {
    async fn get_users(
        &self,
        role: Option<user::Role>,
    ) -> Result<Vec<User>, Error> {
        Ok(self
            .lock()?
            .users
            .iter()
            .filter(|u| role.map_or(true, |role| u.role == role))
            .sorted_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)))
            .cloned()
            .collect())
    }

    async fn get_user_by_id(
        &self,
        id: &user::Id,
    ) -> Result<Option<User>, Error> {
        Ok(self.lock()?.users.iter().find(|u| &u.id == id).cloned())
    }

    async fn get_user_by_login(
        &self,
        login: &str,
    ) -> Result<Option<User>, Error> {
        Ok(self.lock()?.users.iter().find(|u| u.login == login).cloned())
    }

    async fn get_roommates(&self, id: &user::Id) -> Result<Vec<User>, Error> {
        let inner = self.lock()?;
        let Some(User {
            building_id: Some(building_id),
            room: Some(room),
            ..
        }) = inner.users.iter().find(|u| &u.id == id)
        else {
            return Ok(Vec::new());
        };
        Ok(inner
            .users
            .iter()
            .filter(|u| {
                &u.id != id
                    && u.building_id.as_ref() == Some(building_id)
                    && u.room.as_ref() == Some(room)
            })
            .sorted_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)))
            .cloned()
            .collect())
    }

    async fn get_guests(
        &self,
        host_id: &user::Id,
    ) -> Result<Vec<User>, Error> {
        Ok(self
            .lock()?
            .users
            .iter()
            .filter(|u| u.host_id.as_ref() == Some(host_id))
            .sorted_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)))
            .cloned()
            .collect())
    }

    async fn insert_user(
        &self,
        draft: user::Draft,
    ) -> Result<Option<User>, Error> {
        let mut inner = self.lock()?;
        if inner.users.iter().any(|u| u.login == draft.login) {
            return Ok(None);
        }
        let user = User {
            id: user::Id::new(),
            name: draft.name,
            role: draft.role,
            login: draft.login,
            password_hash: draft.password_hash,
            building_id: draft.building_id,
            room: draft.room,
            host_id: draft.host_id,
        };
        inner.users.push(user.clone());
        Ok(Some(user))
    }
}

#[async_trait]
impl building::Store for Memory {
    async fn get_buildings(&self) -> Result<Vec<Building>, Error> {
        Ok(self
            .lock()?
            .buildings
            .iter()
            .sorted_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)))
            .cloned()
            .collect())
    }

    async fn get_building_by_id(
        &self,
        id: &building::Id,
    ) -> Result<Option<Building>, Error> {
        Ok(self.lock()?.buildings.iter().find(|b| &b.id == id).cloned())
    }
}

#[async_trait]
impl access_log::Store for Memory {
    async fn get_access_logs(&self) -> Result<Vec<AccessLog>, Error> {
        Ok(self
            .lock()?
            .access_logs
            .iter()
            .sorted_by(|a, b| {
                b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
            })
            .cloned()
            .collect())
    }

    async fn get_access_logs_by_building(
        &self,
        building_id: &building::Id,
    ) -> Result<Vec<AccessLog>, Error> {
        Ok(self
            .lock()?
            .access_logs
            .iter()
            .filter(|l| &l.building_id == building_id)
            .sorted_by(|a, b| {
                b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::db::{
        access_log::Store as _, building::Store as _, ticket::Store as _,
        user::Store as _,
    };

    fn draft(requester: &str, building: &str) -> ticket::Draft {
        ticket::Draft {
            requester_id: requester.into(),
            building_id: building.into(),
            description: None,
        }
    }

    fn user(id: &str, name: &str, room: Option<&str>) -> User {
        User {
            id: id.into(),
            name: name.to_owned(),
            role: user::Role::Student,
            login: id.to_owned(),
            password_hash: user::PasswordHash::new("password").unwrap(),
            building_id: room.map(|_| "b1".into()),
            room: room.map(str::to_owned),
            host_id: None,
        }
    }

    #[tokio::test]
    async fn keeps_tickets_in_insertion_order() {
        let store = Memory::new();
        let first = store.insert_ticket(draft("u1", "b1")).await.unwrap();
        let other = store.insert_ticket(draft("u2", "b1")).await.unwrap();
        let second = store.insert_ticket(draft("u1", "b2")).await.unwrap();

        let mine = store
            .get_tickets_by_requester(&"u1".into())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect::<Vec<_>>();
        assert_eq!(mine, [first.id, second.id]);

        let all = store
            .get_tickets()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect::<Vec<_>>();
        assert_eq!(all, [first.id, other.id, second.id]);
    }

    #[tokio::test]
    async fn updates_status_only_when_expected() {
        let store = Memory::new();
        let ticket = store.insert_ticket(draft("u1", "b1")).await.unwrap();
        let response = ticket::Response {
            status: ticket::Decision::Denied,
            reason: "duplicate".to_owned(),
        };

        let stale = store
            .update_ticket_status(
                ticket.id,
                ticket::Status::Accepted,
                response.clone(),
            )
            .await
            .unwrap();
        assert_eq!(stale, None);

        let updated = store
            .update_ticket_status(
                ticket.id,
                ticket::Status::Pending,
                response.clone(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, ticket::Status::Denied);
        assert_eq!(updated.response, Some(response));

        let missing = store
            .update_ticket_status(
                ticket::Id::from(7),
                ticket::Status::Pending,
                updated.response.clone().unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn finds_roommates_in_same_room() {
        let store = Memory::new()
            .with_user(user("u1", "Alice", Some("101")))
            .with_user(user("u2", "Carol", Some("101")))
            .with_user(user("u3", "Bob", Some("102")))
            .with_user(user("u4", "Dave", None));

        let roommates = store.get_roommates(&"u1".into()).await.unwrap();
        assert_eq!(roommates.len(), 1);
        assert_eq!(roommates[0].name, "Carol");

        assert!(store.get_roommates(&"u4".into()).await.unwrap().is_empty());
        assert!(store.get_roommates(&"nobody".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filters_users_by_role() {
        let mut guest = user("u2", "Carol", None);
        guest.role = user::Role::Guest;
        guest.host_id = Some("u1".into());
        let store = Memory::new()
            .with_user(user("u1", "Alice", None))
            .with_user(guest);

        let guests = store.get_users(Some(user::Role::Guest)).await.unwrap();
        assert_eq!(guests.len(), 1);
        assert_eq!(guests[0].id, user::Id::from("u2"));
        assert_eq!(store.get_users(None).await.unwrap().len(), 2);
        assert_eq!(store.get_guests(&"u1".into()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inserts_user_with_unique_login() {
        let store = Memory::new().with_user(user("u1", "Alice", None));
        let draft = |login: &str| user::Draft {
            name: "Erin".to_owned(),
            role: user::Role::Staff,
            login: login.to_owned(),
            password_hash: user::PasswordHash::new("secret").unwrap(),
            building_id: None,
            room: None,
            host_id: None,
        };

        assert!(store.insert_user(draft("u1")).await.unwrap().is_none());
        let erin = store.insert_user(draft("erin")).await.unwrap().unwrap();

        assert!(!erin.id.is_empty());
        let found = store.get_user_by_login("erin").await.unwrap().unwrap();
        assert_eq!(found.id, erin.id);
        assert!(found.password_hash.verify("secret"));
        assert_eq!(store.get_users(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn lists_access_logs_newest_first() {
        let now = OffsetDateTime::now_utc();
        let log = |id, building: &str, minutes_ago| AccessLog {
            id,
            user_id: "u1".into(),
            building_id: building.into(),
            granted: true,
            created_at: now - Duration::minutes(minutes_ago),
        };
        let store = Memory::new()
            .with_building(Building {
                id: "b1".into(),
                name: "Towers".to_owned(),
            })
            .with_access_log(log(1, "b1", 30))
            .with_access_log(log(2, "b2", 20))
            .with_access_log(log(3, "b1", 10));

        let ids = |logs: Vec<AccessLog>| {
            logs.into_iter().map(|l| l.id).collect::<Vec<_>>()
        };
        assert_eq!(ids(store.get_access_logs().await.unwrap()), [3, 2, 1]);
        assert_eq!(
            ids(store
                .get_access_logs_by_building(&"b1".into())
                .await
                .unwrap()),
            [3, 1],
        );
        assert_eq!(store.get_buildings().await.unwrap().len(), 1);
    }
}

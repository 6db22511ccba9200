use std::{error::Error as StdError, sync::Arc};

use async_trait::async_trait;
use derive_more::Display;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Row,
};
use uuid::Uuid;

use super::{building, user, Client, Error};

#[derive(Clone, Debug, PartialEq)]
pub struct Ticket {
    pub id: Id,
    pub requester_id: user::Id,
    pub building_id: building::Id,
    pub description: Option<String>,
    pub status: Status,
    pub response: Option<Response>,
    pub created_at: OffsetDateTime,
}

/// Validated ticket contents, before the store assigns an id.
#[derive(Clone, Debug)]
pub struct Draft {
    pub requester_id: user::Id,
    pub building_id: building::Id,
    pub description: Option<String>,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq,
    Serialize,
)]
pub struct Id(Uuid);

impl Id {
    pub fn new() -> Self {
        Id(Uuid::new_v4())
    }
}

impl From<u128> for Id {
    fn from(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl FromSql<'_> for Id {
    accepts!(UUID);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Uuid::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(UUID);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Status {
    /// Filed and waiting for building staff.
    Pending = 1,

    /// Staff agreed to handle the request. Terminal.
    Accepted = 2,

    /// Staff refused the request. Terminal.
    Denied = 3,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

impl FromSql<'_> for Status {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let status = Self::try_from(repr).map_err(|_| "invalid status")?;
        Ok(status)
    }
}

impl ToSql for Status {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

/// Outcome a ticket can be resolved with.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Denied,
}

impl From<Decision> for Status {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Accepted => Self::Accepted,
            Decision::Denied => Self::Denied,
        }
    }
}

impl TryFrom<Status> for Decision {
    type Error = Status;

    fn try_from(status: Status) -> Result<Self, Self::Error> {
        match status {
            Status::Accepted => Ok(Self::Accepted),
            Status::Denied => Ok(Self::Denied),
            Status::Pending => Err(status),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Response {
    pub status: Decision,
    pub reason: String,
}

/// Persistence boundary for tickets.
///
/// [`Store::update_ticket_status`] is a compare-and-set: implementations
/// must apply it only while the ticket is still in `expected` status, so
/// that concurrent resolutions of one ticket cannot both succeed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_ticket(&self, draft: Draft) -> Result<Ticket, Error>;

    /// Tickets of one requester, oldest first.
    async fn get_tickets_by_requester(
        &self,
        requester_id: &user::Id,
    ) -> Result<Vec<Ticket>, Error>;

    /// All tickets, oldest first.
    async fn get_tickets(&self) -> Result<Vec<Ticket>, Error>;

    async fn get_ticket_by_id(&self, id: Id) -> Result<Option<Ticket>, Error>;

    /// Returns `None` when the ticket is missing or no longer `expected`.
    async fn update_ticket_status(
        &self,
        id: Id,
        expected: Status,
        response: Response,
    ) -> Result<Option<Ticket>, Error>;
}

#[async_trait]
impl<T: Store + ?Sized> Store for Arc<T> {
    async fn insert_ticket(&self, draft: Draft) -> Result<Ticket, Error> {
        (**self).insert_ticket(draft).await
    }

    async fn get_tickets_by_requester(
        &self,
        requester_id: &user::Id,
    ) -> Result<Vec<Ticket>, Error> {
        (**self).get_tickets_by_requester(requester_id).await
    }

    async fn get_tickets(&self) -> Result<Vec<Ticket>, Error> {
        (**self).get_tickets().await
    }

    async fn get_ticket_by_id(&self, id: Id) -> Result<Option<Ticket>, Error> {
        (**self).get_ticket_by_id(id).await
    }

    async fn update_ticket_status(
        &self,
        id: Id,
        expected: Status,
        response: Response,
    ) -> Result<Option<Ticket>, Error> {
        (**self).update_ticket_status(id, expected, response).await
    }
}

/// Current time truncated to the microseconds `TIMESTAMPTZ` keeps.
pub(super) fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - time::Duration::nanoseconds(i64::from(now.nanosecond() % 1_000))
}

const COLUMNS: &str = "id, requester_id, building_id, description, \
                       status, response_reason, created_at";

fn from_row(row: &Row) -> Result<Ticket, Error> {
    let status = row.try_get::<_, Status>("status")?;
    let response = row
        .try_get::<_, Option<String>>("response_reason")?
        .map(|reason| {
            Decision::try_from(status)
                .map(|status| Response { status, reason })
                .map_err(|_| Error::Corrupted("pending ticket with response"))
        })
        .transpose()?;
    Ok(Ticket {
        id: row.try_get("id")?,
        requester_id: row.try_get("requester_id")?,
        building_id: row.try_get("building_id")?,
        description: row.try_get("description")?,
        status,
        response,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl Store for Client {
    async fn insert_ticket(&self, draft: Draft) -> Result<Ticket, Error> {
        let sql = format!(
            "INSERT INTO tickets (id, requester_id, building_id, description, \
                                  status, response_reason, created_at) \
             VALUES ($1, $2, $3, $4, $5, NULL, $6) \
             RETURNING {COLUMNS}"
        );
        let row = self
            .0
            .query_one(
                &sql,
                &[
                    &Id::new(),
                    &draft.requester_id,
                    &draft.building_id,
                    &draft.description,
                    &Status::Pending,
                    &now(),
                ],
            )
            .await?;
        from_row(&row)
    }

    async fn get_tickets_by_requester(
        &self,
        requester_id: &user::Id,
    ) -> Result<Vec<Ticket>, Error> {
        let sql = format!(
            "SELECT {COLUMNS} FROM tickets \
             WHERE requester_id = $1 \
             ORDER BY seq ASC"
        );
        self.0
            .query(&sql, &[requester_id])
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    async fn get_tickets(&self) -> Result<Vec<Ticket>, Error> {
        let sql = format!("SELECT {COLUMNS} FROM tickets ORDER BY seq ASC");
        self.0.query(&sql, &[]).await?.iter().map(from_row).collect()
    }

    async fn get_ticket_by_id(&self, id: Id) -> Result<Option<Ticket>, Error> {
        let sql = format!("SELECT {COLUMNS} FROM tickets WHERE id = $1");
        self.0
            .query_opt(&sql, &[&id])
            .await?
            .as_ref()
            .map(from_row)
            .transpose()
    }

    async fn update_ticket_status(
        &self,
        id: Id,
        expected: Status,
        response: Response,
    ) -> Result<Option<Ticket>, Error> {
        let sql = format!(
            "UPDATE tickets \
             SET status = $3, \
                 response_reason = $4 \
             WHERE id = $1 AND status = $2 \
             RETURNING {COLUMNS}"
        );
        self.0
            .query_opt(
                &sql,
                &[
                    &id,
                    &expected,
                    &Status::from(response.status),
                    &response.reason,
                ],
            )
            .await?
            .as_ref()
            .map(from_row)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_not_terminal() {
        assert!(!Status::Pending.is_terminal());
        assert!(Status::Accepted.is_terminal());
        assert!(Status::Denied.is_terminal());
    }

    #[test]
    fn decision_maps_onto_terminal_status() {
        assert_eq!(Status::from(Decision::Accepted), Status::Accepted);
        assert_eq!(Status::from(Decision::Denied), Status::Denied);
        assert_eq!(Decision::try_from(Status::Denied), Ok(Decision::Denied));
        assert_eq!(
            Decision::try_from(Status::Pending),
            Err(Status::Pending),
        );
    }

    #[test]
    fn creation_time_has_no_sub_microsecond_part() {
        for _ in 0..100 {
            assert_eq!(now().nanosecond() % 1_000, 0);
        }
    }

    #[test]
    fn status_repr_round_trips() {
        for status in [Status::Pending, Status::Accepted, Status::Denied] {
            assert_eq!(Status::try_from(status as u8), Ok(status));
        }
        assert!(Status::try_from(0u8).is_err());
        assert!(Status::try_from(4u8).is_err());
    }
}

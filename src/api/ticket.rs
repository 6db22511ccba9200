use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{api, db};

pub use crate::db::ticket::{Decision, Id, Response, Status};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id,
    pub requester_id: api::user::Id,
    pub building_id: api::building::Id,
    pub description: Option<String>,
    pub status: Status,
    pub response: Option<Response>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<db::Ticket> for Ticket {
    fn from(ticket: db::Ticket) -> Self {
        Self {
            id: ticket.id,
            requester_id: ticket.requester_id,
            building_id: ticket.building_id,
            description: ticket.description,
            status: ticket.status,
            response: ticket.response,
            created_at: ticket.created_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct List {
    pub tickets: Vec<Ticket>,
}

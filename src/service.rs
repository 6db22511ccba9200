//! Service-ticket workflow: filing, listing and resolving tickets.
//!
//! A ticket is created `pending` and can be resolved exactly once, into
//! either `accepted` or `denied`. The workflow validates input before
//! touching the store, and relies on the store's conditional update to
//! settle concurrent resolutions of the same ticket.

use derive_more::{Display, From};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::db::{
    self, building,
    ticket::{self, Status, Store, Ticket},
    user,
};

/// Candidate ticket, as submitted by a requester.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    pub requester_id: Option<user::Id>,
    pub building_id: Option<building::Id>,
    pub description: Option<String>,
}

#[derive(Debug, Display, From)]
pub enum Error {
    /// Required field is missing or blank.
    #[display("missing required field `{_0}`")]
    Validation(&'static str),

    #[display("ticket {_0} not found")]
    NotFound(ticket::Id),

    /// Ticket is not in the status the operation requires.
    #[display("ticket {id} is {status:?}, not pending")]
    InvalidState { id: ticket::Id, status: Status },

    #[display("storage failure: {_0}")]
    #[from]
    Storage(db::Error),
}

impl std::error::Error for Error {}

pub struct Workflow<S> {
    store: S,
}

impl<S: Store> Workflow<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Files a new `pending` ticket.
    ///
    /// A candidate without a building is skipped: nothing is written and
    /// `Ok(None)` is returned. A candidate without a requester is a
    /// validation error.
    pub async fn create_ticket(
        &self,
        info: NewTicket,
    ) -> Result<Option<Ticket>, Error> {
        let Some(building_id) = info.building_id.filter(|id| !id.is_empty())
        else {
            debug!("skipping ticket without a building");
            return Ok(None);
        };
        let requester_id = info
            .requester_id
            .filter(|id| !id.is_empty())
            .ok_or(Error::Validation("requesterId"))?;

        let ticket = self
            .store
            .insert_ticket(ticket::Draft {
                requester_id,
                building_id,
                description: info.description.filter(|d| !d.trim().is_empty()),
            })
            .await?;

        info!(
            id = %ticket.id,
            requester = %ticket.requester_id,
            building = %ticket.building_id,
            "ticket filed"
        );
        Ok(Some(ticket))
    }

    /// Tickets filed by `requester_id`, oldest first.
    pub async fn list_tickets_for_user(
        &self,
        requester_id: &user::Id,
    ) -> Result<Vec<Ticket>, Error> {
        if requester_id.is_empty() {
            return Err(Error::Validation("requesterId"));
        }
        let tickets = self.store.get_tickets_by_requester(requester_id).await?;
        debug!(requester = %requester_id, count = tickets.len(), "listed tickets");
        Ok(tickets)
    }

    /// Every ticket, oldest first.
    pub async fn list_all_tickets(&self) -> Result<Vec<Ticket>, Error> {
        Ok(self.store.get_tickets().await?)
    }

    pub async fn get_ticket(&self, id: ticket::Id) -> Result<Ticket, Error> {
        self.store
            .get_ticket_by_id(id)
            .await?
            .ok_or(Error::NotFound(id))
    }

    /// Moves a `pending` ticket into the terminal status named by
    /// `response`, attaching the response to it.
    ///
    /// Callers retrying after a [`Error::Storage`] must re-read the ticket
    /// first: the update may have been applied.
    pub async fn resolve_ticket(
        &self,
        id: ticket::Id,
        response: ticket::Response,
    ) -> Result<Ticket, Error> {
        let current = self.get_ticket(id).await?;
        if current.status.is_terminal() {
            warn!(%id, status = ?current.status, "ticket already resolved");
            return Err(Error::InvalidState {
                id,
                status: current.status,
            });
        }

        let decision = response.status;
        match self
            .store
            .update_ticket_status(id, Status::Pending, response)
            .await?
        {
            Some(ticket) => {
                info!(%id, ?decision, "ticket resolved");
                Ok(ticket)
            }
            // Lost a race against another resolution.
            None => {
                let status = self.get_ticket(id).await?.status;
                warn!(%id, ?status, "ticket resolved concurrently");
                Err(Error::InvalidState { id, status })
            }
        }
    }
}

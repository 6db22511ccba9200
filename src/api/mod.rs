pub mod access_log;
pub mod building;
pub mod ticket;
pub mod user;

use serde::{Deserialize, Serialize};

pub use self::{
    access_log::AccessLog, building::Building, ticket::Ticket, user::User,
};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Welcome {
    pub version: String,
    pub message: String,
}

/// Counters polled by the admin dashboard.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub pending_tickets: usize,
    pub total_tickets: usize,
    pub buildings: Vec<Building>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Error {
    pub error: String,
}

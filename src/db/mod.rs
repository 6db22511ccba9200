pub mod access_log;
pub mod building;
pub mod memory;
pub mod ticket;
pub mod user;

use derive_more::{Display, From};
use tokio_postgres::{tls::NoTlsStream, NoTls, Socket};

use crate::config;

pub use self::{
    access_log::AccessLog, building::Building, memory::Memory,
    ticket::Ticket, user::User,
};

pub type Connection = tokio_postgres::Connection<Socket, NoTlsStream>;

const SCHEMA: &str = include_str!("../../schema.sql");

pub async fn connect(
    config: config::Db,
) -> Result<(Client, Connection), Error> {
    tokio_postgres::connect(&config.url, NoTls)
        .await
        .map(|(client, connection)| (Client(client), connection))
        .map_err(Error::from)
}

pub struct Client(tokio_postgres::Client);

impl Client {
    /// Creates missing tables and indexes. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), Error> {
        Ok(self.0.batch_execute(SCHEMA).await?)
    }
}

/// Everything the HTTP layer needs from a backing store.
pub trait Store:
    ticket::Store + user::Store + building::Store + access_log::Store
{
}

impl<T> Store for T where
    T: ticket::Store + user::Store + building::Store + access_log::Store
{
}

#[derive(Debug, Display, From)]
pub enum Error {
    #[display("postgres: {_0}")]
    #[from]
    Postgres(tokio_postgres::Error),

    /// Row is readable but violates a domain invariant.
    #[display("corrupted record: {_0}")]
    Corrupted(&'static str),

    #[display("store unavailable: {_0}")]
    Unavailable(String),
}

impl std::error::Error for Error {}

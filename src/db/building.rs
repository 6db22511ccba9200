use std::error::Error as StdError;

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Row,
};

use super::{Client, Error};

#[derive(Clone, Debug)]
pub struct Building {
    pub id: Id,
    pub name: String,
}

#[derive(
    Clone, Debug, Default, Deserialize, Display, Eq, Hash, Ord, PartialEq,
    PartialOrd, Serialize,
)]
pub struct Id(String);

impl Id {
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl FromSql<'_> for Id {
    accepts!(TEXT, VARCHAR);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        String::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(TEXT, VARCHAR);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Buildings ordered by name.
    async fn get_buildings(&self) -> Result<Vec<Building>, Error>;

    async fn get_building_by_id(
        &self,
        id: &Id,
    ) -> Result<Option<Building>, Error>;
}

fn from_row(row: &Row) -> Result<Building, Error> {
    Ok(Building {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}

#[async_trait]
impl Store for Client {
    async fn get_buildings(&self) -> Result<Vec<Building>, Error> {
        const SQL: &str = "SELECT id, name FROM buildings ORDER BY name, id";
        self.0.query(SQL, &[]).await?.iter().map(from_row).collect()
    }

    async fn get_building_by_id(
        &self,
        id: &Id,
    ) -> Result<Option<Building>, Error> {
        const SQL: &str = "SELECT id, name FROM buildings WHERE id = $1";
        self.0
            .query_opt(SQL, &[id])
            .await?
            .as_ref()
            .map(from_row)
            .transpose()
    }
}

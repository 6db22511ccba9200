use async_trait::async_trait;
use time::OffsetDateTime;
use tokio_postgres::Row;

use super::{building, user, Client, Error};

/// Single badge swipe at a building entrance.
#[derive(Clone, Debug)]
pub struct AccessLog {
    pub id: i64,
    pub user_id: user::Id,
    pub building_id: building::Id,
    pub granted: bool,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// All access logs, newest first.
    async fn get_access_logs(&self) -> Result<Vec<AccessLog>, Error>;

    /// Access logs of one building, newest first.
    async fn get_access_logs_by_building(
        &self,
        building_id: &building::Id,
    ) -> Result<Vec<AccessLog>, Error>;
}

fn from_row(row: &Row) -> Result<AccessLog, Error> {
    Ok(AccessLog {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        building_id: row.try_get("building_id")?,
        granted: row.try_get("granted")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl Store for Client {
    async fn get_access_logs(&self) -> Result<Vec<AccessLog>, Error> {
        const SQL: &str = "\
            SELECT id, user_id, building_id, granted, created_at \
            FROM access_logs \
            ORDER BY created_at DESC, id DESC";
        self.0.query(SQL, &[]).await?.iter().map(from_row).collect()
    }

    async fn get_access_logs_by_building(
        &self,
        building_id: &building::Id,
    ) -> Result<Vec<AccessLog>, Error> {
        const SQL: &str = "\
            SELECT id, user_id, building_id, granted, created_at \
            FROM access_logs \
            WHERE building_id = $1 \
            ORDER BY created_at DESC, id DESC";
        self.0
            .query(SQL, &[building_id])
            .await?
            .iter()
            .map(from_row)
            .collect()
    }
}

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{api, db};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLog {
    pub id: i64,
    pub user_id: api::user::Id,
    pub building_id: api::building::Id,
    pub granted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<db::AccessLog> for AccessLog {
    fn from(log: db::AccessLog) -> Self {
        Self {
            id: log.id,
            user_id: log.user_id,
            building_id: log.building_id,
            granted: log.granted,
            created_at: log.created_at,
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::{api, db};

pub use crate::db::user::{Id, Role};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub name: String,
    pub role: Role,
    pub building_id: Option<api::building::Id>,
    pub room: Option<String>,
    pub host_id: Option<Id>,
}

impl From<db::User> for User {
    fn from(user: db::User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            role: user.role,
            building_id: user.building_id,
            room: user.room,
            host_id: user.host_id,
        }
    }
}

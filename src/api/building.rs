use serde::{Deserialize, Serialize};

use crate::db;

pub use crate::db::building::Id;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Building {
    pub id: Id,
    pub name: String,
}

impl From<db::Building> for Building {
    fn from(building: db::Building) -> Self {
        Self {
            id: building.id,
            name: building.name,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct List {
    pub buildings: Vec<Building>,
}

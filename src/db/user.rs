use std::error::Error as StdError;

use argon2::{
    password_hash::{
        self, rand_core::OsRng, PasswordHasher as _, PasswordVerifier as _,
        SaltString,
    },
    Argon2,
};
use async_trait::async_trait;
use derive_more::Display;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Row,
};
use uuid::Uuid;

use super::{building, Client, Error};

#[derive(Clone, Debug)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub role: Role,
    pub login: String,
    pub password_hash: PasswordHash,
    pub building_id: Option<building::Id>,
    pub room: Option<String>,
    /// Student hosting this user. Set for guests only.
    pub host_id: Option<Id>,
}

/// Account contents, before the store assigns an id.
#[derive(Clone, Debug)]
pub struct Draft {
    pub name: String,
    pub role: Role,
    pub login: String,
    pub password_hash: PasswordHash,
    pub building_id: Option<building::Id>,
    pub room: Option<String>,
    pub host_id: Option<Id>,
}

#[derive(
    Clone, Debug, Default, Deserialize, Display, Eq, Hash, Ord, PartialEq,
    PartialOrd, Serialize,
)]
pub struct Id(String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

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

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student = 1,
    Guest = 2,
    Staff = 3,
    Admin = 4,
}

impl FromSql<'_> for Role {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let role = Self::try_from(repr).map_err(|_| "invalid role")?;
        Ok(role)
    }
}

impl ToSql for Role {
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

/// Argon2id hash in PHC string format.
#[derive(Clone, Debug, PartialEq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(secret: &str) -> Result<Self, password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| Self(hash.to_string()))
    }

    /// Returns `false` for a wrong secret and for a malformed stored hash.
    pub fn verify(&self, secret: &str) -> bool {
        password_hash::PasswordHash::new(&self.0).is_ok_and(|parsed| {
            Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok()
        })
    }
}

impl FromSql<'_> for PasswordHash {
    accepts!(TEXT);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        String::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for PasswordHash {
    accepts!(TEXT);

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
    /// Users ordered by name, optionally narrowed to one role.
    async fn get_users(&self, role: Option<Role>) -> Result<Vec<User>, Error>;

    async fn get_user_by_id(&self, id: &Id) -> Result<Option<User>, Error>;

    async fn get_user_by_login(
        &self,
        login: &str,
    ) -> Result<Option<User>, Error>;

    /// Other users living in the same building and room.
    async fn get_roommates(&self, id: &Id) -> Result<Vec<User>, Error>;

    async fn get_guests(&self, host_id: &Id) -> Result<Vec<User>, Error>;

    /// Returns `None` when `draft.login` is already taken.
    async fn insert_user(&self, draft: Draft) -> Result<Option<User>, Error>;
}

fn from_row(row: &Row) -> Result<User, Error> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        role: row.try_get("role")?,
        login: row.try_get("login")?,
        password_hash: row.try_get("password_hash")?,
        building_id: row.try_get("building_id")?,
        room: row.try_get("room")?,
        host_id: row.try_get("host_id")?,
    })
}

#[async_trait]
impl Store for Client {
    async fn get_users(&self, role: Option<Role>) -> Result<Vec<User>, Error> {
        const SQL: &str = "\
            SELECT id, name, role, login, password_hash, \
                   building_id, room, host_id \
            FROM users \
            WHERE $1::INT2 IS NULL OR role = $1 \
            ORDER BY name, id";
        self.0.query(SQL, &[&role]).await?.iter().map(from_row).collect()
    }

    async fn get_user_by_id(&self, id: &Id) -> Result<Option<User>, Error> {
        const SQL: &str = "\
            SELECT id, name, role, login, password_hash, \
                   building_id, room, host_id \
            FROM users \
            WHERE id = $1 \
            LIMIT 1";
        self.0
            .query_opt(SQL, &[id])
            .await?
            .as_ref()
            .map(from_row)
            .transpose()
    }

    async fn get_user_by_login(
        &self,
        login: &str,
    ) -> Result<Option<User>, Error> {
        const SQL: &str = "\
            SELECT id, name, role, login, password_hash, \
                   building_id, room, host_id \
            FROM users \
            WHERE login = $1 \
            LIMIT 1";
        self.0
            .query_opt(SQL, &[&login])
            .await?
            .as_ref()
            .map(from_row)
            .transpose()
    }

    async fn get_roommates(&self, id: &Id) -> Result<Vec<User>, Error> {
        const SQL: &str = "\
            SELECT r.id, r.name, r.role, r.login, r.password_hash, \
                   r.building_id, r.room, r.host_id \
            FROM users u \
            JOIN users r ON r.building_id = u.building_id \
                        AND r.room = u.room \
                        AND r.id <> u.id \
            WHERE u.id = $1 \
            ORDER BY r.name, r.id";
        self.0.query(SQL, &[id]).await?.iter().map(from_row).collect()
    }

    async fn get_guests(&self, host_id: &Id) -> Result<Vec<User>, Error> {
        const SQL: &str = "\
            SELECT id, name, role, login, password_hash, \
                   building_id, room, host_id \
            FROM users \
            WHERE host_id = $1 \
            ORDER BY name, id";
        self.0
            .query(SQL, &[host_id])
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    async fn insert_user(&self, draft: Draft) -> Result<Option<User>, Error> {
        const SQL: &str = "\
            INSERT INTO users (id, name, role, login, password_hash, \
                               building_id, room, host_id) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
            ON CONFLICT (login) DO NOTHING \
            RETURNING id, name, role, login, password_hash, \
                      building_id, room, host_id";
        self.0
            .query_opt(
                SQL,
                &[
                    &Id::new(),
                    &draft.name,
                    &draft.role,
                    &draft.login,
                    &draft.password_hash,
                    &draft.building_id,
                    &draft.room,
                    &draft.host_id,
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
    fn verifies_only_matching_password() {
        let hash = PasswordHash::new("password").unwrap();

        assert!(hash.verify("password"));
        assert!(!hash.verify("Password"));
        assert!(!hash.verify(""));
    }

    #[test]
    fn rejects_malformed_hash() {
        assert!(!PasswordHash("plain-text".to_owned()).verify("plain-text"));
    }

    #[test]
    fn blank_id_is_empty() {
        assert!(Id::from("").is_empty());
        assert!(Id::from("  ").is_empty());
        assert!(!Id::from("u1").is_empty());
    }
}

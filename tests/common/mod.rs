use std::time::Duration;

use lockbox::{api, config, db, http};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tokio::net::TcpListener;

pub const BUILDING_TOWERS: &str = "b1";
pub const BUILDING_COLONIES: &str = "b2";

/// Seeded store: Alice and Carol share room 101 in the Towers, Dave is
/// Alice's guest, Bob is staff. Every password is `password`.
pub fn fixtures() -> db::Memory {
    let password_hash =
        db::user::PasswordHash::new("password").expect("failed to hash");
    let user = |id: &str, name: &str, role, room: Option<&str>| db::User {
        id: id.into(),
        name: name.to_owned(),
        role,
        login: name.to_lowercase(),
        password_hash: password_hash.clone(),
        building_id: room.map(|_| BUILDING_TOWERS.into()),
        room: room.map(str::to_owned),
        host_id: None,
    };
    let now = OffsetDateTime::now_utc();
    let log = |id, user: &str, building: &str, granted, minutes_ago| {
        db::AccessLog {
            id,
            user_id: user.into(),
            building_id: building.into(),
            granted,
            created_at: now - time::Duration::minutes(minutes_ago),
        }
    };

    db::Memory::new()
        .with_building(db::Building {
            id: BUILDING_TOWERS.into(),
            name: "Towers".to_owned(),
        })
        .with_building(db::Building {
            id: BUILDING_COLONIES.into(),
            name: "The Colonies".to_owned(),
        })
        .with_user(user("u1", "Alice", api::user::Role::Student, Some("101")))
        .with_user(user("u2", "Carol", api::user::Role::Student, Some("101")))
        .with_user(user("u3", "Bob", api::user::Role::Staff, None))
        .with_user(db::User {
            host_id: Some("u1".into()),
            ..user("u4", "Dave", api::user::Role::Guest, None)
        })
        .with_access_log(log(1, "u1", BUILDING_TOWERS, true, 30))
        .with_access_log(log(2, "u4", BUILDING_COLONIES, false, 20))
        .with_access_log(log(3, "u2", BUILDING_TOWERS, true, 10))
}

pub struct Client {
    inner: reqwest::Client,
    base_url: String,
    pub auth_token: Option<String>,
}

impl Client {
    /// Serves a fresh app over [`fixtures`] on an ephemeral port.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind");
        let addr = listener.local_addr().expect("no local address");
        let app = http::router(http::AppState::new(
            fixtures(),
            &config::Jwt {
                secret: "test-secret".to_owned(),
                expiration_time: Duration::from_secs(60 * 60),
            },
        ));
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server failed");
        });

        Self {
            inner: reqwest::Client::new(),
            base_url: format!("http://{addr}"),
            auth_token: None,
        }
    }

    pub async fn auth(mut self, login: &str, password: &str) -> Self {
        self.auth_token = Some(
            self.try_auth(login, password)
                .await
                .expect("wrong status code"),
        );
        self
    }

    pub async fn try_auth(
        &self,
        login: &str,
        password: &str,
    ) -> Result<String, StatusCode> {
        Ok(self
            .inner
            .post(format!("{}/auth", self.base_url))
            .json(&json!({
                "login": login,
                "password": password,
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .text()
            .await
            .expect("failed to get a response"))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        mut req: RequestBuilder,
    ) -> Result<T, StatusCode> {
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        Ok(req
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<T>()
            .await
            .expect("failed to get a response"))
    }

    /// Sends a request expected to fail and returns its status and JSON
    /// error body.
    pub async fn send_failing(
        &self,
        mut req: RequestBuilder,
    ) -> (StatusCode, api::Error) {
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        let res = req.send().await.expect("failed to send a request");
        let status = res.status();
        assert!(!status.is_success(), "unexpected success: {status}");
        let body = res
            .json::<api::Error>()
            .await
            .expect("error body is not JSON");
        (status, body)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.inner.get(format!("{}{path}", self.base_url))
    }

    pub async fn welcome(&self) -> Result<api::Welcome, StatusCode> {
        self.send(self.get("/")).await
    }

    pub async fn users(
        &self,
        role: Option<&str>,
    ) -> Result<Vec<api::User>, StatusCode> {
        let path = match role {
            Some(role) => format!("/users?role={role}"),
            None => "/users".to_owned(),
        };
        self.send(self.get(&path)).await
    }

    pub async fn add_user(&self, body: Value) -> Result<api::User, StatusCode> {
        let req = self
            .inner
            .post(format!("{}/users", self.base_url))
            .json(&body);
        self.send(req).await
    }

    pub async fn user(&self, id: &str) -> Result<api::User, StatusCode> {
        self.send(self.get(&format!("/users/{id}"))).await
    }

    pub async fn roommates(
        &self,
        id: &str,
    ) -> Result<Vec<api::User>, StatusCode> {
        self.send(self.get(&format!("/users/{id}/roommates"))).await
    }

    pub async fn guests(&self, id: &str) -> Result<Vec<api::User>, StatusCode> {
        self.send(self.get(&format!("/users/{id}/guests"))).await
    }

    pub async fn access_logs(
        &self,
    ) -> Result<Vec<api::AccessLog>, StatusCode> {
        self.send(self.get("/logs")).await
    }

    pub async fn buildings(&self) -> Result<api::building::List, StatusCode> {
        self.send(self.get("/buildings")).await
    }

    pub async fn building(
        &self,
        id: &str,
    ) -> Result<api::Building, StatusCode> {
        self.send(self.get(&format!("/buildings/{id}"))).await
    }

    pub async fn building_access_logs(
        &self,
        id: &str,
    ) -> Result<Vec<api::AccessLog>, StatusCode> {
        self.send(self.get(&format!("/buildings/{id}/logs"))).await
    }

    pub async fn tickets(&self) -> Result<api::ticket::List, StatusCode> {
        self.send(self.get("/service")).await
    }

    pub async fn user_tickets(
        &self,
        requester_id: &str,
    ) -> Result<api::ticket::List, StatusCode> {
        self.send(self.get(&format!("/service/{requester_id}"))).await
    }

    pub async fn ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::Ticket, StatusCode> {
        self.send(self.get(&format!("/service/ticket/{id}"))).await
    }

    /// Files a ticket from a raw body, so tests can omit fields.
    pub async fn add_ticket_raw(
        &self,
        body: Value,
    ) -> Result<api::Ticket, StatusCode> {
        let req = self
            .inner
            .post(format!("{}/service", self.base_url))
            .json(&body);
        self.send(req).await
    }

    pub async fn add_ticket(
        &self,
        requester_id: &str,
        building_id: &str,
        description: &str,
    ) -> Result<api::Ticket, StatusCode> {
        self.add_ticket_raw(json!({
            "requesterId": requester_id,
            "buildingId": building_id,
            "description": description,
        }))
        .await
    }

    pub fn patch(&self, path: &str) -> RequestBuilder {
        self.inner.patch(format!("{}{path}", self.base_url))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.inner.post(format!("{}{path}", self.base_url))
    }

    pub async fn resolve_ticket(
        &self,
        id: api::ticket::Id,
        status: &str,
        reason: &str,
    ) -> Result<api::Ticket, StatusCode> {
        let req = self
            .inner
            .patch(format!("{}/service/{id}", self.base_url))
            .json(&json!({
                "response": {
                    "status": status,
                    "reason": reason,
                }
            }));
        self.send(req).await
    }

    pub async fn dashboard(&self) -> Result<api::Dashboard, StatusCode> {
        self.send(self.get("/dashboard")).await
    }
}

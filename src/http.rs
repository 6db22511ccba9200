//! Route dispatcher: maps HTTP requests onto workflow and store calls.

use std::{sync::Arc, time::Duration};

use argon2::password_hash;
use async_trait::async_trait;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, RequestPartsExt as _, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use derive_more::From;
use jsonwebtoken::{
    decode, encode, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::{
    api, config,
    db::{self, access_log::Store as _, building::Store as _, user::Store as _},
    service::{self, NewTicket, Workflow},
};

pub type SharedAppState<S> = Arc<AppState<S>>;

pub struct AppState<S> {
    store: Arc<S>,

    workflow: Workflow<Arc<S>>,

    jwt_expiration_time: Duration,

    jwt_decoding_key: DecodingKey,

    jwt_encoding_key: EncodingKey,
}

impl<S: db::Store> AppState<S> {
    pub fn new(store: S, jwt: &config::Jwt) -> Self {
        let store = Arc::new(store);
        Self {
            workflow: Workflow::new(Arc::clone(&store)),
            store,
            jwt_expiration_time: jwt.expiration_time,
            jwt_decoding_key: DecodingKey::from_secret(jwt.secret.as_bytes()),
            jwt_encoding_key: EncodingKey::from_secret(jwt.secret.as_bytes()),
        }
    }
}

pub fn router<S: db::Store + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/auth", post(auth::<S>))
        .route("/users", get(list_users::<S>).post(add_user::<S>))
        .route("/users/:id", get(get_user::<S>))
        .route("/users/:id/roommates", get(list_roommates::<S>))
        .route("/users/:id/guests", get(list_guests::<S>))
        .route("/logs", get(list_access_logs::<S>))
        .route("/buildings", get(list_buildings::<S>))
        .route("/buildings/:id", get(get_building::<S>))
        .route("/buildings/:id/logs", get(list_building_access_logs::<S>))
        .route("/service", get(list_tickets::<S>).post(add_ticket::<S>))
        .route(
            "/service/:id",
            get(list_user_tickets::<S>).patch(resolve_ticket::<S>),
        )
        .route("/service/ticket/:id", get(get_ticket::<S>))
        .route("/dashboard", get(dashboard::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn welcome() -> Json<api::Welcome> {
    let version = env!("CARGO_PKG_VERSION");
    Json(api::Welcome {
        version: version.to_owned(),
        message: format!("Welcome to the Lockbox API {version}"),
    })
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(api::Error {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Malformed path, query or body.
#[derive(Debug)]
pub struct Rejection {
    status: StatusCode,
    message: String,
}

impl From<PathRejection> for Rejection {
    fn from(rejection: PathRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for Rejection {
    fn from(rejection: QueryRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<JsonRejection> for Rejection {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        error_response(self.status, self.message)
    }
}

#[derive(Deserialize)]
struct AuthInput {
    login: String,
    password: String,
}

async fn auth<S: db::Store>(
    State(state): State<SharedAppState<S>>,
    input: Result<Json<AuthInput>, JsonRejection>,
) -> Result<String, AuthError> {
    use AuthError as E;

    let Json(AuthInput { login, password }) =
        input.map_err(Rejection::from)?;
    let user = state
        .store
        .get_user_by_login(&login)
        .await?
        .filter(|u| u.password_hash.verify(&password))
        .ok_or(E::WrongLoginOrPassword)?;

    let expires_at = OffsetDateTime::now_utc() + state.jwt_expiration_time;
    encode(
        &Header::default(),
        &AuthClaims {
            user_id: user.id,
            exp: expires_at.unix_timestamp(),
        },
        &state.jwt_encoding_key,
    )
    .map_err(|_| E::InvalidToken)
}

#[derive(Debug, From)]
pub enum AuthError {
    #[from]
    DbError(db::Error),
    InvalidToken,
    #[from]
    Rejected(Rejection),
    WrongLoginOrPassword,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => {
                error!("auth lookup failed: {e}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage failure",
                )
            }
            Self::InvalidToken => error_response(
                StatusCode::UNAUTHORIZED,
                "missing or invalid token",
            ),
            Self::Rejected(rejection) => rejection.into_response(),
            Self::WrongLoginOrPassword => error_response(
                StatusCode::FORBIDDEN,
                "wrong login or password",
            ),
        }
    }
}

#[derive(Deserialize)]
struct ListUsersInput {
    role: Option<api::user::Role>,
}

async fn list_users<S: db::Store>(
    State(state): State<SharedAppState<S>>,
    query: Result<Query<ListUsersInput>, QueryRejection>,
) -> Result<Json<Vec<api::User>>, LookupError> {
    let Query(ListUsersInput { role }) = query.map_err(Rejection::from)?;
    let users = state.store.get_users(role).await?;
    Ok(Json(users.into_iter().map(api::User::from).collect()))
}

async fn get_user<S: db::Store>(
    State(state): State<SharedAppState<S>>,
    Path(id): Path<api::user::Id>,
) -> Result<Json<api::User>, LookupError> {
    let user = state
        .store
        .get_user_by_id(&id)
        .await?
        .ok_or(LookupError::NotFound("user"))?;
    Ok(Json(user.into()))
}

async fn list_roommates<S: db::Store>(
    State(state): State<SharedAppState<S>>,
    Path(id): Path<api::user::Id>,
) -> Result<Json<Vec<api::User>>, LookupError> {
    state
        .store
        .get_user_by_id(&id)
        .await?
        .ok_or(LookupError::NotFound("user"))?;
    let roommates = state.store.get_roommates(&id).await?;
    Ok(Json(roommates.into_iter().map(api::User::from).collect()))
}

async fn list_guests<S: db::Store>(
    State(state): State<SharedAppState<S>>,
    Path(id): Path<api::user::Id>,
) -> Result<Json<Vec<api::User>>, LookupError> {
    state
        .store
        .get_user_by_id(&id)
        .await?
        .ok_or(LookupError::NotFound("user"))?;
    let guests = state.store.get_guests(&id).await?;
    Ok(Json(guests.into_iter().map(api::User::from).collect()))
}

async fn list_access_logs<S: db::Store>(
    State(state): State<SharedAppState<S>>,
) -> Result<Json<Vec<api::AccessLog>>, LookupError> {
    let logs = state.store.get_access_logs().await?;
    Ok(Json(logs.into_iter().map(api::AccessLog::from).collect()))
}

async fn list_buildings<S: db::Store>(
    State(state): State<SharedAppState<S>>,
) -> Result<Json<api::building::List>, LookupError> {
    let buildings = state.store.get_buildings().await?;
    Ok(Json(api::building::List {
        buildings: buildings.into_iter().map(api::Building::from).collect(),
    }))
}

async fn get_building<S: db::Store>(
    State(state): State<SharedAppState<S>>,
    Path(id): Path<api::building::Id>,
) -> Result<Json<api::Building>, LookupError> {
    let building = state
        .store
        .get_building_by_id(&id)
        .await?
        .ok_or(LookupError::NotFound("building"))?;
    Ok(Json(building.into()))
}

async fn list_building_access_logs<S: db::Store>(
    State(state): State<SharedAppState<S>>,
    Path(id): Path<api::building::Id>,
) -> Result<Json<Vec<api::AccessLog>>, LookupError> {
    state
        .store
        .get_building_by_id(&id)
        .await?
        .ok_or(LookupError::NotFound("building"))?;
    let logs = state.store.get_access_logs_by_building(&id).await?;
    Ok(Json(logs.into_iter().map(api::AccessLog::from).collect()))
}

#[derive(Debug, From)]
pub enum LookupError {
    #[from]
    DbError(db::Error),
    NotFound(&'static str),
    #[from]
    Rejected(Rejection),
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => {
                error!("lookup failed: {e}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage failure",
                )
            }
            Self::NotFound(what) => error_response(
                StatusCode::NOT_FOUND,
                format!("{what} not found"),
            ),
            Self::Rejected(rejection) => rejection.into_response(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddUserInput {
    name: String,
    role: api::user::Role,
    login: String,
    password: String,
    building_id: Option<api::building::Id>,
    room: Option<String>,
    host_id: Option<api::user::Id>,
}

async fn add_user<S: db::Store>(
    State(state): State<SharedAppState<S>>,
    input: Result<Json<AddUserInput>, JsonRejection>,
) -> Result<(StatusCode, Json<api::User>), AddUserError> {
    use AddUserError as E;

    let Json(input) = input.map_err(Rejection::from)?;
    for (field, value) in [
        ("name", &input.name),
        ("login", &input.login),
        ("password", &input.password),
    ] {
        if value.trim().is_empty() {
            return Err(E::Validation(field));
        }
    }
    if let Some(id) = &input.building_id {
        state
            .store
            .get_building_by_id(id)
            .await?
            .ok_or(E::UnknownBuilding)?;
    }
    if let Some(id) = &input.host_id {
        state.store.get_user_by_id(id).await?.ok_or(E::UnknownHost)?;
    }

    let password_hash =
        db::user::PasswordHash::new(&input.password).map_err(E::Hashing)?;
    let user = state
        .store
        .insert_user(db::user::Draft {
            name: input.name,
            role: input.role,
            login: input.login,
            password_hash,
            building_id: input.building_id,
            room: input.room.filter(|r| !r.trim().is_empty()),
            host_id: input.host_id,
        })
        .await?
        .ok_or(E::LoginTaken)?;

    info!(id = %user.id, login = %user.login, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[derive(Debug, From)]
pub enum AddUserError {
    #[from]
    DbError(db::Error),
    Hashing(password_hash::Error),
    LoginTaken,
    #[from]
    Rejected(Rejection),
    UnknownBuilding,
    UnknownHost,
    Validation(&'static str),
}

impl IntoResponse for AddUserError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => {
                error!("user registration failed: {e}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage failure",
                )
            }
            Self::Hashing(e) => {
                error!("password hashing failed: {e}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "password hashing failure",
                )
            }
            Self::LoginTaken => {
                error_response(StatusCode::CONFLICT, "login is already taken")
            }
            Self::Rejected(rejection) => rejection.into_response(),
            Self::UnknownBuilding => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "unknown `buildingId`",
            ),
            Self::UnknownHost => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "unknown `hostId`",
            ),
            Self::Validation(field) => error_response(
                StatusCode::BAD_REQUEST,
                format!("missing required field `{field}`"),
            ),
        }
    }
}

async fn list_tickets<S: db::Store>(
    State(state): State<SharedAppState<S>>,
) -> Result<Json<api::ticket::List>, service::Error> {
    let tickets = state.workflow.list_all_tickets().await?;
    Ok(Json(api::ticket::List {
        tickets: tickets.into_iter().map(api::Ticket::from).collect(),
    }))
}

async fn list_user_tickets<S: db::Store>(
    State(state): State<SharedAppState<S>>,
    Path(requester_id): Path<api::user::Id>,
) -> Result<Json<api::ticket::List>, service::Error> {
    let tickets = state.workflow.list_tickets_for_user(&requester_id).await?;
    Ok(Json(api::ticket::List {
        tickets: tickets.into_iter().map(api::Ticket::from).collect(),
    }))
}

async fn get_ticket<S: db::Store>(
    State(state): State<SharedAppState<S>>,
    path: Result<Path<api::ticket::Id>, PathRejection>,
) -> Result<Json<api::Ticket>, TicketError> {
    let Path(id) = path.map_err(Rejection::from)?;
    let ticket = state.workflow.get_ticket(id).await?;
    Ok(Json(ticket.into()))
}

async fn add_ticket<S: db::Store>(
    State(state): State<SharedAppState<S>>,
    claims: AuthClaims,
    info: Result<Json<NewTicket>, JsonRejection>,
) -> Result<(StatusCode, Json<api::Ticket>), TicketError> {
    let Json(mut info) = info.map_err(Rejection::from)?;
    debug!(user = %claims.user_id, "filing ticket");
    info.requester_id.get_or_insert(claims.user_id);
    let ticket = state
        .workflow
        .create_ticket(info)
        .await?
        .ok_or(TicketError::BuildingRequired)?;
    Ok((StatusCode::CREATED, Json(ticket.into())))
}

#[derive(Debug, From)]
pub enum TicketError {
    BuildingRequired,
    #[from]
    Rejected(Rejection),
    #[from]
    Workflow(service::Error),
}

impl IntoResponse for TicketError {
    fn into_response(self) -> Response {
        match self {
            Self::BuildingRequired => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "ticket was not filed: `buildingId` is required",
            ),
            Self::Rejected(rejection) => rejection.into_response(),
            Self::Workflow(e) => e.into_response(),
        }
    }
}

#[derive(Deserialize)]
struct ResolveTicketInput {
    response: api::ticket::Response,
}

async fn resolve_ticket<S: db::Store>(
    State(state): State<SharedAppState<S>>,
    claims: AuthClaims,
    path: Result<Path<api::ticket::Id>, PathRejection>,
    input: Result<Json<ResolveTicketInput>, JsonRejection>,
) -> Result<Json<api::Ticket>, TicketError> {
    let Path(id) = path.map_err(Rejection::from)?;
    let Json(ResolveTicketInput { response }) =
        input.map_err(Rejection::from)?;
    debug!(user = %claims.user_id, %id, "resolving ticket");
    let ticket = state.workflow.resolve_ticket(id, response).await?;
    Ok(Json(ticket.into()))
}

impl IntoResponse for service::Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState { .. } => StatusCode::CONFLICT,
            Self::Storage(e) => {
                error!("ticket store failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let error = match &self {
            Self::Storage(_) => "storage failure".to_owned(),
            _ => self.to_string(),
        };
        error_response(status, error)
    }
}

async fn dashboard<S: db::Store>(
    State(state): State<SharedAppState<S>>,
) -> Result<Json<api::Dashboard>, service::Error> {
    let tickets_fut = state.workflow.list_all_tickets();
    let buildings_fut = async {
        state
            .store
            .get_buildings()
            .await
            .map_err(service::Error::from)
    };
    let (tickets, buildings) = tokio::try_join!(tickets_fut, buildings_fut)?;

    Ok(Json(api::Dashboard {
        pending_tickets: tickets
            .iter()
            .filter(|t| t.status == api::ticket::Status::Pending)
            .count(),
        total_tickets: tickets.len(),
        buildings: buildings.into_iter().map(api::Building::from).collect(),
    }))
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthClaims {
    user_id: api::user::Id,
    exp: i64,
}

#[async_trait]
impl<S: db::Store> FromRequestParts<SharedAppState<S>> for AuthClaims {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let token_data = decode::<Self>(
            bearer.token(),
            &state.jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}

//! Gatekeeper: the built-in authorization thing
//!
//! Issues and revokes bearer tokens, answers the manager's token resolution
//! queries, and manages users, roles and reservations. It is deployed and
//! reached like any other thing; there is no side channel.

pub mod authorizer;
pub mod calendar;
pub mod password;
pub mod role;
pub mod user;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::StatusCode;
use base64::Engine;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::config::{DatabaseLocation, GatekeeperConfig};
use crate::db;
use crate::thing::{
    HandlerRegistry, InteractionAuthorization, Thing, ThingConfiguration, ThingDescription,
    ThingRequest, ThingResponse, Verb,
};
use crate::{Error, Result};

use authorizer::Authorizer;
use calendar::Calendar;
use role::RoleStore;
use user::{NewUser, UserStore};

/// Name the gatekeeper is inserted under
pub const GATEKEEPER_THING: &str = "gatekeeper";

/// Factory key for the gatekeeper implementation
pub const GATEKEEPER_IMPLEMENTATION: &str = "gatekeeper";

/// Bootstrap user and role with full privileges
pub const ADMINISTRATOR: &str = "administrator";

/// Role every registered user holds
pub const AUTHENTICATED_ROLE: &str = "authenticated";

const ADMINISTRATOR_LEVEL: i64 = 1000;
const AUTHENTICATED_LEVEL: i64 = 1;
const ADMINISTRATOR_EMAIL: &str = "administrator@localhost";

const DEFAULT_USERS_PER_PAGE: u32 = 10;
const DEFAULT_ROLES_PER_PAGE: u32 = 100;
const MAX_PER_PAGE: u32 = 1000;

const DESCRIPTION: &str = include_str!("../../things/gatekeeper/description.json");
const INITIAL_STATE: &str = include_str!("../../things/gatekeeper/state.json");

/// One page of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    index: u32,
    per_page: u32,
}

impl Page {
    /// Zero-based page `index` of `per_page` entries
    #[must_use]
    pub fn new(index: u32, per_page: u32) -> Self {
        Self {
            index,
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    #[must_use]
    pub fn first(per_page: u32) -> Self {
        Self::new(0, per_page)
    }

    /// Read the one-based `page` and `perPage` parameters, falling back to
    /// defaults when absent or unparsable
    fn from_request(request: &ThingRequest, default_per_page: u32) -> Self {
        let page = request
            .parameter("page")
            .and_then(|p| p.parse::<u32>().ok())
            .map_or(0, |p| p.saturating_sub(1));
        let per_page = request
            .parameter("perPage")
            .and_then(|p| p.parse().ok())
            .unwrap_or(default_per_page);
        Self::new(page, per_page)
    }

    #[must_use]
    pub fn limit(self) -> i64 {
        i64::from(self.per_page)
    }

    #[must_use]
    pub fn offset(self) -> i64 {
        i64::from(self.index) * i64::from(self.per_page)
    }
}

pub(crate) fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

type Route = fn(&Gatekeeper, &ThingRequest) -> Result<ThingResponse>;

const ROUTES: &[(&str, Verb, Route)] = &[
    ("state", Verb::Get, Gatekeeper::state),
    ("generateUserToken", Verb::Post, Gatekeeper::generate_user_token),
    ("revokeUserToken", Verb::Post, Gatekeeper::revoke_user_token),
    ("registerUser", Verb::Post, Gatekeeper::register_user),
    ("modifyUser", Verb::Post, Gatekeeper::modify_user),
    ("deleteUser", Verb::Post, Gatekeeper::delete_user),
    ("searchUsers", Verb::Post, Gatekeeper::search_users),
    ("addRole", Verb::Post, Gatekeeper::add_role),
    ("addUserRole", Verb::Post, Gatekeeper::add_user_role),
    ("searchRoles", Verb::Post, Gatekeeper::search_roles),
    ("searchReservations", Verb::Post, Gatekeeper::search_reservations),
    ("addUserReservation", Verb::Post, Gatekeeper::add_user_reservation),
    ("deleteUserReservation", Verb::Post, Gatekeeper::delete_user_reservation),
    ("ackReservation", Verb::Post, Gatekeeper::ack_reservation),
];

/// The gatekeeper thing
pub struct GateKeeperThing {
    inner: Arc<Gatekeeper>,
}

impl std::fmt::Debug for GateKeeperThing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateKeeperThing").finish_non_exhaustive()
    }
}

impl GateKeeperThing {
    /// Open the gatekeeper's store
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or migrated
    pub fn open(config: &GatekeeperConfig) -> Result<Self> {
        let pool = match &config.database {
            DatabaseLocation::Memory => db::init_memory()?,
            DatabaseLocation::File(path) => db::init(path)?,
        };
        let state: Value = serde_json::from_str(INITIAL_STATE)?;

        Ok(Self {
            inner: Arc::new(Gatekeeper {
                authorizer: Authorizer::new(
                    pool.clone(),
                    chrono::Duration::seconds(config.token_ttl_secs),
                ),
                users: UserStore::new(pool.clone()),
                roles: RoleStore::new(pool.clone()),
                calendar: Calendar::new(pool),
                state: Mutex::new(state),
                admin_password: config
                    .admin_password
                    .as_ref()
                    .map(|p| SecretString::from(p.expose_secret().to_string())),
            }),
        })
    }

    /// Deployer factory building gatekeepers from shared settings
    pub fn factory(
        config: Arc<GatekeeperConfig>,
    ) -> impl Fn(&ThingConfiguration) -> Result<Box<dyn Thing>> + Send + Sync + 'static {
        move |_| Ok(Box::new(Self::open(&config)?) as Box<dyn Thing>)
    }
}

#[async_trait]
impl Thing for GateKeeperThing {
    fn description(&self) -> Result<ThingDescription> {
        ThingDescription::from_json(DESCRIPTION)
    }

    fn register_handlers(&self, registry: &mut HandlerRegistry) -> Result<()> {
        for &(interaction, verb, route) in ROUTES {
            let gatekeeper = Arc::clone(&self.inner);
            registry.register_handler(interaction, verb, move |request: ThingRequest| {
                let response = respond(route(&gatekeeper, &request));
                async move { response }
            })?;
        }

        let gatekeeper = Arc::clone(&self.inner);
        registry.register_authorization_handler(move |request: ThingRequest| {
            let response = respond(gatekeeper.authorization_query(&request));
            async move { response }
        });
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.inner.bootstrap()
    }
}

fn respond(result: Result<ThingResponse>) -> ThingResponse {
    result.unwrap_or_else(|e| ThingResponse::from_error(&e))
}

struct Gatekeeper {
    authorizer: Authorizer,
    users: UserStore,
    roles: RoleStore,
    calendar: Calendar,
    state: Mutex<Value>,
    admin_password: Option<SecretString>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservationRequest {
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

impl Gatekeeper {
    /// Create the built-in roles and the administrator account
    fn bootstrap(&self) -> Result<()> {
        self.roles.ensure(ADMINISTRATOR, ADMINISTRATOR_LEVEL)?;
        self.roles.ensure(AUTHENTICATED_ROLE, AUTHENTICATED_LEVEL)?;

        if self.users.exists(ADMINISTRATOR)? {
            return Ok(());
        }
        let Some(password) = &self.admin_password else {
            tracing::warn!(
                "no administrator password configured, administrator account not created"
            );
            return Ok(());
        };

        self.users.register(&NewUser {
            name: ADMINISTRATOR.to_string(),
            email: ADMINISTRATOR_EMAIL.to_string(),
            password: password.expose_secret().to_string(),
        })?;
        self.roles.grant(ADMINISTRATOR, ADMINISTRATOR)?;
        tracing::info!("administrator account created");
        Ok(())
    }

    fn state(&self, _request: &ThingRequest) -> Result<ThingResponse> {
        let state = self
            .state
            .lock()
            .map_err(|_| Error::Internal("gatekeeper state lock poisoned".to_string()))?;
        Ok(ThingResponse::ok(state.clone()))
    }

    fn generate_user_token(&self, request: &ThingRequest) -> Result<ThingResponse> {
        let (username, password) = basic_credentials(request)?;
        let issued = self.authorizer.issue_token(&username, &password)?;
        Ok(ThingResponse::ok(serde_json::to_value(issued)?))
    }

    fn revoke_user_token(&self, request: &ThingRequest) -> Result<ThingResponse> {
        let token = request
            .parameter("token")
            .or_else(|| request.body_str("token"))
            .or_else(|| request.bearer_token())
            .ok_or_else(|| Error::Validation("token is required".to_string()))?;

        match self.authorizer.revoke_token(token) {
            Ok(()) | Err(Error::TokenNotFound) => Ok(ThingResponse::no_content()),
            Err(e) => Err(e),
        }
    }

    fn register_user(&self, request: &ThingRequest) -> Result<ThingResponse> {
        let user: NewUser = serde_json::from_value(request.body().clone())
            .map_err(|e| Error::Validation(e.to_string()))?;
        self.users.register(&user)?;
        Ok(ThingResponse::created())
    }

    fn modify_user(&self, request: &ThingRequest) -> Result<ThingResponse> {
        let caller = caller(request)?;
        let name = required_str(request, "name")?;
        let email = request.body_str("email");
        let password = request.body_str("password");
        if email.is_none() && password.is_none() {
            return Err(Error::Validation("nothing to modify".to_string()));
        }
        require_self_or_admin(caller, name)?;

        self.users.modify(name, email, password)?;
        Ok(ThingResponse::no_content())
    }

    fn delete_user(&self, request: &ThingRequest) -> Result<ThingResponse> {
        let caller = caller(request)?;
        let name = required_str(request, "name")?;
        if name == ADMINISTRATOR {
            return Err(Error::Forbidden("the administrator cannot be deleted".to_string()));
        }
        require_self_or_admin(caller, name)?;

        self.users.delete(name)?;
        Ok(ThingResponse::no_content())
    }

    fn search_users(&self, request: &ThingRequest) -> Result<ThingResponse> {
        require_admin(caller(request)?)?;
        let page = Page::from_request(request, DEFAULT_USERS_PER_PAGE);
        let users = self.users.search(page, request.parameter("name"))?;
        Ok(ThingResponse::ok(serde_json::to_value(users)?))
    }

    fn add_role(&self, request: &ThingRequest) -> Result<ThingResponse> {
        require_admin(caller(request)?)?;
        let name = required_str(request, "name")?;
        let level = request
            .body()
            .get("level")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Validation("level is required".to_string()))?;

        self.roles.add(name, level)?;
        Ok(ThingResponse::created())
    }

    fn add_user_role(&self, request: &ThingRequest) -> Result<ThingResponse> {
        require_admin(caller(request)?)?;
        let user = required_str(request, "user")?;
        let role = required_str(request, "role")?;

        self.roles.grant(user, role)?;
        Ok(ThingResponse::no_content())
    }

    fn search_roles(&self, request: &ThingRequest) -> Result<ThingResponse> {
        caller(request)?;
        let page = Page::from_request(request, DEFAULT_ROLES_PER_PAGE);
        let roles = self.roles.search(page, request.parameter("name"))?;
        Ok(ThingResponse::ok(serde_json::to_value(roles)?))
    }

    fn search_reservations(&self, request: &ThingRequest) -> Result<ThingResponse> {
        caller(request)?;
        let from = request
            .parameter("startDate")
            .or_else(|| request.body_str("startDate"))
            .map(|s| {
                DateTime::parse_from_rfc3339(s)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| Error::Validation(format!("invalid startDate: {e}")))
            })
            .transpose()?;

        let reservations = self.calendar.search(from)?;
        Ok(ThingResponse::ok(serde_json::to_value(reservations)?))
    }

    fn add_user_reservation(&self, request: &ThingRequest) -> Result<ThingResponse> {
        let caller = caller(request)?;
        let slot: ReservationRequest = serde_json::from_value(request.body().clone())
            .map_err(|e| Error::Validation(e.to_string()))?;

        let reservation = self
            .calendar
            .add(&caller.username, slot.start_date, slot.end_date)?;
        Ok(ThingResponse::new(
            StatusCode::CREATED,
            serde_json::to_value(reservation)?,
        ))
    }

    fn delete_user_reservation(&self, request: &ThingRequest) -> Result<ThingResponse> {
        let caller = caller(request)?;
        let id = request
            .body()
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Validation("id is required".to_string()))?;

        let reservation = self.calendar.get(id)?;
        require_self_or_admin(caller, &reservation.user)?;
        self.calendar.delete(id)?;
        Ok(ThingResponse::no_content())
    }

    fn ack_reservation(&self, request: &ThingRequest) -> Result<ThingResponse> {
        let caller = caller(request)?;
        self.calendar
            .active(&caller.username, Utc::now())?
            .ok_or_else(|| {
                Error::NotFound(format!("active reservation for '{}'", caller.username))
            })?;

        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Internal("gatekeeper state lock poisoned".to_string()))?;
        state["ackReservation"] = Value::Bool(true);
        tracing::info!(user = %caller.username, "reservation acknowledged");
        Ok(ThingResponse::no_content())
    }

    /// Resolve the token carried as the request body
    fn authorization_query(&self, request: &ThingRequest) -> Result<ThingResponse> {
        let token = request.body().as_str().unwrap_or_default();
        let authorization = self.authorizer.resolve_token(token)?;
        Ok(ThingResponse::ok(serde_json::to_value(authorization)?))
    }
}

/// Username and password from an `Authorization: Basic` header
fn basic_credentials(request: &ThingRequest) -> Result<(String, String)> {
    let encoded = request
        .header(crate::thing::envelope::HEADER_AUTHORIZATION)
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or(Error::InvalidCredentials)?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| Error::InvalidCredentials)?;
    let decoded = String::from_utf8(decoded).map_err(|_| Error::InvalidCredentials)?;
    let (username, password) = decoded.split_once(':').ok_or(Error::InvalidCredentials)?;
    Ok((username.to_string(), password.to_string()))
}

fn caller(request: &ThingRequest) -> Result<&InteractionAuthorization> {
    request.authorization().ok_or(Error::TokenNotFound)
}

fn required_str<'a>(request: &'a ThingRequest, field: &str) -> Result<&'a str> {
    request
        .body_str(field)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation(format!("{field} is required")))
}

fn require_admin(caller: &InteractionAuthorization) -> Result<()> {
    if caller.has_role(ADMINISTRATOR) {
        Ok(())
    } else {
        Err(Error::Forbidden(format!("'{}' is not an administrator", caller.username)))
    }
}

fn require_self_or_admin(caller: &InteractionAuthorization, owner: &str) -> Result<()> {
    if caller.username == owner {
        Ok(())
    } else {
        require_admin(caller)
    }
}

//! Thing manager: registry of deployed things and dispatch of calls to them
//!
//! The manager never runs business logic. It deploys and undeploys things,
//! keeps the description each one served at insertion, and forwards calls
//! to the right bus address after resolving bearer tokens with the
//! gatekeeper when an interaction is protected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::bus::MessageBus;
use crate::gatekeeper::{ADMINISTRATOR, GATEKEEPER_THING};
use crate::thing::{
    Address, Deployer, DeploymentId, InteractionAuthorization, Operation, ThingConfiguration,
    ThingDescription, ThingRequest, ThingResponse, Verb,
};
use crate::{Error, Result};

/// Registry entry for an inserted thing
#[derive(Debug, Clone)]
pub struct ThingInformation {
    pub deployment: DeploymentId,
    pub description: ThingDescription,
}

/// Summary of a registered thing for listings
#[derive(Debug, Clone, Serialize)]
pub struct ThingSummary {
    pub name: String,
    pub description: Value,
}

/// Operations on an interaction's extra data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraDataVerb {
    Get,
    Put,
    Delete,
}

impl ExtraDataVerb {
    const fn operation(self) -> Operation {
        match self {
            Self::Get => Operation::GetExtraData,
            Self::Put => Operation::PutExtraData,
            Self::Delete => Operation::DeleteExtraData,
        }
    }
}

/// Central registry and router
pub struct ThingManager {
    bus: MessageBus,
    deployer: Arc<dyn Deployer>,
    things: RwLock<HashMap<String, ThingInformation>>,
    /// Serializes insert, remove and description writes
    lifecycle: Mutex<()>,
    call_timeout: Duration,
}

impl std::fmt::Debug for ThingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThingManager")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl ThingManager {
    /// Create a manager routing over `bus`
    #[must_use]
    pub fn new(bus: MessageBus, deployer: Arc<dyn Deployer>, call_timeout: Duration) -> Self {
        Self {
            bus,
            deployer,
            things: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(()),
            call_timeout,
        }
    }

    /// Deploy a thing and record the description it serves
    ///
    /// The registry is untouched unless every step succeeds; a thing whose
    /// description cannot be read is undeployed again.
    ///
    /// # Errors
    ///
    /// Returns the deployment error, or the description retrieval error
    pub async fn insert_thing(&self, configuration: &ThingConfiguration) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let name = configuration.name.as_str();

        let deployment = self.deployer.deploy(configuration).await?;

        match self.recover_description(name).await {
            Ok(description) => {
                self.things.write().await.insert(
                    name.to_string(),
                    ThingInformation {
                        deployment,
                        description,
                    },
                );
                tracing::info!(thing = %name, "thing inserted");
                Ok(())
            }
            Err(e) => {
                tracing::error!(thing = %name, error = %e, "description unavailable, rolling back");
                if let Err(undeploy_err) = self.deployer.undeploy(&deployment).await {
                    tracing::error!(
                        thing = %name,
                        error = %undeploy_err,
                        "rollback undeploy failed"
                    );
                }
                Err(e)
            }
        }
    }

    /// Undeploy a thing and forget it
    ///
    /// # Errors
    ///
    /// Returns `ComponentNotFound` if the thing is not registered, or the
    /// undeploy error, in which case the entry is kept
    pub async fn remove_thing(&self, name: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let deployment = self
            .things
            .read()
            .await
            .get(name)
            .map(|info| info.deployment.clone())
            .ok_or_else(|| Error::ComponentNotFound(name.to_string()))?;

        self.deployer.undeploy(&deployment).await?;
        self.things.write().await.remove(name);
        tracing::info!(thing = %name, "thing removed");
        Ok(())
    }

    /// Names and cached descriptions of every registered thing
    pub async fn things(&self) -> Vec<ThingSummary> {
        let mut things: Vec<ThingSummary> = self
            .things
            .read()
            .await
            .iter()
            .map(|(name, info)| ThingSummary {
                name: name.clone(),
                description: info.description.to_value(),
            })
            .collect();
        things.sort_by(|a, b| a.name.cmp(&b.name));
        things
    }

    /// Whether a thing is registered
    pub async fn contains(&self, name: &str) -> bool {
        self.things.read().await.contains_key(name)
    }

    /// Cached description of a registered thing
    pub async fn cached_description(&self, name: &str) -> Option<ThingDescription> {
        self.things
            .read()
            .await
            .get(name)
            .map(|info| info.description.clone())
    }

    /// Forward a description read to the thing
    ///
    /// # Errors
    ///
    /// Returns `ComponentNotFound` if the thing is not registered
    pub async fn get_thing_description(
        &self,
        name: &str,
        request: ThingRequest,
    ) -> Result<ThingResponse> {
        self.require(name).await?;
        self.forward(
            name,
            &Address::thing(name, Operation::ReadDescription),
            request,
        )
        .await
    }

    /// Forward a description write and keep the cached copy in step
    ///
    /// Only administrators may rewrite a description, and a rewrite must
    /// keep every interaction with its verbs and security.
    ///
    /// # Errors
    ///
    /// Returns `ComponentNotFound` if the thing is not registered,
    /// `TokenNotFound` without a bearer token, `Forbidden` for callers who
    /// are not administrators and `Validation` if the body is not an
    /// acceptable description
    pub async fn put_thing_description(
        &self,
        name: &str,
        request: ThingRequest,
    ) -> Result<ThingResponse> {
        let _guard = self.lifecycle.lock().await;
        let current = self
            .cached_description(name)
            .await
            .ok_or_else(|| Error::ComponentNotFound(name.to_string()))?;

        let caller = match self.authorize(&request).await? {
            Authorization::Granted(caller) => caller,
            Authorization::Denied(response) => return Ok(response),
        };
        if !caller.has_role(ADMINISTRATOR) {
            return Err(Error::Forbidden(
                "only administrators may rewrite descriptions".to_string(),
            ));
        }

        let description = ThingDescription::from_value(request.body().clone())
            .map_err(|e| Error::Validation(e.to_string()))?;
        current.check_replacement(&description)?;

        let response = self
            .forward(
                name,
                &Address::thing(name, Operation::WriteDescription),
                request.authorized(caller),
            )
            .await?;

        if response.is_success() {
            if let Some(info) = self.things.write().await.get_mut(name) {
                info.description = description;
            }
            tracing::info!(thing = %name, "description updated");
        }
        Ok(response)
    }

    /// Route a call to an interaction
    ///
    /// Protected interactions are authorized first; a rejection from the
    /// gatekeeper is returned to the caller as is.
    ///
    /// # Errors
    ///
    /// Returns `ComponentNotFound`, `InteractionNotFound` or
    /// `MethodNotAllowed` for bad targets, `TokenNotFound` when a protected
    /// call carries no bearer token, and bus errors from forwarding
    pub async fn route_interaction(
        &self,
        name: &str,
        interaction: &str,
        verb: Verb,
        request: ThingRequest,
    ) -> Result<ThingResponse> {
        let protected = {
            let things = self.things.read().await;
            let info = things
                .get(name)
                .ok_or_else(|| Error::ComponentNotFound(name.to_string()))?;
            let declared = info.description.lookup(interaction).ok_or_else(|| {
                Error::InteractionNotFound {
                    thing: name.to_string(),
                    interaction: interaction.to_string(),
                }
            })?;
            if !declared.accepts(verb) {
                return Err(Error::MethodNotAllowed {
                    interaction: interaction.to_string(),
                    verb: verb.to_string(),
                });
            }
            declared.is_protected()
        };

        let request = if protected {
            match self.authorize(&request).await? {
                Authorization::Granted(authorization) => request.authorized(authorization),
                Authorization::Denied(response) => {
                    tracing::debug!(
                        thing = %name,
                        interaction,
                        status = response.status,
                        "authorization denied"
                    );
                    return Ok(response);
                }
            }
        } else {
            request
        };

        let address = Address::interaction(name, interaction, Operation::for_verb(verb));
        tracing::debug!(%address, "routing interaction");
        self.forward(name, &address, request).await
    }

    /// Route an extra-data call for an interaction
    ///
    /// # Errors
    ///
    /// Returns `ComponentNotFound` or `InteractionNotFound` for bad targets
    pub async fn route_extra_data(
        &self,
        name: &str,
        interaction: &str,
        verb: ExtraDataVerb,
        request: ThingRequest,
    ) -> Result<ThingResponse> {
        {
            let things = self.things.read().await;
            let info = things
                .get(name)
                .ok_or_else(|| Error::ComponentNotFound(name.to_string()))?;
            if info.description.lookup(interaction).is_none() {
                return Err(Error::InteractionNotFound {
                    thing: name.to_string(),
                    interaction: interaction.to_string(),
                });
            }
        }

        self.forward(
            name,
            &Address::interaction(name, interaction, verb.operation()),
            request,
        )
        .await
    }

    /// Undeploy every registered thing
    pub async fn shutdown(&self) {
        let names: Vec<String> = self.things.read().await.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.remove_thing(&name).await {
                tracing::warn!(thing = %name, error = %e, "failed to remove thing on shutdown");
            }
        }
    }

    async fn require(&self, name: &str) -> Result<()> {
        if self.contains(name).await {
            Ok(())
        } else {
            Err(Error::ComponentNotFound(name.to_string()))
        }
    }

    async fn send(&self, address: &Address, request: ThingRequest) -> Result<ThingResponse> {
        self.bus.request(address, request, self.call_timeout).await
    }

    /// Send to a registered thing
    ///
    /// A thing removed while the call was in flight is reported as not
    /// found rather than as an unbound address.
    async fn forward(
        &self,
        name: &str,
        address: &Address,
        request: ThingRequest,
    ) -> Result<ThingResponse> {
        match self.send(address, request).await {
            Err(Error::NoHandler(_)) if !self.contains(name).await => {
                Err(Error::ComponentNotFound(name.to_string()))
            }
            other => other,
        }
    }

    async fn recover_description(&self, name: &str) -> Result<ThingDescription> {
        let response = self
            .send(
                &Address::thing(name, Operation::ReadDescription),
                ThingRequest::default(),
            )
            .await?;
        if !response.is_success() {
            return Err(Error::DescriptionLoad(format!(
                "thing '{name}' answered description read with {}",
                response.status
            )));
        }
        ThingDescription::from_value(response.body)
    }

    /// Resolve the caller's bearer token through the authorizer thing
    async fn authorize(&self, request: &ThingRequest) -> Result<Authorization> {
        let token = request.bearer_token().ok_or(Error::TokenNotFound)?;
        let query = ThingRequest::with_body(Value::String(token.to_string()));
        let address = Address::thing(GATEKEEPER_THING, Operation::AuthorizationQuery);

        let response = match self.send(&address, query).await {
            Ok(response) => response,
            Err(Error::NoHandler(_)) => {
                return Err(Error::Internal("authorization service unavailable".to_string()));
            }
            Err(e) => return Err(e),
        };

        if !response.is_success() {
            return Ok(Authorization::Denied(response));
        }

        let authorization: InteractionAuthorization = serde_json::from_value(response.body)
            .map_err(|e| Error::Internal(format!("malformed authorization reply: {e}")))?;
        tracing::debug!(user = %authorization.username, "caller authorized");
        Ok(Authorization::Granted(authorization))
    }
}

enum Authorization {
    Granted(InteractionAuthorization),
    Denied(ThingResponse),
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::thing::{HandlerRegistry, Thing, ThingDeployer, launch};

    const TIMEOUT: Duration = Duration::from_secs(2);

    struct Telescope;

    #[async_trait]
    impl Thing for Telescope {
        fn description(&self) -> Result<ThingDescription> {
            ThingDescription::from_json(
                r#"{"name": "telescope", "interactions": [
                    {"name": "focus", "kind": "property", "verbs": ["get"]},
                    {"name": "whoami", "kind": "property", "verbs": ["get"], "security": "bearer"}
                ]}"#,
            )
        }

        fn register_handlers(&self, registry: &mut HandlerRegistry) -> Result<()> {
            registry.register_handler("focus", Verb::Get, |_| async {
                ThingResponse::ok(json!({"steps": 1200}))
            })?;
            registry.register_handler("whoami", Verb::Get, |req: ThingRequest| async move {
                let user = req.authorization().map(|a| a.username.clone());
                ThingResponse::ok(json!({"user": user}))
            })
        }
    }

    /// Accepts "good" for an observer and "admin" for an administrator
    struct StubAuthorizer;

    #[async_trait]
    impl Thing for StubAuthorizer {
        fn description(&self) -> Result<ThingDescription> {
            ThingDescription::from_json(r#"{"name": "gatekeeper", "interactions": []}"#)
        }

        fn register_handlers(&self, registry: &mut HandlerRegistry) -> Result<()> {
            registry.register_authorization_handler(|req: ThingRequest| async move {
                if req.body() == &json!("good") {
                    ThingResponse::ok(json!({"username": "observer", "roles": []}))
                } else if req.body() == &json!("admin") {
                    ThingResponse::ok(json!({
                        "username": "administrator",
                        "roles": [{"name": "administrator", "level": 1000}]
                    }))
                } else {
                    ThingResponse::error(axum::http::StatusCode::UNAUTHORIZED)
                }
            });
            Ok(())
        }
    }

    fn manager(bus: &MessageBus) -> ThingManager {
        let deployer = ThingDeployer::new(bus.clone())
            .with_factory("telescope", |_| Ok(Box::new(Telescope) as Box<dyn Thing>))
            .with_factory("stub-authorizer", |_| {
                Ok(Box::new(StubAuthorizer) as Box<dyn Thing>)
            });
        ThingManager::new(bus.clone(), Arc::new(deployer), TIMEOUT)
    }

    fn telescope() -> ThingConfiguration {
        ThingConfiguration::new("telescope", "telescope", json!({}))
    }

    fn bearer(token: &str) -> ThingRequest {
        bearer_with_body(token, Value::Null)
    }

    fn bearer_with_body(token: &str, body: Value) -> ThingRequest {
        ThingRequest::new(
            [("Authorization".to_string(), format!("Bearer {token}"))],
            [],
            body,
        )
    }

    async fn guarded_manager(bus: &MessageBus) -> ThingManager {
        let manager = manager(bus);
        manager
            .insert_thing(&ThingConfiguration::new("gatekeeper", "stub-authorizer", json!({})))
            .await
            .unwrap();
        manager.insert_thing(&telescope()).await.unwrap();
        manager
    }

    /// Deploys nothing that answers, recording undeploys
    #[derive(Default)]
    struct HollowDeployer {
        undeployed: StdMutex<Vec<DeploymentId>>,
    }

    #[async_trait]
    impl Deployer for HollowDeployer {
        async fn deploy(&self, _: &ThingConfiguration) -> Result<DeploymentId> {
            Ok(DeploymentId::generate())
        }

        async fn undeploy(&self, id: &DeploymentId) -> Result<()> {
            self.undeployed.lock().unwrap().push(id.clone());
            Ok(())
        }
    }

    /// Deploys real things but refuses to undeploy
    struct StuckDeployer {
        inner: ThingDeployer,
    }

    #[async_trait]
    impl Deployer for StuckDeployer {
        async fn deploy(&self, configuration: &ThingConfiguration) -> Result<DeploymentId> {
            self.inner.deploy(configuration).await
        }

        async fn undeploy(&self, _: &DeploymentId) -> Result<()> {
            Err(Error::Deployment("undeploy refused".to_string()))
        }
    }

    #[tokio::test]
    async fn insert_records_description() {
        let bus = MessageBus::new();
        let manager = manager(&bus);
        manager.insert_thing(&telescope()).await.unwrap();

        let description = manager.cached_description("telescope").await.unwrap();
        assert!(description.lookup("focus").is_some());
        assert_eq!(manager.things().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_description_rolls_back() {
        let bus = MessageBus::new();
        let deployer = Arc::new(HollowDeployer::default());
        let manager = ThingManager::new(bus, deployer.clone(), Duration::from_millis(100));

        let err = manager.insert_thing(&telescope()).await.unwrap_err();
        assert!(matches!(err, Error::NoHandler(_)));
        assert!(!manager.contains("telescope").await);
        assert_eq!(deployer.undeployed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_insert_propagates_deploy_error() {
        let bus = MessageBus::new();
        let manager = manager(&bus);
        manager.insert_thing(&telescope()).await.unwrap();
        let err = manager.insert_thing(&telescope()).await.unwrap_err();
        assert!(matches!(err, Error::Deployment(_)));
        assert!(manager.contains("telescope").await);
    }

    #[tokio::test]
    async fn route_after_remove_is_not_found() {
        let bus = MessageBus::new();
        let manager = manager(&bus);
        manager.insert_thing(&telescope()).await.unwrap();

        let ok = manager
            .route_interaction("telescope", "focus", Verb::Get, ThingRequest::default())
            .await
            .unwrap();
        assert_eq!(ok.body["steps"], 1200);

        manager.remove_thing("telescope").await.unwrap();
        let err = manager
            .route_interaction("telescope", "focus", Verb::Get, ThingRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ComponentNotFound(_)));
        assert!(matches!(
            manager.remove_thing("telescope").await,
            Err(Error::ComponentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_undeploy_keeps_entry() {
        let bus = MessageBus::new();
        let deployer = StuckDeployer {
            inner: ThingDeployer::new(bus.clone())
                .with_factory("telescope", |_| Ok(Box::new(Telescope) as Box<dyn Thing>)),
        };
        let manager = ThingManager::new(bus, Arc::new(deployer), TIMEOUT);
        manager.insert_thing(&telescope()).await.unwrap();

        assert!(manager.remove_thing("telescope").await.is_err());
        assert!(manager.contains("telescope").await);
    }

    #[tokio::test]
    async fn bad_targets_rejected_before_forwarding() {
        let bus = MessageBus::new();
        let manager = manager(&bus);
        manager.insert_thing(&telescope()).await.unwrap();

        assert!(matches!(
            manager
                .route_interaction("telescope", "slew", Verb::Get, ThingRequest::default())
                .await,
            Err(Error::InteractionNotFound { .. })
        ));
        assert!(matches!(
            manager
                .route_interaction("telescope", "focus", Verb::Post, ThingRequest::default())
                .await,
            Err(Error::MethodNotAllowed { .. })
        ));
        assert!(matches!(
            manager
                .route_interaction("nonexistent", "state", Verb::Get, ThingRequest::default())
                .await,
            Err(Error::ComponentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn protected_interaction_requires_token() {
        let bus = MessageBus::new();
        let manager = manager(&bus);
        manager
            .insert_thing(&ThingConfiguration::new("gatekeeper", "stub-authorizer", json!({})))
            .await
            .unwrap();
        manager.insert_thing(&telescope()).await.unwrap();

        let missing = manager
            .route_interaction("telescope", "whoami", Verb::Get, ThingRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(missing, Error::TokenNotFound));

        let denied = manager
            .route_interaction("telescope", "whoami", Verb::Get, bearer("bad"))
            .await
            .unwrap();
        assert_eq!(denied.status, 401);

        let granted = manager
            .route_interaction("telescope", "whoami", Verb::Get, bearer("good"))
            .await
            .unwrap();
        assert_eq!(granted.body["user"], "observer");
    }

    #[tokio::test]
    async fn unprotected_interaction_carries_no_identity() {
        let bus = MessageBus::new();
        let manager = manager(&bus);
        manager.insert_thing(&telescope()).await.unwrap();

        // No authorizer deployed; unprotected calls still route
        let response = manager
            .route_interaction("telescope", "focus", Verb::Get, bearer("good"))
            .await
            .unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn missing_authorizer_is_internal_error() {
        let bus = MessageBus::new();
        let manager = manager(&bus);
        manager.insert_thing(&telescope()).await.unwrap();

        let err = manager
            .route_interaction("telescope", "whoami", Verb::Get, bearer("good"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn description_write_updates_cache() {
        let bus = MessageBus::new();
        let manager = guarded_manager(&bus).await;

        let replacement = json!({"name": "telescope", "description": "refractor", "interactions": [
            {"name": "whoami", "kind": "property", "verbs": ["get"], "security": "bearer"},
            {"name": "focus", "kind": "property", "verbs": ["get"]}
        ]});
        let response = manager
            .put_thing_description("telescope", bearer_with_body("admin", replacement))
            .await
            .unwrap();
        assert_eq!(response.status, 204);

        let cached = manager.cached_description("telescope").await.unwrap();
        assert_eq!(cached.description.as_deref(), Some("refractor"));

        let live = manager
            .get_thing_description("telescope", ThingRequest::default())
            .await
            .unwrap();
        assert_eq!(ThingDescription::from_value(live.body).unwrap(), cached);
    }

    #[tokio::test]
    async fn description_write_requires_administrator() {
        let bus = MessageBus::new();
        let manager = guarded_manager(&bus).await;
        let opened = json!({"name": "telescope", "interactions": [
            {"name": "focus", "kind": "property", "verbs": ["get"]},
            {"name": "whoami", "kind": "property", "verbs": ["get"]}
        ]});

        let anonymous = manager
            .put_thing_description("telescope", ThingRequest::with_body(opened.clone()))
            .await
            .unwrap_err();
        assert!(matches!(anonymous, Error::TokenNotFound));

        let denied = manager
            .put_thing_description("telescope", bearer_with_body("bad", opened.clone()))
            .await
            .unwrap();
        assert_eq!(denied.status, 401);

        let observer = manager
            .put_thing_description("telescope", bearer_with_body("good", opened))
            .await
            .unwrap_err();
        assert!(matches!(observer, Error::Forbidden(_)));

        // Still protected after every rejected write
        assert!(matches!(
            manager
                .route_interaction("telescope", "whoami", Verb::Get, ThingRequest::default())
                .await,
            Err(Error::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn description_write_cannot_drop_protection() {
        let bus = MessageBus::new();
        let manager = guarded_manager(&bus).await;

        let opened = json!({"name": "telescope", "interactions": [
            {"name": "focus", "kind": "property", "verbs": ["get"]},
            {"name": "whoami", "kind": "property", "verbs": ["get"]}
        ]});
        let err = manager
            .put_thing_description("telescope", bearer_with_body("admin", opened))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let grown = json!({"name": "telescope", "interactions": [
            {"name": "focus", "kind": "property", "verbs": ["get"]},
            {"name": "whoami", "kind": "property", "verbs": ["get"], "security": "bearer"},
            {"name": "humidity", "kind": "property", "verbs": ["get"]}
        ]});
        let err = manager
            .put_thing_description("telescope", bearer_with_body("admin", grown))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let cached = manager.cached_description("telescope").await.unwrap();
        assert!(cached.lookup("whoami").unwrap().is_protected());
        assert!(cached.lookup("humidity").is_none());
    }

    #[tokio::test]
    async fn invalid_description_write_rejected() {
        let bus = MessageBus::new();
        let manager = guarded_manager(&bus).await;

        let err = manager
            .put_thing_description("telescope", bearer_with_body("admin", json!({"name": ""})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(
            manager
                .cached_description("telescope")
                .await
                .unwrap()
                .lookup("whoami")
                .is_some()
        );
    }

    #[tokio::test]
    async fn unbound_address_of_removed_thing_is_not_found() {
        let bus = MessageBus::new();
        let manager = manager(&bus);
        manager.insert_thing(&telescope()).await.unwrap();

        // Registered but not bound at this address
        let unbound = Address::interaction("telescope", "focus", Operation::PutInteraction);
        assert!(matches!(
            manager
                .forward("telescope", &unbound, ThingRequest::default())
                .await,
            Err(Error::NoHandler(_))
        ));

        manager.remove_thing("telescope").await.unwrap();
        let description = Address::thing("telescope", Operation::ReadDescription);
        assert!(matches!(
            manager
                .forward("telescope", &description, ThingRequest::default())
                .await,
            Err(Error::ComponentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn extra_data_routes_through() {
        let bus = MessageBus::new();
        let manager = manager(&bus);
        manager.insert_thing(&telescope()).await.unwrap();

        let put = manager
            .route_extra_data(
                "telescope",
                "focus",
                ExtraDataVerb::Put,
                ThingRequest::with_body(json!({"filter": "Ha"})),
            )
            .await
            .unwrap();
        assert_eq!(put.status, 204);

        let get = manager
            .route_extra_data("telescope", "focus", ExtraDataVerb::Get, ThingRequest::default())
            .await
            .unwrap();
        assert_eq!(get.body["filter"], "Ha");

        assert!(matches!(
            manager
                .route_extra_data("telescope", "slew", ExtraDataVerb::Get, ThingRequest::default())
                .await,
            Err(Error::InteractionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn shutdown_removes_everything() {
        let bus = MessageBus::new();
        let manager = manager(&bus);
        manager.insert_thing(&telescope()).await.unwrap();
        manager.shutdown().await;
        assert!(manager.things().await.is_empty());
    }

    #[tokio::test]
    async fn launched_things_answer_on_the_same_bus() {
        // A thing launched outside the deployer is reachable but unregistered
        let bus = MessageBus::new();
        let manager = manager(&bus);
        let _running = launch("telescope", Box::new(Telescope), &bus).await.unwrap();
        assert!(!manager.contains("telescope").await);
        assert!(matches!(
            manager
                .get_thing_description("telescope", ThingRequest::default())
                .await,
            Err(Error::ComponentNotFound(_))
        ));
    }
}

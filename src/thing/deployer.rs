//! Deployment of things from registered factories
//!
//! Implementations are looked up by a string key at insertion time, so new
//! kinds of thing are added by registering a constructor rather than by
//! touching the manager.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::runtime::{RunningThing, Thing, ThingConfiguration, launch};
use crate::bus::MessageBus;
use crate::{Error, Result};

/// How long an undeploy waits for the thing's task to wind down
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Opaque handle returned by a deployment, used to undeploy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeploymentId(String);

impl DeploymentId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Starts and stops things
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Start a thing and make it reachable on the bus
    ///
    /// # Errors
    ///
    /// Returns error if the thing cannot be constructed or started, or if a
    /// thing with the same name is already deployed
    async fn deploy(&self, configuration: &ThingConfiguration) -> Result<DeploymentId>;

    /// Make a deployed thing unreachable and stop it
    ///
    /// # Errors
    ///
    /// Returns error if the deployment is unknown
    async fn undeploy(&self, id: &DeploymentId) -> Result<()>;
}

/// Constructor for one kind of thing
pub type ThingFactory = Arc<dyn Fn(&ThingConfiguration) -> Result<Box<dyn Thing>> + Send + Sync>;

/// Deployer running things as tasks on the in-process bus
pub struct ThingDeployer {
    bus: MessageBus,
    factories: HashMap<String, ThingFactory>,
    deployments: Mutex<HashMap<DeploymentId, RunningThing>>,
}

impl fmt::Debug for ThingDeployer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThingDeployer")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ThingDeployer {
    #[must_use]
    pub fn new(bus: MessageBus) -> Self {
        Self {
            bus,
            factories: HashMap::new(),
            deployments: Mutex::new(HashMap::new()),
        }
    }

    /// Register a constructor under an implementation key
    #[must_use]
    pub fn with_factory<F>(mut self, implementation: &str, factory: F) -> Self
    where
        F: Fn(&ThingConfiguration) -> Result<Box<dyn Thing>> + Send + Sync + 'static,
    {
        self.factories
            .insert(implementation.to_string(), Arc::new(factory));
        self
    }

    /// Implementation keys that can be deployed
    #[must_use]
    pub fn implementations(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl Deployer for ThingDeployer {
    async fn deploy(&self, configuration: &ThingConfiguration) -> Result<DeploymentId> {
        let name = configuration.name.as_str();
        if name.trim().is_empty() {
            return Err(Error::Validation("thing name must not be empty".to_string()));
        }

        let factory = self.factories.get(&configuration.implementation).ok_or_else(|| {
            Error::Deployment(format!(
                "unknown implementation '{}'",
                configuration.implementation
            ))
        })?;

        // Held across launch so two deployments of one name cannot race
        let mut deployments = self.deployments.lock().await;
        if deployments.values().any(|d| d.name == name) {
            return Err(Error::Deployment(format!("thing '{name}' already deployed")));
        }

        let thing = factory(configuration)?;
        let running = launch(name, thing, &self.bus).await?;
        let id = DeploymentId::generate();
        tracing::info!(thing = %name, deployment = %id, "deployed");
        deployments.insert(id.clone(), running);
        Ok(id)
    }

    async fn undeploy(&self, id: &DeploymentId) -> Result<()> {
        let running = self
            .deployments
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| Error::Deployment(format!("unknown deployment {id}")))?;

        self.bus.unbind(&running.addresses).await;
        match tokio::time::timeout(STOP_GRACE, running.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(thing = %running.name, error = %e, "thing task failed"),
            Err(_) => tracing::warn!(thing = %running.name, "thing did not stop in time"),
        }

        tracing::info!(thing = %running.name, deployment = %id, "undeployed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::thing::{
        Address, HandlerRegistry, Operation, ThingDescription, ThingResponse, Verb,
    };

    struct Camera;

    #[async_trait]
    impl Thing for Camera {
        fn description(&self) -> Result<ThingDescription> {
            ThingDescription::from_json(
                r#"{"name": "camera", "interactions": [
                    {"name": "exposure", "kind": "property", "verbs": ["get"]}
                ]}"#,
            )
        }

        fn register_handlers(&self, registry: &mut HandlerRegistry) -> Result<()> {
            registry.register_handler("exposure", Verb::Get, |_| async {
                ThingResponse::ok(json!({"seconds": 30}))
            })
        }
    }

    fn deployer(bus: &MessageBus) -> ThingDeployer {
        ThingDeployer::new(bus.clone())
            .with_factory("camera", |_| Ok(Box::new(Camera) as Box<dyn Thing>))
    }

    #[tokio::test]
    async fn deploy_then_undeploy() {
        let bus = MessageBus::new();
        let deployer = deployer(&bus);
        let config = ThingConfiguration::new("camera", "camera", json!({}));
        let address = Address::thing("camera", Operation::ReadDescription);

        let id = deployer.deploy(&config).await.unwrap();
        assert!(bus.is_bound(&address).await);

        deployer.undeploy(&id).await.unwrap();
        assert!(!bus.is_bound(&address).await);
        assert!(deployer.undeploy(&id).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let bus = MessageBus::new();
        let deployer = deployer(&bus);
        let config = ThingConfiguration::new("camera", "camera", json!({}));

        deployer.deploy(&config).await.unwrap();
        let err = deployer.deploy(&config).await.unwrap_err();
        assert!(matches!(err, Error::Deployment(_)));
    }

    #[tokio::test]
    async fn unknown_implementation_rejected() {
        let bus = MessageBus::new();
        let deployer = deployer(&bus);
        let config = ThingConfiguration::new("dome", "dome", json!({}));
        assert!(matches!(
            deployer.deploy(&config).await,
            Err(Error::Deployment(_))
        ));
    }

    #[test]
    fn lists_implementations() {
        let deployer = deployer(&MessageBus::new());
        assert_eq!(deployer.implementations(), vec!["camera"]);
    }
}

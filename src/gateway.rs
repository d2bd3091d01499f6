//! Gateway assembly
//!
//! Wires the bus, the deployer and the manager together, inserts the
//! gatekeeper followed by the configured things, and serves the HTTP API.

use std::sync::Arc;

use axum::Router;
use serde_json::Value;

use crate::api::ApiServer;
use crate::bus::MessageBus;
use crate::config::{Config, ServerConfig};
use crate::gatekeeper::{GATEKEEPER_IMPLEMENTATION, GATEKEEPER_THING, GateKeeperThing};
use crate::manager::ThingManager;
use crate::thing::{ThingConfiguration, ThingDeployer};
use crate::Result;

/// A running gateway
pub struct Gateway {
    manager: Arc<ThingManager>,
    server: ServerConfig,
}

impl Gateway {
    /// Start a gateway with the built-in implementations
    ///
    /// # Errors
    ///
    /// Returns error if the gatekeeper or a configured thing cannot be inserted
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_deployer(config, |deployer| deployer).await
    }

    /// Start a gateway, letting the caller register extra implementations
    ///
    /// # Errors
    ///
    /// Returns error if the gatekeeper or a configured thing cannot be inserted
    pub async fn with_deployer<F>(config: Config, extend: F) -> Result<Self>
    where
        F: FnOnce(ThingDeployer) -> ThingDeployer,
    {
        let bus = MessageBus::new();
        let deployer = ThingDeployer::new(bus.clone()).with_factory(
            GATEKEEPER_IMPLEMENTATION,
            GateKeeperThing::factory(Arc::new(config.gatekeeper)),
        );
        let deployer = extend(deployer);
        tracing::debug!(implementations = ?deployer.implementations(), "deployer ready");

        let manager = Arc::new(ThingManager::new(
            bus,
            Arc::new(deployer),
            config.dispatch_timeout,
        ));

        let gatekeeper =
            ThingConfiguration::new(GATEKEEPER_THING, GATEKEEPER_IMPLEMENTATION, Value::Null);
        manager.insert_thing(&gatekeeper).await?;

        for thing in &config.things {
            if let Err(e) = manager.insert_thing(thing).await {
                tracing::error!(
                    thing = %thing.name,
                    error = %e,
                    "failed to insert configured thing"
                );
                manager.shutdown().await;
                return Err(e);
            }
        }

        tracing::info!(things = config.things.len() + 1, "gateway started");
        Ok(Self {
            manager,
            server: config.server,
        })
    }

    /// The thing manager behind this gateway
    #[must_use]
    pub fn manager(&self) -> Arc<ThingManager> {
        Arc::clone(&self.manager)
    }

    fn api(&self) -> ApiServer {
        ApiServer::new(self.manager(), self.server.port)
            .rate_limit(self.server.rate_limit_per_minute)
    }

    /// HTTP router for this gateway
    #[must_use]
    pub fn router(&self) -> Router {
        self.api().router()
    }

    /// Serve HTTP until interrupted, then undeploy every thing
    ///
    /// # Errors
    ///
    /// Returns error if the API server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let served = self
            .api()
            .run(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown signal received");
                }
            })
            .await;

        self.manager.shutdown().await;
        tracing::info!("gateway stopped");
        served
    }
}

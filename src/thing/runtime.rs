//! Hosting of a single thing
//!
//! A deployed thing runs in its own task. Messages from its mailbox are
//! handled one at a time, so handlers never run concurrently against the
//! thing's state. The runtime answers description reads and writes and
//! keeps per-interaction extra data; everything else goes to the handlers
//! the thing registered.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::address::{Address, Operation};
use super::description::{ThingDescription, Verb};
use super::envelope::{ThingRequest, ThingResponse};
use super::handler::HandlerRegistry;
use crate::bus::{BusMessage, MessageBus};
use crate::{Error, Result};

/// Mailbox depth per thing
const MAILBOX_CAPACITY: usize = 64;

/// Settings passed to a thing when it is inserted
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ThingConfiguration {
    /// Unique thing name, first segment of every address
    pub name: String,

    /// Factory key resolving the implementation
    pub implementation: String,

    /// Implementation-specific settings
    #[serde(default)]
    pub config: Value,
}

impl ThingConfiguration {
    #[must_use]
    pub fn new(name: impl Into<String>, implementation: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            implementation: implementation.into(),
            config,
        }
    }
}

/// A deployable component
#[async_trait]
pub trait Thing: Send + Sync {
    /// Load the description this thing serves
    ///
    /// # Errors
    ///
    /// Returns `DescriptionLoad` if the bundled description is unusable
    fn description(&self) -> Result<ThingDescription>;

    /// Register one handler per implemented interaction
    ///
    /// # Errors
    ///
    /// Returns `UnknownInteraction` if a handler targets an undeclared interaction
    fn register_handlers(&self, registry: &mut HandlerRegistry) -> Result<()>;

    /// Called after handlers are registered, before the thing is reachable
    ///
    /// # Errors
    ///
    /// Returns error if the thing cannot start
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once the mailbox has closed
    ///
    /// # Errors
    ///
    /// Returns error if shutdown fails
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A started thing bound on the bus
#[derive(Debug)]
pub struct RunningThing {
    pub name: String,
    pub addresses: Vec<Address>,
    pub task: JoinHandle<()>,
}

/// Start a thing and bind its addresses
///
/// Nothing is bound unless every startup step succeeds.
///
/// # Errors
///
/// Returns `DescriptionLoad` or `UnknownInteraction` if the thing is
/// misdeclared, or whatever `Thing::start` fails with
pub async fn launch(
    name: &str,
    mut thing: Box<dyn Thing>,
    bus: &MessageBus,
) -> Result<RunningThing> {
    let description = thing.description()?;
    let mut handlers = HandlerRegistry::new(description.clone());
    thing.register_handlers(&mut handlers)?;
    thing.start().await?;

    let addresses = addresses_for(name, &handlers);
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);

    let mut bound = Vec::with_capacity(addresses.len());
    for address in &addresses {
        if let Err(e) = bus.bind(address.clone(), tx.clone()).await {
            bus.unbind(&bound).await;
            if let Err(stop_err) = thing.stop().await {
                tracing::warn!(thing = %name, error = %stop_err, "stop after failed bind");
            }
            return Err(e);
        }
        bound.push(address.clone());
    }
    drop(tx);

    let runtime = ThingRuntime {
        name: name.to_string(),
        description,
        handlers,
        extra_data: HashMap::new(),
    };
    let task = tokio::spawn(runtime.run(rx, thing));

    tracing::info!(thing = %name, addresses = addresses.len(), "thing started");
    Ok(RunningThing {
        name: name.to_string(),
        addresses,
        task,
    })
}

/// Every address a thing answers
fn addresses_for(name: &str, handlers: &HandlerRegistry) -> Vec<Address> {
    let mut addresses = vec![
        Address::thing(name, Operation::ReadDescription),
        Address::thing(name, Operation::WriteDescription),
    ];
    if handlers.handles_authorization() {
        addresses.push(Address::thing(name, Operation::AuthorizationQuery));
    }
    for (interaction, verb) in handlers.registered() {
        addresses.push(Address::interaction(name, interaction, Operation::for_verb(verb)));
    }
    for interaction in &handlers.description().interactions {
        for op in [
            Operation::GetExtraData,
            Operation::PutExtraData,
            Operation::DeleteExtraData,
        ] {
            addresses.push(Address::interaction(name, &interaction.name, op));
        }
    }
    addresses
}

struct ThingRuntime {
    name: String,
    description: ThingDescription,
    handlers: HandlerRegistry,
    extra_data: HashMap<String, Value>,
}

impl ThingRuntime {
    async fn run(mut self, mut mailbox: mpsc::Receiver<BusMessage>, mut thing: Box<dyn Thing>) {
        while let Some(message) = mailbox.recv().await {
            let response = self.handle(&message.address, message.request).await;
            if message.reply.send(response).is_err() {
                tracing::debug!(
                    thing = %self.name,
                    address = %message.address,
                    "caller gone, reply discarded"
                );
            }
        }

        if let Err(e) = thing.stop().await {
            tracing::warn!(thing = %self.name, error = %e, "thing stop failed");
        }
        tracing::info!(thing = %self.name, "thing stopped");
    }

    async fn handle(&mut self, address: &Address, request: ThingRequest) -> ThingResponse {
        let interaction = address.interaction_name();
        let result = match address.operation() {
            Operation::ReadDescription => Ok(ThingResponse::ok(self.description.to_value())),
            Operation::WriteDescription => self.write_description(&request),
            Operation::GetInteraction => {
                self.handlers.dispatch(interaction, Verb::Get, request).await
            }
            Operation::PostInteraction => {
                self.handlers.dispatch(interaction, Verb::Post, request).await
            }
            Operation::PutInteraction => {
                self.handlers.dispatch(interaction, Verb::Put, request).await
            }
            Operation::GetExtraData => Ok(self.get_extra_data(interaction)),
            Operation::PutExtraData => Ok(self.put_extra_data(interaction, &request)),
            Operation::DeleteExtraData => Ok(self.delete_extra_data(interaction)),
            Operation::AuthorizationQuery => self.handlers.dispatch_authorization(request).await,
        };

        result.unwrap_or_else(|e| ThingResponse::from_error(&e))
    }

    fn write_description(&mut self, request: &ThingRequest) -> Result<ThingResponse> {
        let description = ThingDescription::from_value(request.body().clone())
            .map_err(|e| Error::Validation(e.to_string()))?;
        self.description.check_replacement(&description)?;
        tracing::info!(thing = %self.name, "description replaced");
        self.description = description;
        Ok(ThingResponse::no_content())
    }

    fn get_extra_data(&self, interaction: &str) -> ThingResponse {
        self.extra_data.get(interaction).map_or_else(
            || ThingResponse::error(StatusCode::NOT_FOUND),
            |data| ThingResponse::ok(data.clone()),
        )
    }

    fn put_extra_data(&mut self, interaction: &str, request: &ThingRequest) -> ThingResponse {
        if request.body().is_null() {
            return ThingResponse::error(StatusCode::BAD_REQUEST);
        }
        self.extra_data
            .insert(interaction.to_string(), request.body().clone());
        ThingResponse::no_content()
    }

    fn delete_extra_data(&mut self, interaction: &str) -> ThingResponse {
        if self.extra_data.remove(interaction).is_some() {
            ThingResponse::no_content()
        } else {
            ThingResponse::error(StatusCode::NOT_FOUND)
        }
    }
}

//! Per-thing table of interaction handlers
//!
//! Registration is checked against the thing description, so a thing that
//! wires a handler to an interaction it never declared fails to start.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::http::StatusCode;
use futures::FutureExt;
use futures::future::BoxFuture;

use super::description::{ThingDescription, Verb};
use super::envelope::{ThingRequest, ThingResponse};
use crate::{Error, Result};

/// Callback answering one request
pub type Handler = Arc<dyn Fn(ThingRequest) -> BoxFuture<'static, ThingResponse> + Send + Sync>;

fn boxed<F, Fut>(callback: F) -> Handler
where
    F: Fn(ThingRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ThingResponse> + Send + 'static,
{
    Arc::new(move |request| callback(request).boxed())
}

/// Handlers registered by a single thing
pub struct HandlerRegistry {
    description: ThingDescription,
    handlers: HashMap<(String, Verb), Handler>,
    authorization: Option<Handler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("thing", &self.description.name)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("authorization", &self.authorization.is_some())
            .finish()
    }
}

impl HandlerRegistry {
    /// Create an empty registry validated against `description`
    #[must_use]
    pub fn new(description: ThingDescription) -> Self {
        Self {
            description,
            handlers: HashMap::new(),
            authorization: None,
        }
    }

    /// Register the callback for an interaction and verb
    ///
    /// # Errors
    ///
    /// Returns `UnknownInteraction` if the description does not declare the
    /// interaction or the interaction does not accept the verb
    pub fn register_handler<F, Fut>(
        &mut self,
        interaction: &str,
        verb: Verb,
        callback: F,
    ) -> Result<()>
    where
        F: Fn(ThingRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ThingResponse> + Send + 'static,
    {
        let declared = self
            .description
            .lookup(interaction)
            .is_some_and(|i| i.accepts(verb));
        if !declared {
            return Err(Error::UnknownInteraction {
                interaction: interaction.to_string(),
                verb: verb.to_string(),
            });
        }

        tracing::debug!(thing = %self.description.name, interaction, %verb, "registered handler");
        self.handlers
            .insert((interaction.to_string(), verb), boxed(callback));
        Ok(())
    }

    /// Register the internal token resolution callback
    ///
    /// Not part of the description; only the gatekeeper answers these.
    pub fn register_authorization_handler<F, Fut>(&mut self, callback: F)
    where
        F: Fn(ThingRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ThingResponse> + Send + 'static,
    {
        self.authorization = Some(boxed(callback));
    }

    /// Interactions that have a handler, with their verbs
    pub fn registered(&self) -> impl Iterator<Item = (&str, Verb)> {
        self.handlers.keys().map(|(name, verb)| (name.as_str(), *verb))
    }

    #[must_use]
    pub const fn handles_authorization(&self) -> bool {
        self.authorization.is_some()
    }

    #[must_use]
    pub const fn description(&self) -> &ThingDescription {
        &self.description
    }

    /// Invoke the handler registered for an interaction and verb
    ///
    /// # Errors
    ///
    /// Returns `NoHandler` if nothing was registered
    pub async fn dispatch(
        &self,
        interaction: &str,
        verb: Verb,
        request: ThingRequest,
    ) -> Result<ThingResponse> {
        let handler = self
            .handlers
            .get(&(interaction.to_string(), verb))
            .ok_or_else(|| Error::NoHandler(format!("{verb} {interaction}")))?;
        Ok(invoke(handler, request).await)
    }

    /// Invoke the authorization callback
    ///
    /// # Errors
    ///
    /// Returns `NoHandler` if this thing does not resolve tokens
    pub async fn dispatch_authorization(&self, request: ThingRequest) -> Result<ThingResponse> {
        let handler = self
            .authorization
            .as_ref()
            .ok_or_else(|| Error::NoHandler("authorization query".to_string()))?;
        Ok(invoke(handler, request).await)
    }
}

/// Run a handler, turning a panic into an empty 500
async fn invoke(handler: &Handler, request: ThingRequest) -> ThingResponse {
    let handler = Arc::clone(handler);
    match AssertUnwindSafe(async move { handler(request).await })
        .catch_unwind()
        .await
    {
        Ok(response) => response,
        Err(_) => {
            tracing::error!("interaction handler panicked");
            ThingResponse::error(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

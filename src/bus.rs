//! In-process message bus
//!
//! Things bind their mailbox to the addresses they answer. A request is a
//! single message carrying a oneshot reply channel; the caller waits for the
//! reply up to a deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, oneshot};

use crate::thing::{Address, ThingRequest, ThingResponse};
use crate::{Error, Result};

/// A request delivered to a thing's mailbox
#[derive(Debug)]
pub struct BusMessage {
    pub address: Address,
    pub request: ThingRequest,
    pub reply: oneshot::Sender<ThingResponse>,
}

/// Sending half of a thing's mailbox
pub type Mailbox = mpsc::Sender<BusMessage>;

/// Address-keyed routing table shared by the manager and the deployer
#[derive(Clone, Default)]
pub struct MessageBus {
    consumers: Arc<RwLock<HashMap<Address, Mailbox>>>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus").finish_non_exhaustive()
    }
}

impl MessageBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a mailbox to an address
    ///
    /// # Errors
    ///
    /// Returns `Deployment` if something is already bound there
    pub async fn bind(&self, address: Address, mailbox: Mailbox) -> Result<()> {
        let mut consumers = self.consumers.write().await;
        if consumers.contains_key(&address) {
            return Err(Error::Deployment(format!("address already bound: {address}")));
        }
        tracing::trace!(%address, "bound consumer");
        consumers.insert(address, mailbox);
        Ok(())
    }

    /// Remove the bindings for the given addresses
    pub async fn unbind(&self, addresses: &[Address]) {
        let mut consumers = self.consumers.write().await;
        for address in addresses {
            consumers.remove(address);
        }
        tracing::trace!(count = addresses.len(), "unbound consumers");
    }

    /// Whether anything answers at `address`
    pub async fn is_bound(&self, address: &Address) -> bool {
        self.consumers.read().await.contains_key(address)
    }

    /// Send a request and wait for its reply
    ///
    /// # Errors
    ///
    /// Returns `NoHandler` if nothing is bound at `address`,
    /// `DispatchTimeout` if no reply arrives within `timeout`, and `Internal`
    /// if the thing dropped the request without replying
    pub async fn request(
        &self,
        address: &Address,
        request: ThingRequest,
        timeout: Duration,
    ) -> Result<ThingResponse> {
        let mailbox = self
            .consumers
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| Error::NoHandler(address.to_string()))?;

        let (tx, rx) = oneshot::channel();
        let message = BusMessage {
            address: address.clone(),
            request,
            reply: tx,
        };

        let exchange = async {
            mailbox
                .send(message)
                .await
                .map_err(|_| Error::NoHandler(address.to_string()))?;
            rx.await
                .map_err(|_| Error::Internal(format!("no reply from {address}")))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%address, timeout_ms = timeout.as_millis(), "request timed out");
                Err(Error::DispatchTimeout(address.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::thing::Operation;

    fn echo_mailbox() -> Mailbox {
        let (tx, mut rx) = mpsc::channel::<BusMessage>(8);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let body = json!({
                    "address": msg.address.to_string(),
                    "echo": msg.request.body().clone(),
                });
                let _ = msg.reply.send(ThingResponse::ok(body));
            }
        });
        tx
    }

    #[tokio::test]
    async fn request_reply_round_trip() {
        let bus = MessageBus::new();
        let address = Address::interaction("mount", "park", Operation::PostInteraction);
        bus.bind(address.clone(), echo_mailbox()).await.unwrap();

        let response = bus
            .request(
                &address,
                ThingRequest::with_body(json!({"slot": 1})),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(response.body["echo"]["slot"], 1);
        assert_eq!(
            response.body["address"],
            "mount/interactions/park/post-interaction"
        );
    }

    #[tokio::test]
    async fn unbound_address_has_no_handler() {
        let bus = MessageBus::new();
        let address = Address::thing("dome", Operation::ReadDescription);
        let err = bus
            .request(&address, ThingRequest::default(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoHandler(_)));
    }

    #[tokio::test]
    async fn duplicate_binding_rejected() {
        let bus = MessageBus::new();
        let address = Address::thing("dome", Operation::ReadDescription);
        bus.bind(address.clone(), echo_mailbox()).await.unwrap();
        assert!(bus.bind(address.clone(), echo_mailbox()).await.is_err());

        bus.unbind(&[address.clone()]).await;
        assert!(!bus.is_bound(&address).await);
        bus.bind(address, echo_mailbox()).await.unwrap();
    }

    #[tokio::test]
    async fn silent_consumer_times_out() {
        let bus = MessageBus::new();
        let address = Address::thing("camera", Operation::ReadDescription);
        let (tx, mut rx) = mpsc::channel::<BusMessage>(8);
        // Hold every message without replying
        let held = tokio::spawn(async move {
            let mut kept = Vec::new();
            while let Some(msg) = rx.recv().await {
                kept.push(msg);
            }
            kept.len()
        });
        bus.bind(address.clone(), tx).await.unwrap();

        let err = bus
            .request(&address, ThingRequest::default(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DispatchTimeout(_)));

        bus.unbind(&[address]).await;
        assert_eq!(held.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dropped_reply_is_internal_error() {
        let bus = MessageBus::new();
        let address = Address::thing("weatherstation", Operation::ReadDescription);
        let (tx, mut rx) = mpsc::channel::<BusMessage>(8);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                drop(msg);
            }
        });
        bus.bind(address.clone(), tx).await.unwrap();

        let err = bus
            .request(&address, ThingRequest::default(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}

//! Shared test utilities

#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use base64::Engine;
use serde_json::{Value, json};
use tower::ServiceExt;
use wotgate::config::{Config, GatekeeperConfig, ServerConfig};
use wotgate::thing::{
    HandlerRegistry, Thing, ThingConfiguration, ThingDescription, ThingDeployer, ThingRequest,
    ThingResponse, Verb,
};
use wotgate::{Gateway, Result};

pub const ADMIN: &str = "administrator";
pub const ADMIN_PASSWORD: &str = "first-light";

/// Gateway settings with an in-memory gatekeeper
#[must_use]
pub fn test_config() -> Config {
    Config {
        data_dir: std::env::temp_dir(),
        server: ServerConfig {
            port: 0,
            rate_limit_per_minute: None,
        },
        dispatch_timeout: Duration::from_secs(5),
        gatekeeper: GatekeeperConfig::in_memory(ADMIN_PASSWORD),
        things: vec![ThingConfiguration::new("dome", "dome", json!({}))],
    }
}

/// Observatory dome used as an ordinary thing behind the gateway
struct Dome;

#[async_trait]
impl Thing for Dome {
    fn description(&self) -> Result<ThingDescription> {
        ThingDescription::from_json(
            r#"{"name": "dome", "interactions": [
                {"name": "azimuth", "kind": "property", "verbs": ["get"]},
                {"name": "shutter", "kind": "action", "verbs": ["post"], "security": "bearer"}
            ]}"#,
        )
    }

    fn register_handlers(&self, registry: &mut HandlerRegistry) -> Result<()> {
        registry.register_handler("azimuth", Verb::Get, |_| async {
            ThingResponse::ok(json!({"degrees": 182}))
        })?;
        registry.register_handler("shutter", Verb::Post, |req: ThingRequest| async move {
            let operator = req.authorization().map(|a| a.username.clone());
            ThingResponse::ok(json!({"open": true, "operator": operator}))
        })
    }
}

/// Start a gateway with the gatekeeper and a dome
pub async fn gateway() -> Gateway {
    Gateway::with_deployer(test_config(), |deployer: ThingDeployer| {
        deployer.with_factory("dome", |_| Ok(Box::new(Dome) as Box<dyn Thing>))
    })
    .await
    .expect("failed to start test gateway")
}

#[must_use]
pub fn basic(user: &str, password: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
    format!("Basic {encoded}")
}

#[must_use]
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Send one request through the router, returning status and decoded body
pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    authorization: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(authorization) = authorization {
        request = request.header("authorization", authorization);
    }
    let body = match body {
        Some(body) => {
            request = request.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

/// Issue a token through the gateway
pub async fn token(router: &Router, user: &str, password: &str) -> String {
    let (status, body) = send(
        router,
        "POST",
        "/things/gatekeeper/interactions/generateUserToken",
        Some(&basic(user, password)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "token request failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

//! Thing routes
//!
//! Every call is turned into a [`ThingRequest`] carrying the HTTP headers,
//! the query parameters and the decoded JSON body, then routed by the
//! manager.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
};
use serde::Serialize;
use serde_json::Value;

use super::ApiState;
use crate::manager::{ExtraDataVerb, ThingSummary};
use crate::thing::{ThingRequest, ThingResponse, Verb};
use crate::{Error, Result};

/// Listing of registered things
#[derive(Serialize)]
pub struct ThingsResponse {
    pub things: Vec<ThingSummary>,
}

type Params = Query<HashMap<String, String>>;

/// Build the envelope for a call
///
/// An empty body becomes JSON `null`; anything else must parse as JSON.
fn envelope(
    headers: &HeaderMap,
    params: HashMap<String, String>,
    body: &Bytes,
) -> Result<ThingRequest> {
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body)
            .map_err(|e| Error::Validation(format!("request body is not JSON: {e}")))?
    };

    let headers = headers.iter().filter_map(|(name, value)| {
        value
            .to_str()
            .ok()
            .map(|v| (name.as_str().to_string(), v.to_string()))
    });

    Ok(ThingRequest::new(headers, params, body))
}

async fn list_things(State(state): State<Arc<ApiState>>) -> Json<ThingsResponse> {
    Json(ThingsResponse {
        things: state.manager.things().await,
    })
}

async fn get_description(
    State(state): State<Arc<ApiState>>,
    Path(thing): Path<String>,
    headers: HeaderMap,
    Query(params): Params,
    body: Bytes,
) -> Result<ThingResponse> {
    let request = envelope(&headers, params, &body)?;
    state.manager.get_thing_description(&thing, request).await
}

async fn put_description(
    State(state): State<Arc<ApiState>>,
    Path(thing): Path<String>,
    headers: HeaderMap,
    Query(params): Params,
    body: Bytes,
) -> Result<ThingResponse> {
    let request = envelope(&headers, params, &body)?;
    state.manager.put_thing_description(&thing, request).await
}

async fn interaction(
    state: &ApiState,
    (thing, interaction): (String, String),
    verb: Verb,
    headers: &HeaderMap,
    params: HashMap<String, String>,
    body: &Bytes,
) -> Result<ThingResponse> {
    let request = envelope(headers, params, body)?;
    state
        .manager
        .route_interaction(&thing, &interaction, verb, request)
        .await
}

async fn get_interaction(
    State(state): State<Arc<ApiState>>,
    Path(target): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Params,
    body: Bytes,
) -> Result<ThingResponse> {
    interaction(&state, target, Verb::Get, &headers, params, &body).await
}

async fn post_interaction(
    State(state): State<Arc<ApiState>>,
    Path(target): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Params,
    body: Bytes,
) -> Result<ThingResponse> {
    interaction(&state, target, Verb::Post, &headers, params, &body).await
}

async fn put_interaction(
    State(state): State<Arc<ApiState>>,
    Path(target): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Params,
    body: Bytes,
) -> Result<ThingResponse> {
    interaction(&state, target, Verb::Put, &headers, params, &body).await
}

async fn extra_data(
    state: &ApiState,
    (thing, interaction): (String, String),
    verb: ExtraDataVerb,
    headers: &HeaderMap,
    params: HashMap<String, String>,
    body: &Bytes,
) -> Result<ThingResponse> {
    let request = envelope(headers, params, body)?;
    state
        .manager
        .route_extra_data(&thing, &interaction, verb, request)
        .await
}

async fn get_data(
    State(state): State<Arc<ApiState>>,
    Path(target): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Params,
    body: Bytes,
) -> Result<ThingResponse> {
    extra_data(&state, target, ExtraDataVerb::Get, &headers, params, &body).await
}

async fn put_data(
    State(state): State<Arc<ApiState>>,
    Path(target): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Params,
    body: Bytes,
) -> Result<ThingResponse> {
    extra_data(&state, target, ExtraDataVerb::Put, &headers, params, &body).await
}

async fn delete_data(
    State(state): State<Arc<ApiState>>,
    Path(target): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Params,
    body: Bytes,
) -> Result<ThingResponse> {
    extra_data(&state, target, ExtraDataVerb::Delete, &headers, params, &body).await
}

/// Build the thing router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/things", get(list_things))
        .route("/things/{thing}", get(get_description).put(put_description))
        .route(
            "/things/{thing}/interactions/{interaction}",
            get(get_interaction)
                .post(post_interaction)
                .put(put_interaction),
        )
        .route(
            "/things/{thing}/interactions/{interaction}/data",
            get(get_data).put(put_data).delete(delete_data),
        )
        .with_state(state)
}

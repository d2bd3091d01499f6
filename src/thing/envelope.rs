//! Request and response envelopes exchanged over the bus

use std::collections::BTreeMap;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// Content type header name, lowercase as stored in envelopes
pub const HEADER_CONTENT_TYPE: &str = "content-type";

/// Authorization header name, lowercase as stored in envelopes
pub const HEADER_AUTHORIZATION: &str = "authorization";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// A role granted to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub name: String,
    pub level: i64,
}

/// Identity attached to a request once its token has been resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionAuthorization {
    pub username: String,
    pub roles: Vec<RoleGrant>,
}

impl InteractionAuthorization {
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.name == role)
    }

    /// Highest role level held, 0 when the caller has no roles
    #[must_use]
    pub fn max_level(&self) -> i64 {
        self.roles.iter().map(|r| r.level).max().unwrap_or(0)
    }
}

/// Inbound call as seen by a thing
///
/// Built once at the boundary. Handlers only get read access; the
/// authorization context is attached by dispatch, never by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThingRequest {
    headers: BTreeMap<String, String>,
    parameters: BTreeMap<String, String>,
    body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization: Option<InteractionAuthorization>,
}

impl ThingRequest {
    /// Create a request; header names are normalized to lowercase
    #[must_use]
    pub fn new<H, P>(headers: H, parameters: P, body: Value) -> Self
    where
        H: IntoIterator<Item = (String, String)>,
        P: IntoIterator<Item = (String, String)>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
            parameters: parameters.into_iter().collect(),
            body,
            authorization: None,
        }
    }

    /// Request carrying only a body
    #[must_use]
    pub fn with_body(body: Value) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    #[must_use]
    pub(crate) fn authorized(mut self, authorization: InteractionAuthorization) -> Self {
        self.authorization = Some(authorization);
        self
    }

    /// Header value by case-insensitive name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Query or path parameter
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }

    /// String field of a JSON object body
    #[must_use]
    pub fn body_str(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }

    /// Caller identity, present only on protected interactions
    #[must_use]
    pub const fn authorization(&self) -> Option<&InteractionAuthorization> {
        self.authorization.as_ref()
    }

    /// Token from an `Authorization: Bearer` header
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.header(HEADER_AUTHORIZATION)
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Reply produced by a thing for exactly one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

impl ThingResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: Value) -> Self {
        let mut headers = BTreeMap::new();
        if !body.is_null() {
            headers.insert(HEADER_CONTENT_TYPE.to_string(), CONTENT_TYPE_JSON.to_string());
        }
        Self {
            status: status.as_u16(),
            headers,
            body,
        }
    }

    /// 200 with a JSON body
    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// 201 with no body
    #[must_use]
    pub fn created() -> Self {
        Self::new(StatusCode::CREATED, Value::Null)
    }

    /// 204
    #[must_use]
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, Value::Null)
    }

    /// Error status with an empty text body
    #[must_use]
    pub fn error(status: StatusCode) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(HEADER_CONTENT_TYPE.to_string(), CONTENT_TYPE_TEXT.to_string());
        Self {
            status: status.as_u16(),
            headers,
            body: Value::Null,
        }
    }

    /// Error response for a failed handler, without leaking details
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        let status = error.status();
        if status.is_server_error() {
            tracing::error!(error = %error, "interaction failed");
        } else {
            tracing::debug!(error = %error, "interaction rejected");
        }
        Self::error(status)
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code().is_success()
    }

    /// Header value by case-insensitive name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(headers: &[(&str, &str)]) -> ThingRequest {
        ThingRequest::new(
            headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
            [("page".to_string(), "2".to_string())],
            json!({"name": "operator"}),
        )
    }

    #[test]
    fn headers_are_case_insensitive() {
        let req = request(&[("Authorization", "Bearer abc123")]);
        assert_eq!(req.header("authorization"), Some("Bearer abc123"));
        assert_eq!(req.header("AUTHORIZATION"), Some("Bearer abc123"));
        assert_eq!(req.bearer_token(), Some("abc123"));
    }

    #[test]
    fn bearer_token_requires_scheme() {
        assert_eq!(request(&[("authorization", "Basic abc")]).bearer_token(), None);
        assert_eq!(request(&[("authorization", "Bearer ")]).bearer_token(), None);
        assert_eq!(request(&[]).bearer_token(), None);
    }

    #[test]
    fn parameters_and_body() {
        let req = request(&[]);
        assert_eq!(req.parameter("page"), Some("2"));
        assert_eq!(req.parameter("perPage"), None);
        assert_eq!(req.body_str("name"), Some("operator"));
        assert!(req.authorization().is_none());
    }

    #[test]
    fn authorization_helpers() {
        let auth = InteractionAuthorization {
            username: "administrator".into(),
            roles: vec![
                RoleGrant { name: "administrator".into(), level: 1000 },
                RoleGrant { name: "authenticated".into(), level: 1 },
            ],
        };
        assert!(auth.has_role("administrator"));
        assert!(!auth.has_role("operator"));
        assert_eq!(auth.max_level(), 1000);

        let req = request(&[]).authorized(auth.clone());
        assert_eq!(req.authorization(), Some(&auth));
    }

    #[test]
    fn error_responses_carry_no_body() {
        let response = ThingResponse::from_error(&Error::Internal("db exploded".into()));
        assert_eq!(response.status, 500);
        assert!(response.body.is_null());
        assert_eq!(response.header("Content-Type"), Some(CONTENT_TYPE_TEXT));
    }

    #[test]
    fn ok_sets_json_content_type() {
        let response = ThingResponse::ok(json!({"a": 1}));
        assert!(response.is_success());
        assert_eq!(response.header(HEADER_CONTENT_TYPE), Some(CONTENT_TYPE_JSON));
        assert!(ThingResponse::no_content().headers.is_empty());
    }
}

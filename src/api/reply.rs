//! Translation of thing replies and gateway errors into HTTP responses

use axum::Json;
use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

use crate::Error;
use crate::thing::ThingResponse;
use crate::thing::envelope::CONTENT_TYPE_TEXT;

impl IntoResponse for ThingResponse {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let is_text = self
            .header(header::CONTENT_TYPE.as_str())
            .is_some_and(|v| v.starts_with(CONTENT_TYPE_TEXT));

        let body = match self.body {
            Value::Null => Body::empty(),
            Value::String(text) if is_text => Body::from(text),
            other => match serde_json::to_vec(&other) {
                Ok(bytes) => Body::from(bytes),
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode thing reply");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            },
        };

        let mut response = Response::builder().status(status);
        if let Some(headers) = response.headers_mut() {
            for (name, value) in &self.headers {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        headers.insert(name, value);
                    }
                    _ => tracing::debug!(header = %name, "dropping invalid reply header"),
                }
            }
        }

        response
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            status
                .canonical_reason()
                .unwrap_or("internal error")
                .to_lowercase()
        } else {
            tracing::debug!(error = %self, "request rejected");
            self.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody {
                    code: self.code(),
                    message,
                },
            }),
        )
            .into_response()
    }
}

//! Error types for the WoT gateway

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A thing description is missing or malformed
    #[error("description load error: {0}")]
    DescriptionLoad(String),

    /// A handler was registered for an interaction the description does not declare
    #[error("unknown interaction '{interaction}' for verb {verb}")]
    UnknownInteraction { interaction: String, verb: String },

    /// Nothing is listening at the destination
    #[error("no handler for {0}")]
    NoHandler(String),

    /// The addressed thing is not registered
    #[error("thing not found: {0}")]
    ComponentNotFound(String),

    /// The thing exists but does not declare the interaction
    #[error("interaction '{interaction}' not found on thing '{thing}'")]
    InteractionNotFound { thing: String, interaction: String },

    /// The interaction does not accept the verb
    #[error("interaction '{interaction}' does not accept {verb}")]
    MethodNotAllowed { interaction: String, verb: String },

    /// Username/password pair did not match a stored user
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Token unknown, revoked, or absent from the request
    #[error("token not found")]
    TokenNotFound,

    /// Token is past its expiration
    #[error("token expired")]
    TokenExpired,

    /// Caller is authenticated but lacks the required role
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A routed call was not answered in time
    #[error("dispatch timed out: {0}")]
    DispatchTimeout(String),

    /// Missing or malformed request fields
    #[error("validation error: {0}")]
    Validation(String),

    /// Request conflicts with existing state
    #[error("conflict: {0}")]
    Conflict(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Deploying or undeploying a thing failed
    #[error("deployment error: {0}")]
    Deployment(String),

    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Status code returned to the caller at the dispatch boundary
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::ComponentNotFound(_) | Self::InteractionNotFound { .. } | Self::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::TokenNotFound | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NoHandler(_) => StatusCode::NOT_IMPLEMENTED,
            Self::DispatchTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::DescriptionLoad(_) => "description_load_error",
            Self::UnknownInteraction { .. } => "unknown_interaction",
            Self::NoHandler(_) => "no_handler",
            Self::ComponentNotFound(_) => "thing_not_found",
            Self::InteractionNotFound { .. } => "interaction_not_found",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::InvalidCredentials => "invalid_credentials",
            Self::TokenNotFound => "token_not_found",
            Self::TokenExpired => "token_expired",
            Self::Forbidden(_) => "forbidden",
            Self::DispatchTimeout(_) => "dispatch_timeout",
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Deployment(_) => "deployment_error",
            Self::Internal(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Toml(_)
            | Self::Database(_)
            | Self::Sqlite(_) => "internal_error",
        }
    }
}

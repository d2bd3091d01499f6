//! wotgate - Web of Things gateway
//!
//! Things are components deployed at runtime from registered factories.
//! Each one serves a description of its interactions and answers calls
//! routed to it over an in-process bus. The gateway exposes every thing
//! behind a uniform REST surface and authorizes protected interactions
//! through the built-in gatekeeper thing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 HTTP API (axum)                     │
//! │   /things  │  /interactions  │  /data  │  /health   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Thing Manager                       │
//! │   Registry  │  Routing  │  Token resolution         │
//! └────────────────────┬────────────────────────────────┘
//!                      │ message bus
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Things                           │
//! │   Gatekeeper  │  user-provided implementations      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod bus;
pub mod config;
pub mod db;
pub mod error;
pub mod gatekeeper;
pub mod gateway;
pub mod manager;
pub mod thing;

pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use gateway::Gateway;
pub use manager::ThingManager;

//! Tabula API - Permission Gate, Dispatcher and HTTP Front Door
//!
//! Decodes read and write requests, checks them against the key→role
//! table, runs them against a [`tabula_storage::Catalog`] and wraps every
//! outcome in the same response envelope.

pub mod auth;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod routes;
pub mod telemetry;

pub use auth::{parse_api_keys, parse_roles, AuthConfig};
pub use config::ServerConfig;
pub use dispatch::{parse_flag, Action, Dispatcher, Envelope, ReadRequest, WriteRequest};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_router;

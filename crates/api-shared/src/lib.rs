//! # API Shared
//!
//! Shared definitions for the blood bank APIs.
//!
//! Contains:
//! - JSON request/response bodies with OpenAPI schemas (`dto` module)
//! - `HealthService`
//! - Login sessions and bearer-token authorisation (`auth` module)
//!
//! Used by `api-rest` and the CLI.

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{AuthContext, AuthError, IssuedSession, SessionStore};
pub use health::HealthService;

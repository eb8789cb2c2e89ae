// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Relaybase API Library
//!
//! Membership admission control, the OAuth2 code-exchange bridge with its
//! realtime broker, authentication and the HTTP routes around the billing
//! reconciler.

pub mod auth;
pub mod config;
pub mod error;
pub mod membership;
pub mod oauth2;
pub mod routes;
pub mod state;
pub mod users;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

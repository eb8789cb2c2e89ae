//! Authentication module for Relaybase

pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, JwtManager};
pub use middleware::{
    require_admin, require_auth, require_login, require_paid, AuthError, AuthMethod, AuthState,
    AuthUser, AUTH_COOKIE,
};

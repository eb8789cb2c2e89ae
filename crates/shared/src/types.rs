//! Record types shared by every crate in the workspace

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Seat limit applied to relays without a paid subscription
pub const FREE_TIER_USER_LIMIT: i64 = 3;

/// A billable group/workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Relay {
    pub id: String,
    pub name: String,
    /// Maximum membership count (seat limit)
    pub user_limit: i64,
    /// User id of the identity that created the relay
    pub creator: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    /// Avatar URL copied from the OAuth2 provider profile
    #[serde(default)]
    pub picture: String,
    /// Entitlement flag, only ever set by billing reconciliation
    pub paid: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
}

/// Local mirror of a payment-provider subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: String,
    pub active: bool,
    pub relay: String,
    #[sqlx(rename = "user_id")]
    pub user: String,
    pub stripe_customer: String,
    pub stripe_subscription: String,
    pub stripe_quantity: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub stripe_cancel_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
}

/// Fixed set of roles a user can hold on a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleName {
    Owner,
    Admin,
    Member,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl RoleName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Owner => "Owner",
            RoleName::Admin => "Admin",
            RoleName::Member => "Member",
        }
    }

    /// Roles allowed to manage a relay's membership
    pub fn can_manage(&self) -> bool {
        matches!(self, RoleName::Owner | RoleName::Admin)
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for RoleName {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "Owner" => Ok(RoleName::Owner),
            "Admin" => Ok(RoleName::Admin),
            "Member" => Ok(RoleName::Member),
            _ => Err(UnknownRole(value)),
        }
    }
}

/// Membership binding of a user to a relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RelayRole {
    pub id: String,
    pub relay: String,
    #[sqlx(rename = "user_id")]
    pub user: String,
    #[sqlx(try_from = "String")]
    pub role: RoleName,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RelayInvitation {
    pub id: String,
    pub relay: String,
    #[sqlx(try_from = "String")]
    pub role: RoleName,
    pub key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
}

/// Durable fallback for an OAuth2 handshake whose client was not connected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CodeExchange {
    pub id: String,
    pub state: String,
    pub code: String,
    pub otp: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

/// Filter for role lookups; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFilter {
    pub relay: Option<String>,
    pub user: Option<String>,
    pub role: Option<RoleName>,
}

impl RoleFilter {
    pub fn relay(relay: impl Into<String>) -> Self {
        Self {
            relay: Some(relay.into()),
            ..Default::default()
        }
    }

    pub fn user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_role(mut self, role: RoleName) -> Self {
        self.role = Some(role);
        self
    }

    pub fn matches(&self, role: &RelayRole) -> bool {
        self.relay.as_deref().map_or(true, |r| r == role.relay)
            && self.user.as_deref().map_or(true, |u| u == role.user)
            && self.role.map_or(true, |name| name == role.role)
    }
}

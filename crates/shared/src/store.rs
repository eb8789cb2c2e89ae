//! Record store interface
//!
//! Transactional single-record CRUD plus filtered counts over the typed
//! collections. Cross-record invariants (seat limits, ownership caps, one
//! active subscription per relay) are NOT enforced here; the billing
//! reconciler and the admission controller own them.

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use time::OffsetDateTime;

use crate::types::{
    CodeExchange, Relay, RelayInvitation, RelayRole, RoleFilter, Subscription, User,
};

/// Length of generated record ids
pub const RECORD_ID_LEN: usize = 15;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection} record not found: {key}")]
    NotFound {
        collection: &'static str,
        key: String,
    },
    #[error("{collection} record already exists: {key}")]
    Conflict {
        collection: &'static str,
        key: String,
    },
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn not_found(collection: &'static str, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection,
            key: key.into(),
        }
    }

    pub fn conflict(collection: &'static str, key: impl Into<String>) -> Self {
        StoreError::Conflict {
            collection,
            key: key.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Generate a 15 character lowercase alphanumeric record id
pub fn new_record_id() -> String {
    let mut rng = rand::rng();
    (0..RECORD_ID_LEN)
        .filter_map(|_| ID_ALPHABET.choose(&mut rng).map(|b| *b as char))
        .collect()
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    // Relays
    async fn insert_relay(&self, relay: &Relay) -> StoreResult<()>;
    async fn find_relay(&self, id: &str) -> StoreResult<Relay>;
    async fn list_relays(&self) -> StoreResult<Vec<Relay>>;
    async fn set_relay_user_limit(&self, id: &str, user_limit: i64) -> StoreResult<()>;
    /// Deletes the relay together with its roles and invitations
    async fn delete_relay(&self, id: &str) -> StoreResult<()>;

    // Users
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user(&self, id: &str) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<User>;
    async fn set_user_paid(&self, id: &str, paid: bool) -> StoreResult<()>;
    async fn set_user_profile(&self, id: &str, name: &str, picture: &str) -> StoreResult<()>;

    // Subscriptions
    async fn insert_subscription(&self, subscription: &Subscription) -> StoreResult<()>;
    async fn find_subscription(&self, id: &str) -> StoreResult<Subscription>;
    /// All rows mirroring the given provider subscription, oldest first
    async fn find_subscriptions_by_stripe_id(
        &self,
        stripe_subscription: &str,
    ) -> StoreResult<Vec<Subscription>>;
    async fn list_active_subscriptions(&self) -> StoreResult<Vec<Subscription>>;
    async fn count_active_subscriptions(&self, relay: &str) -> StoreResult<i64>;
    async fn update_subscription(&self, subscription: &Subscription) -> StoreResult<()>;
    async fn delete_subscription(&self, id: &str) -> StoreResult<()>;

    // Relay roles
    async fn insert_role(&self, role: &RelayRole) -> StoreResult<()>;
    async fn count_roles(&self, filter: &RoleFilter) -> StoreResult<i64>;
    async fn list_roles(&self, filter: &RoleFilter) -> StoreResult<Vec<RelayRole>>;

    // Relay invitations
    async fn insert_invitation(&self, invitation: &RelayInvitation) -> StoreResult<()>;
    async fn find_invitation_by_key(&self, key: &str) -> StoreResult<RelayInvitation>;
    async fn list_invitations(&self, relay: &str) -> StoreResult<Vec<RelayInvitation>>;

    // Code exchange
    /// Fails with `Conflict` when a record with the same id exists
    async fn insert_code_exchange(&self, record: &CodeExchange) -> StoreResult<()>;
    async fn find_code_exchange(&self, id: &str) -> StoreResult<CodeExchange>;
    /// Removes records created before `cutoff`, returning how many were removed
    async fn delete_code_exchanges_before(&self, cutoff: OffsetDateTime) -> StoreResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_ids_are_fifteen_lowercase_alphanumerics() {
        for _ in 0..50 {
            let id = new_record_id();
            assert_eq!(id.len(), RECORD_ID_LEN);
            assert!(id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_record_ids_are_not_repeated() {
        assert_ne!(new_record_id(), new_record_id());
    }

    #[test]
    fn test_error_predicates() {
        assert!(StoreError::not_found("relays", "x").is_not_found());
        assert!(StoreError::conflict("code_exchange", "x").is_conflict());
        assert!(!StoreError::Database("boom".into()).is_conflict());
    }
}

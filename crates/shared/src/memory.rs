//! In-memory record store
//!
//! Backs tests and local development. Every call takes the lock once, so each
//! operation is atomic on its own but, like the Postgres store, nothing spans
//! two calls.

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::store::{RecordStore, StoreError, StoreResult};
use crate::types::{
    CodeExchange, Relay, RelayInvitation, RelayRole, RoleFilter, Subscription, User,
};

#[derive(Default)]
struct Collections {
    relays: Vec<Relay>,
    users: Vec<User>,
    subscriptions: Vec<Subscription>,
    roles: Vec<RelayRole>,
    invitations: Vec<RelayInvitation>,
    code_exchanges: Vec<CodeExchange>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscription rows, active or not
    pub async fn subscription_count(&self) -> usize {
        self.inner.read().await.subscriptions.len()
    }

    pub async fn relay_count(&self) -> usize {
        self.inner.read().await.relays.len()
    }

    pub async fn code_exchange_count(&self) -> usize {
        self.inner.read().await.code_exchanges.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_relay(&self, relay: &Relay) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.relays.iter().any(|r| r.id == relay.id) {
            return Err(StoreError::conflict("relays", &relay.id));
        }
        inner.relays.push(relay.clone());
        Ok(())
    }

    async fn find_relay(&self, id: &str) -> StoreResult<Relay> {
        self.inner
            .read()
            .await
            .relays
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("relays", id))
    }

    async fn list_relays(&self) -> StoreResult<Vec<Relay>> {
        Ok(self.inner.read().await.relays.clone())
    }

    async fn set_relay_user_limit(&self, id: &str, user_limit: i64) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let relay = inner
            .relays
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::not_found("relays", id))?;
        relay.user_limit = user_limit;
        relay.updated = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn delete_relay(&self, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let before = inner.relays.len();
        inner.relays.retain(|r| r.id != id);
        if inner.relays.len() == before {
            return Err(StoreError::not_found("relays", id));
        }
        inner.roles.retain(|r| r.relay != id);
        inner.invitations.retain(|i| i.relay != id);
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner
            .users
            .iter()
            .any(|u| u.id == user.id || u.email == user.email)
        {
            return Err(StoreError::conflict("users", &user.email));
        }
        inner.users.push(user.clone());
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<User> {
        self.inner
            .read()
            .await
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("users", id))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<User> {
        self.inner
            .read()
            .await
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| StoreError::not_found("users", email))
    }

    async fn set_user_paid(&self, id: &str, paid: bool) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| StoreError::not_found("users", id))?;
        user.paid = paid;
        user.updated = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn set_user_profile(&self, id: &str, name: &str, picture: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| StoreError::not_found("users", id))?;
        user.name = name.to_string();
        user.picture = picture.to_string();
        user.updated = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.subscriptions.iter().any(|s| s.id == subscription.id) {
            return Err(StoreError::conflict("subscriptions", &subscription.id));
        }
        inner.subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn find_subscription(&self, id: &str) -> StoreResult<Subscription> {
        self.inner
            .read()
            .await
            .subscriptions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("subscriptions", id))
    }

    async fn find_subscriptions_by_stripe_id(
        &self,
        stripe_subscription: &str,
    ) -> StoreResult<Vec<Subscription>> {
        Ok(self
            .inner
            .read()
            .await
            .subscriptions
            .iter()
            .filter(|s| s.stripe_subscription == stripe_subscription)
            .cloned()
            .collect())
    }

    async fn list_active_subscriptions(&self) -> StoreResult<Vec<Subscription>> {
        Ok(self
            .inner
            .read()
            .await
            .subscriptions
            .iter()
            .filter(|s| s.active)
            .cloned()
            .collect())
    }

    async fn count_active_subscriptions(&self, relay: &str) -> StoreResult<i64> {
        Ok(self
            .inner
            .read()
            .await
            .subscriptions
            .iter()
            .filter(|s| s.active && s.relay == relay)
            .count() as i64)
    }

    async fn update_subscription(&self, subscription: &Subscription) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let existing = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| StoreError::not_found("subscriptions", &subscription.id))?;
        *existing = subscription.clone();
        existing.updated = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn delete_subscription(&self, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        if inner.subscriptions.len() == before {
            return Err(StoreError::not_found("subscriptions", id));
        }
        Ok(())
    }

    async fn insert_role(&self, role: &RelayRole) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.roles.iter().any(|r| r.id == role.id) {
            return Err(StoreError::conflict("relay_roles", &role.id));
        }
        inner.roles.push(role.clone());
        Ok(())
    }

    async fn count_roles(&self, filter: &RoleFilter) -> StoreResult<i64> {
        Ok(self
            .inner
            .read()
            .await
            .roles
            .iter()
            .filter(|r| filter.matches(r))
            .count() as i64)
    }

    async fn list_roles(&self, filter: &RoleFilter) -> StoreResult<Vec<RelayRole>> {
        Ok(self
            .inner
            .read()
            .await
            .roles
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn insert_invitation(&self, invitation: &RelayInvitation) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner
            .invitations
            .iter()
            .any(|i| i.id == invitation.id || i.key == invitation.key)
        {
            return Err(StoreError::conflict("relay_invitations", &invitation.key));
        }
        inner.invitations.push(invitation.clone());
        Ok(())
    }

    async fn find_invitation_by_key(&self, key: &str) -> StoreResult<RelayInvitation> {
        self.inner
            .read()
            .await
            .invitations
            .iter()
            .find(|i| i.key == key)
            .cloned()
            .ok_or_else(|| StoreError::not_found("relay_invitations", key))
    }

    async fn list_invitations(&self, relay: &str) -> StoreResult<Vec<RelayInvitation>> {
        Ok(self
            .inner
            .read()
            .await
            .invitations
            .iter()
            .filter(|i| i.relay == relay)
            .cloned()
            .collect())
    }

    async fn insert_code_exchange(&self, record: &CodeExchange) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.code_exchanges.iter().any(|c| c.id == record.id) {
            return Err(StoreError::conflict("code_exchange", &record.id));
        }
        inner.code_exchanges.push(record.clone());
        Ok(())
    }

    async fn find_code_exchange(&self, id: &str) -> StoreResult<CodeExchange> {
        self.inner
            .read()
            .await
            .code_exchanges
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("code_exchange", id))
    }

    async fn delete_code_exchanges_before(&self, cutoff: OffsetDateTime) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.code_exchanges.len();
        inner.code_exchanges.retain(|c| c.created >= cutoff);
        Ok((before - inner.code_exchanges.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoleName;
    use crate::{new_record_id, FREE_TIER_USER_LIMIT};

    fn relay(id: &str) -> Relay {
        let now = OffsetDateTime::now_utc();
        Relay {
            id: id.to_string(),
            name: "Relay".to_string(),
            user_limit: FREE_TIER_USER_LIMIT,
            creator: "owner".to_string(),
            created: now,
            updated: now,
        }
    }

    fn role(relay: &str, user: &str) -> RelayRole {
        let now = OffsetDateTime::now_utc();
        RelayRole {
            id: new_record_id(),
            relay: relay.to_string(),
            user: user.to_string(),
            role: RoleName::Member,
            created: now,
            updated: now,
        }
    }

    #[tokio::test]
    async fn test_delete_relay_cascades_roles() {
        let store = MemoryStore::new();
        store.insert_relay(&relay("r1")).await.unwrap();
        store.insert_relay(&relay("r2")).await.unwrap();
        store.insert_role(&role("r1", "u1")).await.unwrap();
        store.insert_role(&role("r2", "u1")).await.unwrap();

        store.delete_relay("r1").await.unwrap();

        assert_eq!(store.count_roles(&RoleFilter::user("u1")).await.unwrap(), 1);
        assert!(store.find_relay("r1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_code_exchange_id_is_unique() {
        let store = MemoryStore::new();
        let record = CodeExchange {
            id: "abc".to_string(),
            state: "abcdef".to_string(),
            code: "xyz".to_string(),
            otp: "123456".to_string(),
            created: OffsetDateTime::now_utc(),
        };

        store.insert_code_exchange(&record).await.unwrap();
        let err = store.insert_code_exchange(&record).await.unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(store.code_exchange_count().await, 1);
    }

    #[tokio::test]
    async fn test_delete_code_exchanges_before_cutoff() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();
        for (id, age_minutes) in [("old", 30), ("new", 1)] {
            store
                .insert_code_exchange(&CodeExchange {
                    id: id.to_string(),
                    state: id.to_string(),
                    code: "c".to_string(),
                    otp: "123456".to_string(),
                    created: now - time::Duration::minutes(age_minutes),
                })
                .await
                .unwrap();
        }

        let removed = store
            .delete_code_exchanges_before(now - time::Duration::minutes(15))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.find_code_exchange("new").await.is_ok());
    }
}

//! Stripe Checkout for relay seats

use std::sync::Arc;

use relaybase_shared::{RecordStore, User};

use crate::client::{CheckoutRequest, CheckoutSession, PaymentProvider};
use crate::error::{BillingError, BillingResult};

pub struct CheckoutService {
    provider: Arc<dyn PaymentProvider>,
    store: Arc<dyn RecordStore>,
    price_id: Option<String>,
    domain: String,
}

impl CheckoutService {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: Arc<dyn RecordStore>,
        price_id: Option<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            price_id,
            domain: domain.into(),
        }
    }

    /// Start a checkout that sizes `relay_id` to `quantity` seats
    ///
    /// The session metadata carries everything the completion webhook needs to
    /// find the relay and the paying user again.
    pub async fn create_session(
        &self,
        user: &User,
        relay_id: &str,
        quantity: i64,
    ) -> BillingResult<CheckoutSession> {
        if quantity < 1 {
            return Err(BillingError::InvalidInput(
                "quantity must be at least 1".to_string(),
            ));
        }

        let price_id = self
            .price_id
            .clone()
            .ok_or_else(|| BillingError::Config("STRIPE_PRICE_ID not set".to_string()))?;

        let relay = match self.store.find_relay(relay_id).await {
            Ok(r) => r,
            Err(e) if e.is_not_found() => {
                return Err(BillingError::RelayNotFound(relay_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if relay.creator != user.id {
            return Err(BillingError::NotOwner);
        }

        let domain = self.domain.trim_end_matches('/');
        let request = CheckoutRequest {
            price_id,
            quantity,
            email: user.email.clone(),
            relay: relay.id,
            success_url: format!("{domain}/login"),
            cancel_url: format!("{domain}/get"),
        };

        self.provider.create_checkout_session(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_relay, seed_user, FakeProvider};
    use relaybase_shared::MemoryStore;

    fn service(
        store: &Arc<MemoryStore>,
        provider: &Arc<FakeProvider>,
        price_id: Option<&str>,
    ) -> CheckoutService {
        CheckoutService::new(
            provider.clone(),
            store.clone(),
            price_id.map(str::to_string),
            "https://relay.example/",
        )
    }

    #[tokio::test]
    async fn test_checkout_request_carries_metadata_and_urls() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::default());
        let owner = seed_user(&store, "owner@example.com").await;
        let relay = seed_relay(&store, &owner).await;

        let session = service(&store, &provider, Some("price_seat"))
            .create_session(&owner, &relay.id, 10)
            .await
            .unwrap();

        assert_eq!(session.id, "cs_test");
        let checkouts = provider.checkouts.lock().unwrap();
        let request = &checkouts[0];
        assert_eq!(request.email, "owner@example.com");
        assert_eq!(request.relay, relay.id);
        assert_eq!(request.quantity, 10);
        assert_eq!(request.success_url, "https://relay.example/login");
        assert_eq!(request.cancel_url, "https://relay.example/get");
    }

    #[tokio::test]
    async fn test_checkout_for_foreign_relay_rejected() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::default());
        let owner = seed_user(&store, "owner@example.com").await;
        let other = seed_user(&store, "other@example.com").await;
        let relay = seed_relay(&store, &owner).await;

        let err = service(&store, &provider, Some("price_seat"))
            .create_session(&other, &relay.id, 1)
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::NotOwner));
        assert!(provider.checkouts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_validates_quantity_and_price() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::default());
        let owner = seed_user(&store, "owner@example.com").await;
        let relay = seed_relay(&store, &owner).await;

        let zero = service(&store, &provider, Some("price_seat"))
            .create_session(&owner, &relay.id, 0)
            .await;
        assert!(matches!(zero, Err(BillingError::InvalidInput(_))));

        let unpriced = service(&store, &provider, None)
            .create_session(&owner, &relay.id, 1)
            .await;
        assert!(matches!(unpriced, Err(BillingError::Config(_))));
    }
}

//! Fixtures shared by the billing tests

use std::sync::Mutex;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use relaybase_shared::{
    new_record_id, MemoryStore, RecordStore, Relay, Subscription, User, FREE_TIER_USER_LIMIT,
};
use sha2::Sha256;
use time::OffsetDateTime;

use crate::client::{CancelledSubscription, CheckoutRequest, CheckoutSession, PaymentProvider};
use crate::error::{BillingError, BillingResult};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Build a `Stripe-Signature` header for `payload`
pub fn sign(payload: &[u8], timestamp: i64, secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

pub async fn seed_user(store: &MemoryStore, email: &str) -> User {
    let now = OffsetDateTime::now_utc();
    let user = User {
        id: new_record_id(),
        email: email.to_string(),
        name: email.split('@').next().unwrap_or_default().to_string(),
        picture: String::new(),
        paid: false,
        created: now,
        updated: now,
    };
    store.insert_user(&user).await.unwrap();
    user
}

pub async fn seed_relay(store: &MemoryStore, creator: &User) -> Relay {
    let now = OffsetDateTime::now_utc();
    let relay = Relay {
        id: new_record_id(),
        name: "Relay".to_string(),
        user_limit: FREE_TIER_USER_LIMIT,
        creator: creator.id.clone(),
        created: now,
        updated: now,
    };
    store.insert_relay(&relay).await.unwrap();
    relay
}

pub async fn seed_subscription(
    store: &MemoryStore,
    relay: &Relay,
    user: &User,
    stripe_subscription: &str,
    active: bool,
) -> Subscription {
    let now = OffsetDateTime::now_utc();
    let subscription = Subscription {
        id: new_record_id(),
        active,
        relay: relay.id.clone(),
        user: user.id.clone(),
        stripe_customer: "cus_test".to_string(),
        stripe_subscription: stripe_subscription.to_string(),
        stripe_quantity: 5,
        stripe_cancel_at: None,
        created: now,
        updated: now,
    };
    store.insert_subscription(&subscription).await.unwrap();
    subscription
}

/// Records calls instead of talking to Stripe
#[derive(Default)]
pub struct FakeProvider {
    pub cancelled: Mutex<Vec<String>>,
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
    pub fail: bool,
}

impl FakeProvider {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancelled.lock().unwrap().len()
    }
}

pub const CANCELED_AT: i64 = 1_700_000_500;

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn cancel_subscription(
        &self,
        stripe_subscription: &str,
    ) -> BillingResult<CancelledSubscription> {
        if self.fail {
            return Err(BillingError::StripeApi("provider unavailable".to_string()));
        }
        self.cancelled
            .lock()
            .unwrap()
            .push(stripe_subscription.to_string());
        Ok(CancelledSubscription {
            id: stripe_subscription.to_string(),
            status: "canceled".to_string(),
            canceled_at: OffsetDateTime::from_unix_timestamp(CANCELED_AT).ok(),
        })
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> BillingResult<CheckoutSession> {
        if self.fail {
            return Err(BillingError::StripeApi("provider unavailable".to_string()));
        }
        self.checkouts.lock().unwrap().push(request.clone());
        Ok(CheckoutSession {
            id: "cs_test".to_string(),
            url: "https://checkout.stripe.com/c/cs_test".to_string(),
        })
    }
}

//! Fixtures shared by the api tests

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use relaybase_billing::{
    BillingError, BillingResult, CancelledSubscription, CheckoutRequest, CheckoutSession,
    PaymentProvider,
};
use relaybase_shared::{new_record_id, MemoryStore, RecordStore, Subscription, User};
use sha2::Sha256;
use time::OffsetDateTime;

pub const WEBHOOK_SECRET: &str = "whsec_api_test";

/// Build a `Stripe-Signature` header for `payload`
pub fn sign(payload: &[u8], timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
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

pub async fn seed_subscription(
    store: &MemoryStore,
    relay_id: &str,
    user_id: &str,
    active: bool,
) -> Subscription {
    let now = OffsetDateTime::now_utc();
    let subscription = Subscription {
        id: new_record_id(),
        active,
        relay: relay_id.to_string(),
        user: user_id.to_string(),
        stripe_customer: "cus_test".to_string(),
        stripe_subscription: "sub_test".to_string(),
        stripe_quantity: 5,
        stripe_cancel_at: None,
        created: now,
        updated: now,
    };
    store.insert_subscription(&subscription).await.unwrap();
    subscription
}

/// Provider that accepts every cancel and checkout
pub struct NoopProvider;

#[async_trait]
impl PaymentProvider for NoopProvider {
    async fn cancel_subscription(
        &self,
        stripe_subscription: &str,
    ) -> BillingResult<CancelledSubscription> {
        Ok(CancelledSubscription {
            id: stripe_subscription.to_string(),
            status: "canceled".to_string(),
            canceled_at: Some(OffsetDateTime::now_utc()),
        })
    }

    async fn create_checkout_session(
        &self,
        _request: &CheckoutRequest,
    ) -> BillingResult<CheckoutSession> {
        Ok(CheckoutSession {
            id: "cs_test".to_string(),
            url: "https://checkout.stripe.com/c/cs_test".to_string(),
        })
    }
}

/// Provider whose every call fails upstream
pub struct DownProvider;

#[async_trait]
impl PaymentProvider for DownProvider {
    async fn cancel_subscription(&self, _: &str) -> BillingResult<CancelledSubscription> {
        Err(BillingError::StripeApi("provider unavailable".to_string()))
    }

    async fn create_checkout_session(
        &self,
        _: &CheckoutRequest,
    ) -> BillingResult<CheckoutSession> {
        Err(BillingError::StripeApi("provider unavailable".to_string()))
    }
}
